//! Overlap-aware comparison tools run as external processes
//!
//! Each tool receives two CNL files (ground truth first) and prints its score
//! on standard output. The process is awaited without timeout; a non-zero exit
//! is reported as [`Error::ExternalTool`] and never retried.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::Config;
use crate::error::{Error, Result};

const TRUTH: &str = "{truth}";
const PREDICTION: &str = "{prediction}";

/// Command line of one external comparison tool
#[derive(Debug, Clone)]
pub struct ExternalTool {
    /// Name used in reports and errors
    pub name: String,

    /// Executable path
    pub program: PathBuf,

    /// Arguments; `{truth}` and `{prediction}` are replaced by the CNL paths,
    /// which are appended when neither placeholder appears
    pub args: Vec<String>,

    /// Output key preceding the score (`key: value`); `None` takes the first
    /// numeric token printed
    pub result_key: Option<String>,
}

impl ExternalTool {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            result_key: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = Some(key.into());
        self
    }

    /// Generalized conventional NMI (`gecmi`)
    pub fn gen_conv_nmi(config: &Config) -> Self {
        Self::new("GenConvNMI", config.tool_program("gecmi"))
    }

    /// Overlapping NMI (`onmi`), max-normalized variant
    pub fn ovp_nmi(config: &Config) -> Self {
        Self::new("OvpNMI", config.tool_program("onmi")).result_key("NMI<Max>")
    }

    /// Omega index (`xmeasures -o`)
    pub fn omega_index(config: &Config) -> Self {
        Self::new("Omega", config.tool_program("xmeasures"))
            .arg("-o")
            .result_key("OI")
    }

    /// Harmonic mean F1 (`xmeasures -fh`)
    pub fn f1_score(config: &Config) -> Self {
        Self::new("F1", config.tool_program("xmeasures"))
            .arg("-fh")
            .result_key("MF1h")
    }

    /// Arguments for one invocation
    pub fn command_args(&self, truth: &Path, prediction: &Path) -> Vec<String> {
        let truth = truth.display().to_string();
        let prediction = prediction.display().to_string();

        let has_placeholder = self
            .args
            .iter()
            .any(|arg| arg.contains(TRUTH) || arg.contains(PREDICTION));

        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(TRUTH, &truth).replace(PREDICTION, &prediction))
            .collect();
        if !has_placeholder {
            args.push(truth);
            args.push(prediction);
        }
        args
    }

    /// Run the tool on two CNL files and parse its score
    pub fn run(&self, truth: &Path, prediction: &Path) -> Result<f64> {
        let args = self.command_args(truth, prediction);
        log::info!("Running {}: {} {}", self.name, self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|err| self.failure("not started", err.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(self.failure(&output.status.to_string(), stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        log::debug!("{} output: {}", self.name, stdout.trim());

        parse_score(&stdout, self.result_key.as_deref()).ok_or_else(|| {
            self.failure(
                "exit status: 0",
                format!("no score for {:?} in output {:?}", self.result_key, stdout.trim()),
            )
        })
    }

    fn failure(&self, status: &str, stderr: String) -> Error {
        Error::ExternalTool {
            tool: self.name.clone(),
            status: status.to_string(),
            stderr,
        }
    }
}

/// Extract a score from tool output.
///
/// With a key, the first `key...: value` line wins and the first numeric token
/// after the colon is the score. Without one, the first numeric token in the
/// output is.
pub fn parse_score(output: &str, key: Option<&str>) -> Option<f64> {
    output.lines().find_map(|line| match key {
        Some(key) => {
            let (label, rest) = line.split_once(':')?;
            if !label.trim().starts_with(key) {
                return None;
            }
            first_number(rest)
        }
        None => first_number(line),
    })
}

fn first_number(text: &str) -> Option<f64> {
    text.split_whitespace()
        .find_map(|token| token.trim_end_matches(',').parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keyed_score() {
        let output = "lfkNMI:\t0.41\nNMI<Max>:\t0.625\nNMI<Sum>:\t0.7\n";
        assert_eq!(parse_score(output, Some("NMI<Max>")), Some(0.625));
        assert_eq!(parse_score(output, Some("Omega")), None);
    }

    #[test]
    fn test_parse_bare_score() {
        assert_eq!(parse_score("0.8123\n", None), Some(0.8123));
        assert_eq!(parse_score("NMI: 0.5 (approx)\n", None), Some(0.5));
        assert_eq!(parse_score("loading\n0.5 done\n", None), Some(0.5));
    }

    #[test]
    fn test_command_args() {
        let tool = ExternalTool::new("t", "tool").arg("-o");
        let args = tool.command_args(Path::new("a.cnl"), Path::new("b.cnl"));
        assert_eq!(args, vec!["-o", "a.cnl", "b.cnl"]);

        let tool = ExternalTool::new("t", "tool").arg("--gt={truth}").arg("{prediction}");
        let args = tool.command_args(Path::new("a.cnl"), Path::new("b.cnl"));
        assert_eq!(args, vec!["--gt=a.cnl", "b.cnl"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_parses_stdout() {
        let tool = ExternalTool::new("echo", "echo").arg("OI: 0.75").result_key("OI");
        let score = tool.run(Path::new("a.cnl"), Path::new("b.cnl")).unwrap();
        assert_eq!(score, 0.75);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_is_error() {
        let tool = ExternalTool::new("false", "false");
        let result = tool.run(Path::new("a.cnl"), Path::new("b.cnl"));
        assert!(matches!(result, Err(Error::ExternalTool { ref tool, .. }) if tool == "false"));
    }

    #[test]
    fn test_missing_program_is_error() {
        let tool = ExternalTool::new("ghost", "/nonexistent/ghost-tool");
        let result = tool.run(Path::new("a.cnl"), Path::new("b.cnl"));
        assert!(matches!(result, Err(Error::ExternalTool { .. })));
    }
}
