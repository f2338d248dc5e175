use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use graph_cluster_metrics::data::parquet::read_edges;
use graph_cluster_metrics::{
    storage, ClusterComparator, ClusterView, Config, Error, ExternalTool, GraphBuilder, GraphClusterMetrics,
    GraphView, SnapshotStore,
};

#[derive(Parser, Debug)]
#[clap(
    name = "graph-cluster-metrics",
    about = "Quality and agreement metrics for graph clusterings"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Directory for parquet snapshots and CNL files
    #[clap(long, global = true, default_value = "cluster_cache")]
    cache_dir: PathBuf,

    /// Overwrite existing snapshots
    #[clap(long, global = true)]
    force: bool,

    /// Output directory for reports
    #[clap(long, global = true, default_value = "cluster_results")]
    output_dir: PathBuf,

    /// Verbose logging
    #[clap(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a clustering on its graph
    Quality {
        /// Edge table (parquet with `src`, `dest` and optional `weight`)
        #[clap(long)]
        edges: PathBuf,

        /// Cluster assignment (parquet with `node` and `cluster`, or .cnl)
        #[clap(long)]
        clusters: PathBuf,

        /// Treat edges as directed
        #[clap(long)]
        directed: bool,

        /// Read the `weight` column
        #[clap(long)]
        weighted: bool,

        /// Edge table lists both orientations of every undirected edge
        #[clap(long)]
        mirrored: bool,
    },

    /// Compare a predicted clustering with a ground truth
    Compare {
        /// Ground-truth assignment (parquet or .cnl)
        #[clap(long)]
        truth: PathBuf,

        /// Predicted assignment (parquet or .cnl)
        #[clap(long)]
        prediction: PathBuf,

        /// Directory of external comparison binaries (PATH lookup when unset)
        #[clap(long)]
        tool_dir: Option<PathBuf>,

        /// Overlap-aware external measures to run
        #[clap(long, value_enum, value_delimiter = ',')]
        tools: Vec<Tool>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Tool {
    Gecmi,
    Onmi,
    Omega,
    F1,
}

impl Tool {
    fn external(self, config: &Config) -> ExternalTool {
        match self {
            Tool::Gecmi => ExternalTool::gen_conv_nmi(config),
            Tool::Onmi => ExternalTool::ovp_nmi(config),
            Tool::Omega => ExternalTool::omega_index(config),
            Tool::F1 => ExternalTool::f1_score(config),
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Cli::parse();

    // Configure logging
    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Output: {}", args.output_dir.display());
    std::fs::create_dir_all(&args.output_dir)?;

    match args.command {
        Command::Quality {
            edges,
            clusters,
            directed,
            weighted,
            mirrored,
        } => {
            let config = Config::new(&args.cache_dir, args.force, None);
            let store = SnapshotStore::from_config(&config);

            let graph = load_graph(&edges, directed, weighted, mirrored)?;
            log::info!(
                "Loaded graph {} with {} nodes and {} edges",
                graph.name(),
                graph.num_vertices(),
                graph.num_edges()
            );
            store.store_edges(&graph)?;

            let clustering = load_clustering(&clusters)?;
            match store.store_assignment(&clustering) {
                Ok(_) => {}
                Err(Error::Schema(reason)) => {
                    log::warn!("Snapshot of {} skipped: {}", clustering.name(), reason)
                }
                Err(err) => return Err(err.into()),
            }

            let report = GraphClusterMetrics::new(&graph, &clustering)
                .quality_report()
                .context("computing clustering quality")?;
            storage::save_quality_report(&report, &args.output_dir)?;
        }
        Command::Compare {
            truth,
            prediction,
            tool_dir,
            tools,
        } => {
            let config = Config::new(&args.cache_dir, args.force, tool_dir);

            let truth = load_clustering(&truth)?;
            let prediction = load_clustering(&prediction)?;
            if truth.name() == prediction.name() {
                bail!(
                    "both clusterings are named {:?}; rename one of the files",
                    truth.name()
                );
            }

            let tools: Vec<ExternalTool> = tools.into_iter().map(|tool| tool.external(&config)).collect();
            let report = ClusterComparator::new(&truth, &prediction)
                .with_config(config)
                .comparison_report(&tools)
                .context("comparing clusterings")?;
            storage::save_comparison_report(&report, &args.output_dir)?;
        }
    }

    log::info!("Evaluation complete. Results saved to {}", args.output_dir.display());

    Ok(())
}

/// Read an edge table, collapsing mirrored undirected edges when asked
fn load_graph(path: &Path, directed: bool, weighted: bool, mirrored: bool) -> Result<GraphView> {
    let graph = read_edges(path, directed || mirrored, weighted)
        .with_context(|| format!("reading edges from {}", path.display()))?;
    if !mirrored {
        return Ok(graph);
    }

    let mut builder = GraphBuilder::with_capacity(directed, weighted, graph.num_edges())
        .name(graph.name())
        .mirrored(true);
    for edge in graph.edges() {
        builder.add_weighted_edge(edge.src, edge.dest, edge.weight);
    }
    Ok(builder.build()?)
}

/// CNL files are parsed eagerly; parquet snapshots are read on first use
fn load_clustering(path: &Path) -> Result<ClusterView> {
    if !path.exists() {
        bail!("clustering file not found: {}", path.display());
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("cnl") => ClusterView::from_cnl(path)
            .with_context(|| format!("reading CNL clustering {}", path.display())),
        _ => Ok(ClusterView::from_file(path)),
    }
}
