//! CNL (cluster nodes list) serialization
//!
//! One line per cluster listing its member node ids separated by whitespace.
//! Files produced by external tools may also carry `#` comment lines, an
//! `id>` cluster label prefix and `node:share` fuzzy membership tokens; the
//! reader accepts all three and ignores the shares.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use crate::cluster::{Assignment, ClusterId};
use crate::error::{Error, Result};
use crate::graph::NodeId;

/// Write one line per cluster, members in the given order
pub fn write_cnl<W: Write>(members: &BTreeMap<ClusterId, Vec<NodeId>>, mut writer: W) -> Result<()> {
    for nodes in members.values() {
        let line = nodes
            .iter()
            .map(|node| node.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line)?;
    }
    Ok(())
}

/// Read a CNL stream into assignment rows.
///
/// Clusters take their `id>` label when present, otherwise the zero-based
/// position of the line among cluster lines. A file must use one form for all
/// of its lines, since positions could otherwise collide with explicit labels.
pub fn read_cnl<R: BufRead>(reader: R) -> Result<Vec<Assignment>> {
    let mut rows = Vec::new();
    let mut position: i64 = 0;
    let mut labelled: Option<bool> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let Some((label, nodes)) = parse_line(&line, line_no + 1)? else {
            continue;
        };

        match labelled {
            Some(expected) if expected != label.is_some() => {
                return Err(Error::Schema(format!(
                    "CNL line {}: labelled and unlabelled cluster lines are mixed",
                    line_no + 1
                )));
            }
            _ => labelled = Some(label.is_some()),
        }

        let cluster = label.unwrap_or(ClusterId::Int(position));
        position += 1;
        rows.extend(nodes.into_iter().map(|node| Assignment::new(node, cluster.clone())));
    }

    Ok(rows)
}

/// Parse a single line; `None` for blank and comment lines
fn parse_line(line: &str, line_no: usize) -> Result<Option<(Option<ClusterId>, Vec<NodeId>)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (label, body) = match line.split_once('>') {
        Some((label, body)) => (Some(ClusterId::parse(label.trim())), body),
        None => (None, line),
    };

    let nodes = body
        .split_whitespace()
        .map(|token| {
            let id = token.split(':').next().unwrap_or(token);
            id.parse::<NodeId>().map_err(|_| {
                Error::Schema(format!("CNL line {}: invalid node id {:?}", line_no, token))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if nodes.is_empty() {
        return Ok(None);
    }
    Ok(Some((label, nodes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterView;
    use std::collections::BTreeSet;

    #[test]
    fn test_round_trip_membership() {
        let view = ClusterView::from_rows(vec![(0, "x"), (1, "x"), (1, "y"), (2, "y"), (9, "z")]);
        let mut buffer = Vec::new();
        view.write_cnl(&mut buffer).unwrap();

        let rows = read_cnl(buffer.as_slice()).unwrap();
        let reread = ClusterView::from_assignments(rows);

        let as_sets = |v: &ClusterView| -> BTreeSet<Vec<NodeId>> {
            v.members().unwrap().values().cloned().collect()
        };
        assert_eq!(as_sets(&view), as_sets(&reread));
    }

    #[test]
    fn test_external_tool_syntax() {
        let text = "# clusters: 2\n\n0> 1 2:0.5 3\nc7> 4 5\n";
        let rows = read_cnl(text.as_bytes()).unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(rows[1], Assignment::new(2, 0));
        assert_eq!(rows[4], Assignment::new(5, "c7"));
    }

    #[test]
    fn test_unlabelled_lines_numbered() {
        let rows = read_cnl("5 6\n7\n".as_bytes()).unwrap();
        assert_eq!(rows[2], Assignment::new(7, 1));
    }

    #[test]
    fn test_mixed_label_forms_rejected() {
        // the second line would land in cluster 1 and merge with `1>`
        let result = read_cnl("1> 1 2\n3 4\n".as_bytes());
        assert!(matches!(result, Err(Error::Schema(_))));

        let result = read_cnl("3 4\n0> 1 2\n".as_bytes());
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_bad_token() {
        let result = read_cnl("1 two 3\n".as_bytes());
        assert!(matches!(result, Err(Error::Schema(_))));
    }
}
