//! Text rendering of the timeline graph for `cutready graph`.
//!
//! One column per lane, newest commit first:
//!
//! ```text
//!   *  00000004 Punchier ending [experiment]
//! @ |  00000003 Tighten intro [main]
//! * |  00000002 Add storyboard
//! * /  00000001 First draft
//! ```

use std::collections::HashMap;

use cutready_core::{CommitId, GhostBranch, TimelineGraph};

use super::style::Style;

/// Render `graph` as lane columns followed by commit details.
///
/// `current` is drawn as `@` (the commit shown in the working tree). A ghost
/// branch, if any, is drawn as `+` above the commit it would fork from.
pub fn render_graph(
    style: &Style,
    graph: &TimelineGraph,
    current: Option<&CommitId>,
    ghost: Option<&GhostBranch>,
) -> String {
    if graph.nodes.is_empty() {
        return String::new();
    }

    let width = graph
        .nodes
        .iter()
        .map(|n| n.lane + 1)
        .chain(graph.lanes.iter().map(|l| l.lane + 1))
        .chain(ghost.map(|g| g.lane + 1))
        .max()
        .unwrap_or(1);
    let offset = usize::from(ghost.is_some());
    let rows = graph.nodes.len() + offset;
    let mut grid = vec![vec![' '; width]; rows];

    let row_of: HashMap<&CommitId, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (&n.id, i + offset))
        .collect();

    for (i, node) in graph.nodes.iter().enumerate() {
        grid[i + offset][node.lane] = if current == Some(&node.id) { '@' } else { '*' };
    }

    for edge in &graph.edges {
        let (Some(&from), Some(&to)) = (row_of.get(&edge.from), row_of.get(&edge.to)) else {
            continue;
        };
        let lane = graph.nodes[from - offset].lane;
        draw_edge(&mut grid, lane, from, to, edge.fork);
    }

    if let Some(g) = ghost {
        grid[0][g.lane] = '+';
        if let Some(&to) = row_of.get(&g.from_commit_id) {
            draw_edge(&mut grid, g.lane, 0, to, true);
        }
    }

    let mut lines = Vec::with_capacity(rows);
    if ghost.is_some() {
        lines.push(format!("{}  (new timeline on next save)", lane_prefix(&grid[0])));
    }
    for (i, node) in graph.nodes.iter().enumerate() {
        let mut line = format!(
            "{}  {} {}",
            lane_prefix(&grid[i + offset]),
            style.commit_id(node.id.as_str()),
            node.message
        );
        if !node.heads.is_empty() {
            line.push_str(&format!(" [{}]", node.heads.join(", ")));
        }
        lines.push(line);
    }
    lines.join("\n")
}

fn draw_edge(grid: &mut [Vec<char>], lane: usize, from: usize, to: usize, fork: bool) {
    for row in grid.iter_mut().take(to).skip(from + 1) {
        if row[lane] == ' ' {
            row[lane] = '|';
        }
    }
    if fork && grid[to][lane] == ' ' {
        grid[to][lane] = '/';
    }
}

fn lane_prefix(cells: &[char]) -> String {
    cells
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::ColorMode;
    use chrono::{TimeZone, Utc};
    use cutready_core::{GraphEdge, GraphLane, GraphNode};

    fn node(seq: u64, parent: Option<u64>, lane: usize, heads: &[&str]) -> GraphNode {
        GraphNode {
            id: CommitId::from_seq(seq),
            parent_id: parent.map(CommitId::from_seq),
            message: format!("c{}", seq),
            timestamp: Utc.timestamp_opt(1_700_000_000 + seq as i64, 0).unwrap(),
            timeline_name: if lane == 0 { "main" } else { "alt" }.to_string(),
            lane,
            heads: heads.iter().map(|h| h.to_string()).collect(),
        }
    }

    fn edge(from: u64, to: u64, fork: bool) -> GraphEdge {
        GraphEdge {
            from: CommitId::from_seq(from),
            to: CommitId::from_seq(to),
            fork,
        }
    }

    fn lane(lane: usize, name: &str) -> GraphLane {
        GraphLane {
            lane,
            timeline: name.to_string(),
            label: name.to_string(),
            head_commit_id: None,
            is_active: lane == 0,
        }
    }

    /// main: 1 -> 2 -> 3, alt: 1 -> 4
    fn fixture() -> TimelineGraph {
        TimelineGraph {
            lanes: vec![lane(0, "main"), lane(1, "alt")],
            nodes: vec![
                node(4, Some(1), 1, &["alt"]),
                node(3, Some(2), 0, &["main"]),
                node(2, Some(1), 0, &[]),
                node(1, None, 0, &[]),
            ],
            edges: vec![edge(4, 1, true), edge(3, 2, false), edge(2, 1, false)],
        }
    }

    #[test]
    fn test_render_lanes() {
        let style = Style::new(ColorMode::Never);
        let out = render_graph(&style, &fixture(), Some(&CommitId::from_seq(3)), None);
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "  *  00000004 c4 [alt]");
        assert_eq!(lines[1], "@ |  00000003 c3 [main]");
        assert_eq!(lines[2], "* |  00000002 c2");
        assert_eq!(lines[3], "* /  00000001 c1");
    }

    #[test]
    fn test_render_ghost_branch() {
        let style = Style::new(ColorMode::Never);
        let ghost = GhostBranch {
            from_commit_id: CommitId::from_seq(2),
            lane: 2,
        };
        let out = render_graph(&style, &fixture(), Some(&CommitId::from_seq(2)), Some(&ghost));
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].ends_with("(new timeline on next save)"));
        assert!(lines[0].starts_with("    +"));
        assert!(lines[3].starts_with("@ | /"));
    }

    #[test]
    fn test_empty_graph() {
        let style = Style::new(ColorMode::Never);
        assert!(render_graph(&style, &TimelineGraph::default(), None, None).is_empty());
    }
}
