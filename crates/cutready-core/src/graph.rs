//! Read-only projection of commits and timelines into a lane graph.
//!
//! Nothing here touches the disk. The engine feeds in the commits and
//! timeline records; the UI renders the result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commit_store::{Commit, CommitId};
use crate::markers::RewindMarker;
use crate::timeline::{resolve_save_target, SaveTarget, Timeline};

// ============================================================================
// Types
// ============================================================================

/// One lane per timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLane {
    pub lane: usize,
    pub timeline: String,
    pub label: String,
    pub head_commit_id: Option<CommitId>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: CommitId,
    pub parent_id: Option<CommitId>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Timeline the commit was created on (may no longer exist).
    pub timeline_name: String,
    pub lane: usize,
    /// Timelines whose head is this commit.
    pub heads: Vec<String>,
}

/// Child-to-parent edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: CommitId,
    pub to: CommitId,
    /// The edge crosses lanes (a fork point).
    pub fork: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineGraph {
    pub lanes: Vec<GraphLane>,
    /// Newest first.
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl TimelineGraph {
    pub fn node(&self, id: &CommitId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }
}

/// Preview of the timeline a save would create from a rewound point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostBranch {
    pub from_commit_id: CommitId,
    /// Lane the new timeline would occupy.
    pub lane: usize,
}

// ============================================================================
// Projection
// ============================================================================

/// Build the graph of every commit reachable from a timeline head.
///
/// Each commit sits in the lane of the timeline it was created on. Commits
/// whose timeline was deleted take the lane of the first timeline (in
/// creation order) that reaches them.
pub fn build(commits: &[Commit], timelines: &[Timeline], active: &str) -> TimelineGraph {
    let by_id: HashMap<&CommitId, &Commit> = commits.iter().map(|c| (&c.id, c)).collect();
    let lane_of: HashMap<&str, usize> = timelines
        .iter()
        .map(|t| (t.name.as_str(), t.color_index))
        .collect();

    let mut lanes_by_commit: HashMap<&CommitId, usize> = HashMap::new();
    for timeline in timelines {
        let mut cursor = timeline.head_commit_id.as_ref();
        while let Some(id) = cursor {
            let Some(&commit) = by_id.get(id) else { break };
            if lanes_by_commit.contains_key(&commit.id) {
                break;
            }
            let lane = lane_of
                .get(commit.timeline_name.as_str())
                .copied()
                .unwrap_or(timeline.color_index);
            lanes_by_commit.insert(&commit.id, lane);
            cursor = commit.parent_id.as_ref();
        }
    }

    let mut heads: HashMap<&CommitId, Vec<String>> = HashMap::new();
    for timeline in timelines {
        if let Some(head) = &timeline.head_commit_id {
            heads.entry(head).or_default().push(timeline.name.to_string());
        }
    }

    let mut nodes: Vec<GraphNode> = commits
        .iter()
        .filter_map(|c| {
            let lane = *lanes_by_commit.get(&c.id)?;
            Some(GraphNode {
                id: c.id.clone(),
                parent_id: c.parent_id.clone(),
                message: c.message.clone(),
                timestamp: c.timestamp,
                timeline_name: c.timeline_name.clone(),
                lane,
                heads: heads.remove(&c.id).unwrap_or_default(),
            })
        })
        .collect();
    nodes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));

    let edges = nodes
        .iter()
        .filter_map(|n| {
            let parent = n.parent_id.as_ref()?;
            let parent_lane = lanes_by_commit.get(parent)?;
            Some(GraphEdge {
                from: n.id.clone(),
                to: parent.clone(),
                fork: *parent_lane != n.lane,
            })
        })
        .collect();

    let lanes = timelines
        .iter()
        .map(|t| GraphLane {
            lane: t.color_index,
            timeline: t.name.to_string(),
            label: t.label.clone(),
            head_commit_id: t.head_commit_id.clone(),
            is_active: t.name == *active,
        })
        .collect();

    TimelineGraph {
        lanes,
        nodes,
        edges,
    }
}

/// The branch a save would fork off while rewound, if any.
///
/// Returns `None` when not rewound or when a save would land on an existing
/// timeline. Only the graph and marker are consulted; nothing is created.
pub fn ghost_branch(
    graph: &TimelineGraph,
    timelines: &[Timeline],
    active: &str,
    marker: Option<&RewindMarker>,
) -> Option<GhostBranch> {
    let marker = marker?;
    let viewing = &marker.viewing_commit_id;
    if resolve_save_target(timelines, active, viewing) != SaveTarget::Fork {
        return None;
    }
    let lane = graph
        .lanes
        .iter()
        .map(|l| l.lane + 1)
        .max()
        .unwrap_or(0);
    Some(GhostBranch {
        from_commit_id: viewing.clone(),
        lane,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TimelineName;
    use crate::tree::Manifest;
    use chrono::TimeZone;

    fn commit(seq: u64, parent: Option<u64>, timeline: &str) -> Commit {
        Commit {
            id: CommitId::from_seq(seq),
            parent_id: parent.map(CommitId::from_seq),
            timeline_name: timeline.to_string(),
            message: format!("c{}", seq),
            timestamp: Utc.timestamp_opt(1_700_000_000 + seq as i64, 0).unwrap(),
            manifest: Manifest::new(),
        }
    }

    fn timeline(name: &str, lane: usize, head: Option<u64>) -> Timeline {
        Timeline {
            name: TimelineName::new_unchecked(name),
            label: name.to_string(),
            color_index: lane,
            head_commit_id: head.map(CommitId::from_seq),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    /// main: 1 -> 2 -> 3, alt forks at 1: 1 -> 4
    fn fixture() -> (Vec<Commit>, Vec<Timeline>) {
        let commits = vec![
            commit(1, None, "main"),
            commit(2, Some(1), "main"),
            commit(3, Some(2), "main"),
            commit(4, Some(1), "alt"),
        ];
        let timelines = vec![timeline("main", 0, Some(3)), timeline("alt", 1, Some(4))];
        (commits, timelines)
    }

    #[test]
    fn test_nodes_newest_first_with_lanes() {
        let (commits, timelines) = fixture();
        let graph = build(&commits, &timelines, "main");

        let order: Vec<_> = graph.nodes.iter().map(|n| n.id.short()).collect();
        assert_eq!(order, vec!["4", "3", "2", "1"]);
        assert_eq!(graph.node(&CommitId::from_seq(4)).unwrap().lane, 1);
        assert_eq!(graph.node(&CommitId::from_seq(2)).unwrap().lane, 0);
        assert_eq!(graph.node(&CommitId::from_seq(3)).unwrap().heads, vec!["main"]);
        assert!(graph.lanes[0].is_active);
        assert!(!graph.lanes[1].is_active);
    }

    #[test]
    fn test_fork_edges_cross_lanes() {
        let (commits, timelines) = fixture();
        let graph = build(&commits, &timelines, "main");

        let fork_edges: Vec<_> = graph.edges.iter().filter(|e| e.fork).collect();
        assert_eq!(fork_edges.len(), 1);
        assert_eq!(fork_edges[0].from, CommitId::from_seq(4));
        assert_eq!(fork_edges[0].to, CommitId::from_seq(1));
        assert_eq!(graph.edges.len(), 3);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let mut commits = vec![commit(1, None, "main"), commit(2, Some(1), "main")];
        commits[1].timestamp = commits[0].timestamp;
        let timelines = vec![timeline("main", 0, Some(2))];

        let graph = build(&commits, &timelines, "main");
        assert_eq!(graph.nodes[0].id, CommitId::from_seq(2));
    }

    #[test]
    fn test_deleted_timeline_commits_take_reaching_lane() {
        let commits = vec![
            commit(1, None, "main"),
            commit(2, Some(1), "gone"),
            commit(3, Some(2), "alt"),
        ];
        let timelines = vec![timeline("main", 0, Some(1)), timeline("alt", 2, Some(3))];

        let graph = build(&commits, &timelines, "main");
        assert_eq!(graph.node(&CommitId::from_seq(2)).unwrap().lane, 2);
    }

    #[test]
    fn test_unreachable_commits_are_hidden() {
        let commits = vec![commit(1, None, "main"), commit(2, Some(1), "gone")];
        let timelines = vec![timeline("main", 0, Some(1))];

        let graph = build(&commits, &timelines, "main");
        assert_eq!(graph.nodes.len(), 1);
    }

    #[test]
    fn test_ghost_branch_only_for_non_tip() {
        let (commits, timelines) = fixture();
        let graph = build(&commits, &timelines, "main");

        assert!(ghost_branch(&graph, &timelines, "main", None).is_none());

        let at_tip = RewindMarker {
            viewing_commit_id: CommitId::from_seq(3),
            origin_tip_commit_id: Some(CommitId::from_seq(3)),
        };
        assert!(ghost_branch(&graph, &timelines, "main", Some(&at_tip)).is_none());

        let at_other_head = RewindMarker {
            viewing_commit_id: CommitId::from_seq(4),
            origin_tip_commit_id: Some(CommitId::from_seq(3)),
        };
        assert!(ghost_branch(&graph, &timelines, "main", Some(&at_other_head)).is_none());

        let past = RewindMarker {
            viewing_commit_id: CommitId::from_seq(2),
            origin_tip_commit_id: Some(CommitId::from_seq(3)),
        };
        let ghost = ghost_branch(&graph, &timelines, "main", Some(&past)).unwrap();
        assert_eq!(ghost.from_commit_id, CommitId::from_seq(2));
        assert_eq!(ghost.lane, 2);
    }
}
