//! End-to-end engine scenarios: history, rewind, deferred forks and the stash.

use std::fs;
use std::path::Path;

use cutready_core::{
    CommitId, EngineState, ErrorKind, PendingOp, PendingOperation, Project, ProjectLock,
    RecoveryAction, SnapshotEngine, VersionError, VersioningConfig,
};
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn init() -> (TempDir, SnapshotEngine) {
    let temp = TempDir::new().unwrap();
    let engine = SnapshotEngine::init(temp.path(), VersioningConfig::default()).unwrap();
    (temp, engine)
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

fn head_of(engine: &SnapshotEngine, timeline: &str) -> Option<CommitId> {
    engine
        .list_timelines()
        .unwrap()
        .into_iter()
        .find(|t| t.name == timeline)
        .and_then(|t| t.head_commit_id)
}

/// Three commits on `main`: intro.sk = "a", "b", "c".
fn three_commits(root: &Path, engine: &mut SnapshotEngine) -> (CommitId, CommitId, CommitId) {
    write(root, "intro.sk", "a");
    let a = engine.save("A", None).unwrap().commit.id;
    write(root, "intro.sk", "b");
    let b = engine.save("B", None).unwrap().commit.id;
    write(root, "intro.sk", "c");
    let c = engine.save("C", None).unwrap().commit.id;
    (a, b, c)
}

// ============================================================================
// History
// ============================================================================

#[test]
fn test_history_is_strictly_ordered_with_parent_at_head() {
    let (temp, mut engine) = init();
    let mut expected_parent = None;

    for i in 0..6 {
        write(temp.path(), "notes/plan.md", &format!("revision {}", i));
        let saved = engine.save(&format!("rev {}", i), None).unwrap();
        assert_eq!(saved.commit.parent_id, expected_parent);
        expected_parent = Some(saved.commit.id);
    }

    let history = engine.history("main").unwrap();
    assert_eq!(history.len(), 6);
    for pair in history.windows(2) {
        assert!(pair[0].id > pair[1].id);
        assert!(pair[0].timestamp > pair[1].timestamp);
        assert_eq!(pair[0].parent_id.as_ref(), Some(&pair[1].id));
    }
}

#[test]
fn test_materialize_reproduces_stored_content() {
    let (temp, mut engine) = init();
    write(temp.path(), "intro.sk", "sketch v1");
    write(temp.path(), "board.sb", "storyboard v1");
    write(temp.path(), "notes/script.md", "# Script");
    write(temp.path(), ".sidebar-order.json", "[\"intro.sk\"]");
    write(temp.path(), ".cutready/screenshots/shot-1.png", "\u{89}PNG");
    let v1 = engine.save("v1", None).unwrap().commit.id;

    write(temp.path(), "intro.sk", "sketch v2");
    fs::remove_file(temp.path().join("notes/script.md")).unwrap();
    write(temp.path(), "outro.sk", "new");
    engine.save("v2", None).unwrap();

    engine.navigate_to(&v1).unwrap();

    for (rel, expected) in [
        ("intro.sk", "sketch v1"),
        ("board.sb", "storyboard v1"),
        ("notes/script.md", "# Script"),
        (".sidebar-order.json", "[\"intro.sk\"]"),
        (".cutready/screenshots/shot-1.png", "\u{89}PNG"),
    ] {
        assert_eq!(read(temp.path(), rel), expected, "{}", rel);
        assert_eq!(engine.file_at_version(&v1, rel).unwrap(), expected.as_bytes());
    }
    assert!(!temp.path().join("outro.sk").exists());
    assert!(!engine.is_dirty().unwrap());
}

#[test]
fn test_untracked_files_are_left_alone() {
    let (temp, mut engine) = init();
    write(temp.path(), "intro.sk", "a");
    let v1 = engine.save("v1", None).unwrap().commit.id;
    write(temp.path(), "intro.sk", "b");
    engine.save("v2", None).unwrap();

    write(temp.path(), "render.mp4", "video bytes");
    assert!(!engine.is_dirty().unwrap());

    engine.navigate_to(&v1).unwrap();
    assert_eq!(read(temp.path(), "render.mp4"), "video bytes");
}

// ============================================================================
// Navigation
// ============================================================================

#[test]
fn test_navigate_to_tip_is_noop() {
    let (temp, mut engine) = init();
    let (_, _, c) = three_commits(temp.path(), &mut engine);
    let project = Project::from_root(temp.path()).unwrap();
    let before = fs::metadata(temp.path().join("intro.sk")).unwrap().modified().unwrap();

    engine.navigate_to(&c).unwrap();

    assert!(!engine.is_rewound());
    assert!(!project.rewind_path().exists());
    let after = fs::metadata(temp.path().join("intro.sk")).unwrap().modified().unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_navigate_back_to_tip_clears_rewind() {
    let (temp, mut engine) = init();
    let (a, b, c) = three_commits(temp.path(), &mut engine);

    engine.navigate_to(&a).unwrap();
    engine.navigate_to(&b).unwrap();
    let marker = engine.rewind_marker().unwrap();
    assert_eq!(marker.viewing_commit_id, b);
    assert_eq!(marker.origin_tip_commit_id.as_ref(), Some(&c));

    engine.navigate_to(&c).unwrap();
    assert!(!engine.is_rewound());
    assert_eq!(read(temp.path(), "intro.sk"), "c");
    assert_eq!(engine.state().unwrap(), EngineState::Clean { tip: Some(c) });
}

#[test]
fn test_navigate_unknown_commit() {
    let (temp, mut engine) = init();
    three_commits(temp.path(), &mut engine);
    let err = engine.navigate_to(&CommitId::from_seq(99)).unwrap_err();
    assert!(matches!(err, VersionError::CommitNotFound(_)));
}

#[test]
fn test_rewind_survives_reopen() {
    let (temp, mut engine) = init();
    let (a, _, _) = three_commits(temp.path(), &mut engine);
    engine.navigate_to(&a).unwrap();
    drop(engine);

    let engine = SnapshotEngine::open(temp.path(), VersioningConfig::default()).unwrap();
    assert!(engine.is_rewound());
    assert_eq!(engine.rewind_marker().unwrap().viewing_commit_id, a);
}

// ============================================================================
// Deferred fork
// ============================================================================

#[test]
fn test_deferred_fork_then_save_at_tip() {
    let (temp, mut engine) = init();
    let (a, _, c) = three_commits(temp.path(), &mut engine);

    engine.navigate_to(&a).unwrap();
    // Nothing is branched at navigation time.
    assert_eq!(engine.list_timelines().unwrap().len(), 1);
    assert!(engine.ghost_branch().unwrap().is_some());

    write(temp.path(), "intro.sk", "a-prime");
    let fork = engine.save("x", None).unwrap();
    assert!(fork.forked);
    assert_ne!(fork.timeline, "main");
    assert_eq!(fork.commit.parent_id.as_ref(), Some(&a));
    assert_eq!(head_of(&engine, "main"), Some(c.clone()));
    assert_eq!(engine.history(&fork.timeline).unwrap().len(), 2);
    assert_eq!(engine.active_name(), fork.timeline);

    engine.switch_timeline("main").unwrap();
    engine.navigate_to(&c).unwrap();
    write(temp.path(), "intro.sk", "d");
    let d = engine.save("y", None).unwrap();
    assert!(!d.forked);
    assert_eq!(d.timeline, "main");
    assert_eq!(d.commit.parent_id.as_ref(), Some(&c));
    assert_eq!(head_of(&engine, "main"), Some(d.commit.id));
    assert_eq!(engine.list_timelines().unwrap().len(), 2);
}

#[test]
fn test_experiment_fork_scenario() {
    let (temp, mut engine) = init();
    let (c1, _, c3) = three_commits(temp.path(), &mut engine);

    engine.navigate_to(&c1).unwrap();
    assert!(engine.is_rewound());

    let saved = engine.save("fork", Some("experiment")).unwrap();
    assert!(saved.forked);
    assert_eq!(saved.timeline, "experiment");
    assert_eq!(saved.commit.parent_id.as_ref(), Some(&c1));
    assert_eq!(engine.active_name(), "experiment");
    assert_eq!(head_of(&engine, "experiment"), Some(saved.commit.id));
    assert_eq!(head_of(&engine, "main"), Some(c3));
    assert!(!engine.is_rewound());

    let experiment = engine
        .list_timelines()
        .unwrap()
        .into_iter()
        .find(|t| t.name == "experiment")
        .unwrap();
    assert_eq!(experiment.label, "experiment");
    assert!(experiment.is_active);
}

#[test]
fn test_fork_label_collision_writes_nothing() {
    let (temp, mut engine) = init();
    let (a, _, c) = three_commits(temp.path(), &mut engine);
    engine.create_timeline(&c, "experiment", None).unwrap();
    engine.switch_timeline("main").unwrap();

    engine.navigate_to(&a).unwrap();
    let err = engine.save("x", Some("Experiment")).unwrap_err();
    assert!(matches!(err, VersionError::DuplicateTimeline(_)));
    assert!(engine.is_rewound());
    assert!(engine.commit(&CommitId::from_seq(4)).is_err());
}

#[test]
fn test_fork_label_without_ascii_keeps_generated_name() {
    let (temp, mut engine) = init();
    let (a, _, c) = three_commits(temp.path(), &mut engine);

    engine.navigate_to(&a).unwrap();
    write(temp.path(), "intro.sk", "a-prime");
    let saved = engine.save("x", Some("実験")).unwrap();

    assert!(saved.forked);
    assert_eq!(saved.timeline, "fork-1");
    assert_eq!(saved.commit.parent_id.as_ref(), Some(&a));
    assert_eq!(head_of(&engine, "main"), Some(c));

    let fork = engine
        .list_timelines()
        .unwrap()
        .into_iter()
        .find(|t| t.name == "fork-1")
        .unwrap();
    assert_eq!(fork.label, "実験");
    assert!(fork.is_active);
}

#[test]
fn test_punctuation_fork_label_keeps_generated_name() {
    let (temp, mut engine) = init();
    let (a, _, _) = three_commits(temp.path(), &mut engine);

    engine.navigate_to(&a).unwrap();
    write(temp.path(), "intro.sk", "a-prime");
    let saved = engine.save("x", Some("!!!")).unwrap();

    assert!(saved.forked);
    assert!(saved.timeline.starts_with("fork-"));
    assert!(!engine.is_rewound());
}

#[test]
fn test_save_at_other_timeline_head_switches_to_it() {
    let (temp, mut engine) = init();
    let (a, _, _) = three_commits(temp.path(), &mut engine);
    engine.create_timeline(&a, "alt", None).unwrap();
    write(temp.path(), "intro.sk", "alt-1");
    let alt1 = engine.save("alt 1", None).unwrap().commit.id;

    engine.switch_timeline("main").unwrap();
    engine.navigate_to(&alt1).unwrap();
    write(temp.path(), "intro.sk", "alt-2");
    let saved = engine.save("alt 2", None).unwrap();

    assert!(!saved.forked);
    assert_eq!(saved.timeline, "alt");
    assert_eq!(engine.active_name(), "alt");
    assert_eq!(head_of(&engine, "alt"), Some(saved.commit.id));
}

#[test]
fn test_fork_decision_uses_current_heads() {
    let (temp, mut engine) = init();
    let (_, b, _) = three_commits(temp.path(), &mut engine);
    engine.navigate_to(&b).unwrap();

    // Another process creates a timeline whose head is the viewed commit.
    {
        let project = Project::from_root(temp.path()).unwrap();
        let mut registry = cutready_core::TimelineRegistry::open(&project).unwrap();
        registry.create(Some(&b), "review", None).unwrap();
    }

    write(temp.path(), "intro.sk", "reviewed");
    let saved = engine.save("review pass", None).unwrap();
    assert!(!saved.forked);
    assert_eq!(saved.timeline, "review");
}

// ============================================================================
// Stash
// ============================================================================

#[test]
fn test_stash_scenario() {
    let (temp, mut engine) = init();
    write(temp.path(), "A.sk", "x");
    engine.save("v1", None).unwrap();

    write(temp.path(), "A.sk", "y");
    assert!(engine.is_dirty().unwrap());

    engine.stash_changes().unwrap();
    assert_eq!(read(temp.path(), "A.sk"), "x");
    assert!(engine.has_stash());
    assert!(!engine.is_dirty().unwrap());

    engine.pop_stash().unwrap();
    assert_eq!(read(temp.path(), "A.sk"), "y");
    assert!(engine.is_dirty().unwrap());
    assert!(!engine.has_stash());
}

#[test]
fn test_stash_round_trip_restores_exact_tree() {
    let (temp, mut engine) = init();
    write(temp.path(), "intro.sk", "base");
    write(temp.path(), "notes/old.md", "old");
    engine.save("v1", None).unwrap();

    write(temp.path(), "intro.sk", "edited");
    write(temp.path(), "new.sb", "board");
    fs::remove_file(temp.path().join("notes/old.md")).unwrap();
    let before = engine.status().unwrap().changes;

    engine.stash_changes().unwrap();
    assert!(!temp.path().join("new.sb").exists());
    assert_eq!(read(temp.path(), "notes/old.md"), "old");

    engine.pop_stash().unwrap();
    assert_eq!(read(temp.path(), "intro.sk"), "edited");
    assert_eq!(read(temp.path(), "new.sb"), "board");
    assert!(!temp.path().join("notes/old.md").exists());
    assert_eq!(engine.status().unwrap().changes, before);
}

#[test]
fn test_second_stash_is_rejected() {
    let (temp, mut engine) = init();
    write(temp.path(), "A.sk", "x");
    engine.save("v1", None).unwrap();
    write(temp.path(), "A.sk", "y");
    engine.stash_changes().unwrap();
    write(temp.path(), "A.sk", "z");

    let err = engine.stash_changes().unwrap_err();
    assert!(matches!(err, VersionError::StashAlreadyExists { .. }));
    assert_eq!(read(temp.path(), "A.sk"), "z");
}

#[test]
fn test_pop_without_stash() {
    let (_temp, mut engine) = init();
    assert!(matches!(engine.pop_stash(), Err(VersionError::NoStashToPop)));
}

#[test]
fn test_stash_then_navigate_and_back() {
    let (temp, mut engine) = init();
    let (a, _, c) = three_commits(temp.path(), &mut engine);
    write(temp.path(), "intro.sk", "wip");

    engine.stash_then_navigate(&a).unwrap();
    assert!(engine.is_rewound());
    assert!(engine.has_stash());
    assert_eq!(read(temp.path(), "intro.sk"), "a");

    engine.navigate_to(&c).unwrap();
    engine.pop_stash().unwrap();
    assert_eq!(read(temp.path(), "intro.sk"), "wip");
    assert_eq!(engine.state().unwrap(), EngineState::Dirty { tip: Some(c) });
}

#[test]
fn test_discard_then_navigate_drops_edits() {
    let (temp, mut engine) = init();
    let (a, _, _) = three_commits(temp.path(), &mut engine);
    write(temp.path(), "intro.sk", "wip");

    engine.discard_then_navigate(&a).unwrap();
    assert_eq!(read(temp.path(), "intro.sk"), "a");
    assert!(!engine.has_stash());
    assert!(!engine.is_dirty().unwrap());
}

// ============================================================================
// Timelines
// ============================================================================

#[test]
fn test_delete_active_timeline_is_rejected() {
    let (temp, mut engine) = init();
    three_commits(temp.path(), &mut engine);
    let before = engine.list_timelines().unwrap();

    let err = engine.delete_timeline("main").unwrap_err();
    assert!(matches!(err, VersionError::CannotDeleteActive(_)));
    assert_eq!(engine.list_timelines().unwrap(), before);
}

#[test]
fn test_create_and_switch_timeline() {
    let (temp, mut engine) = init();
    let (a, _, c) = three_commits(temp.path(), &mut engine);

    let alt = engine.create_timeline(&a, "alt", Some("Alternate cut")).unwrap();
    assert!(alt.is_active);
    assert_eq!(alt.label, "Alternate cut");
    assert_eq!(read(temp.path(), "intro.sk"), "a");
    assert_eq!(engine.state().unwrap(), EngineState::Clean { tip: Some(a) });

    engine.switch_timeline("main").unwrap();
    assert_eq!(read(temp.path(), "intro.sk"), "c");
    assert_eq!(engine.active_head(), Some(&c));

    engine.delete_timeline("alt").unwrap();
    assert_eq!(engine.list_timelines().unwrap().len(), 1);
}

#[test]
fn test_switch_timeline_rejected_while_dirty() {
    let (temp, mut engine) = init();
    let (a, _, _) = three_commits(temp.path(), &mut engine);
    engine.create_timeline(&a, "alt", None).unwrap();
    write(temp.path(), "intro.sk", "wip");

    let err = engine.switch_timeline("main").unwrap_err();
    assert!(matches!(err, VersionError::DirtyWorkingTree));
    assert_eq!(engine.active_name(), "alt");
}

#[test]
fn test_graph_shows_fork_edge() {
    let (temp, mut engine) = init();
    let (a, _, _) = three_commits(temp.path(), &mut engine);
    engine.navigate_to(&a).unwrap();
    write(temp.path(), "intro.sk", "branch");
    let fork = engine.save("branch", Some("experiment")).unwrap();

    let graph = engine.timeline_graph().unwrap();
    assert_eq!(graph.lanes.len(), 2);
    assert_eq!(graph.nodes.len(), 4);
    assert_eq!(graph.nodes[0].id, fork.commit.id);
    let fork_edge = graph.edges.iter().find(|e| e.from == fork.commit.id).unwrap();
    assert!(fork_edge.fork);
    assert_eq!(fork_edge.to, a);
}

// ============================================================================
// Several instances on one project
// ============================================================================

#[test]
fn test_stale_instance_saves_after_other_instance() {
    let (temp, mut first) = init();
    write(temp.path(), "intro.sk", "a");
    let a = first.save("A", None).unwrap().commit.id;

    let mut second = SnapshotEngine::open(temp.path(), VersioningConfig::default()).unwrap();
    write(temp.path(), "intro.sk", "b");
    let b = first.save("B", None).unwrap().commit.id;

    write(temp.path(), "intro.sk", "c");
    let c = second.save("C", None).unwrap();
    assert_eq!(c.commit.id, CommitId::from_seq(3));
    assert_eq!(c.commit.parent_id.as_ref(), Some(&b));
    assert_eq!(first.commit(&b).unwrap().parent_id, Some(a));
    assert_eq!(head_of(&second, "main"), Some(c.commit.id));
}

#[test]
fn test_save_after_other_instance_forked_from_rewind() {
    let (temp, mut first) = init();
    write(temp.path(), "intro.sk", "a");
    let a = first.save("A", None).unwrap().commit.id;
    write(temp.path(), "intro.sk", "b");
    let b = first.save("B", None).unwrap().commit.id;
    first.navigate_to(&a).unwrap();

    let mut second = SnapshotEngine::open(temp.path(), VersioningConfig::default()).unwrap();
    assert!(second.is_rewound());
    write(temp.path(), "intro.sk", "from second");
    let forked = second.save("second", None).unwrap();
    assert!(forked.forked);
    assert_eq!(forked.commit.id, CommitId::from_seq(3));

    write(temp.path(), "intro.sk", "from first");
    let saved = first.save("first", None).unwrap();
    assert_eq!(saved.commit.id, CommitId::from_seq(4));
    assert_eq!(saved.commit.parent_id.as_ref(), Some(&forked.commit.id));
    assert_eq!(saved.timeline, forked.timeline);
    assert!(!saved.forked);
    assert!(!first.is_rewound());
    assert_eq!(head_of(&first, "main"), Some(b));
    assert_eq!(first.commit(&forked.commit.id).unwrap().message, "second");
}

#[test]
fn test_mutation_waits_for_project_lock() {
    let temp = TempDir::new().unwrap();
    let config = VersioningConfig {
        lock_wait_ms: 50,
        ..Default::default()
    };
    let mut engine = SnapshotEngine::init(temp.path(), config).unwrap();
    write(temp.path(), "intro.sk", "a");

    let held = ProjectLock::acquire(&engine.project().lock_path()).unwrap();
    let err = engine.save("A", None).unwrap_err();
    assert!(matches!(err, VersionError::ProjectBusy { .. }));
    assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
    assert!(engine.list_versions().unwrap().is_empty());

    drop(held);
    let saved = engine.save("A", None).unwrap();
    assert_eq!(saved.commit.id, CommitId::from_seq(1));
    assert!(!engine.project().lock_path().exists());
}

// ============================================================================
// Recovery
// ============================================================================

#[test]
fn test_interrupted_switch_resumes() {
    let (temp, mut engine) = init();
    let (a, _, _) = three_commits(temp.path(), &mut engine);
    engine.create_timeline(&a, "alt", None).unwrap();
    drop(engine);

    let project = Project::from_root(temp.path()).unwrap();
    let head = engine_head(temp.path(), "main");
    PendingOperation::new(PendingOp::SwitchTimeline, head.as_ref())
        .with_timeline("main")
        .store(&project.pending_path())
        .unwrap();

    let mut engine = SnapshotEngine::open(temp.path(), VersioningConfig::default()).unwrap();
    assert!(matches!(engine.navigate_to(&a), Err(VersionError::InterruptedOperation { .. })));
    assert_eq!(engine.list_timelines().unwrap().len(), 2);

    engine.recover(RecoveryAction::Resume).unwrap();
    assert_eq!(engine.active_name(), "main");
    assert_eq!(read(temp.path(), "intro.sk"), "c");
    assert!(!engine.is_dirty().unwrap());
}

fn engine_head(root: &Path, timeline: &str) -> Option<CommitId> {
    let engine = SnapshotEngine::open(root, VersioningConfig::default()).unwrap();
    head_of(&engine, timeline)
}
