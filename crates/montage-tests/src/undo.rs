//! Integration tests for the transactional action log.
//!
//! Drives real timeline edits, feeds the drained event stream into an
//! ActionLog, and verifies undo/redo restore the full object graph,
//! including mirrored edits across linked compositions.

use montage_core::RationalTime;
use montage_timeline::{
    ActionLog, MediaKind, MoveOptions, RemoveOptions, SourceFactory, TimedObject, Timeline,
};
use uuid::Uuid;

// ── Helpers ────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("montage_timeline=debug")
        .try_init();
}

fn clip(name: &str, secs: i64) -> TimedObject {
    TimedObject::from_factory(
        name,
        SourceFactory::new("media/test.mp4", RationalTime::from_secs(secs)),
        MediaKind::Video,
    )
}

fn av_timeline() -> (Timeline, Uuid, Uuid) {
    let mut t = Timeline::new("Undo Integration");
    let (v, a) = t.add_linked_pair("V1", "A1");
    (t, v, a)
}

fn layer_len(t: &Timeline, comp: Uuid) -> usize {
    t.composition(comp).unwrap().layers()[0].len()
}

// ── Mirrored edits as one transaction ──────────────────────────

#[test]
fn undo_mirrored_add_restores_both_tracks() {
    init_tracing();
    let (mut t, v, a) = av_timeline();
    let mut log = ActionLog::new(100);

    log.begin("Add clip").unwrap();
    let src = t.add_source(v, clip("c1", 3), 1, true).unwrap();
    log.observe(&t.drain_events());
    log.commit().unwrap();

    assert_eq!(layer_len(&t, v), 1);
    assert_eq!(layer_len(&t, a), 1);

    let name = log.undo(&mut t).unwrap();
    assert_eq!(name, "Add clip");
    assert_eq!(layer_len(&t, v), 0);
    assert_eq!(layer_len(&t, a), 0);

    log.redo(&mut t).unwrap();
    assert_eq!(layer_len(&t, v), 1);
    assert_eq!(layer_len(&t, a), 1);
    // the restored pair is still linked both ways
    let restored = t.composition(v).unwrap().find_source(src).unwrap();
    let brother = restored.linked().unwrap();
    assert_eq!(t.find_source(brother).unwrap().1.linked(), Some(src));
}

#[test]
fn undo_mirrored_remove_restores_link_fields() {
    let (mut t, v, a) = av_timeline();
    let mut log = ActionLog::new(100);
    let src = t.add_source(v, clip("c1", 3), 1, true).unwrap();
    let brother = t.composition(v).unwrap().find_source(src).unwrap().linked().unwrap();
    t.drain_events();

    log.begin("Delete clip").unwrap();
    t.remove_source(v, src, RemoveOptions::default()).unwrap();
    log.observe(&t.drain_events());
    log.commit().unwrap();

    assert_eq!(layer_len(&t, v), 0);
    assert_eq!(layer_len(&t, a), 0);

    log.undo(&mut t).unwrap();
    assert_eq!(layer_len(&t, v), 1);
    assert_eq!(layer_len(&t, a), 1);
    assert_eq!(
        t.composition(v).unwrap().find_source(src).unwrap().linked(),
        Some(brother)
    );
    assert_eq!(
        t.composition(a).unwrap().find_source(brother).unwrap().linked(),
        Some(src)
    );
}

// ── Multi-step transactions ────────────────────────────────────

#[test]
fn one_transaction_per_user_gesture() {
    let (mut t, v, _a) = av_timeline();
    let mut log = ActionLog::new(100);

    // three separate gestures → three undo steps
    let mut last = None;
    for name in ["c1", "c2", "c3"] {
        log.begin(format!("Add {name}")).unwrap();
        let id = t
            .insert_source_after(v, clip(name, 1), last, false, true)
            .unwrap();
        log.observe(&t.drain_events());
        log.commit().unwrap();
        last = Some(id);
    }
    assert_eq!(log.undo_count(), 3);

    log.undo(&mut t).unwrap();
    log.undo(&mut t).unwrap();
    assert_eq!(layer_len(&t, v), 1);
    assert_eq!(log.redo_count(), 2);

    log.redo(&mut t).unwrap();
    log.redo(&mut t).unwrap();
    assert_eq!(layer_len(&t, v), 3);
}

#[test]
fn undo_move_then_redo_reproduces_layout() {
    let (mut t, v, _a) = av_timeline();
    let mut log = ActionLog::new(100);
    let mut ids = Vec::new();
    let mut last = None;
    for name in ["s1", "s2", "s3"] {
        let id = t
            .insert_source_after(v, clip(name, 1), last, false, false)
            .unwrap();
        ids.push(id);
        last = Some(id);
    }
    t.drain_events();

    log.begin("Move clip").unwrap();
    t.move_source(v, ids[2], 1, MoveOptions::default()).unwrap();
    log.observe(&t.drain_events());
    log.commit().unwrap();

    let moved: Vec<RationalTime> = ids
        .iter()
        .map(|id| t.composition(v).unwrap().find_source(*id).unwrap().start())
        .collect();

    log.undo(&mut t).unwrap();
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(
            t.composition(v).unwrap().find_source(*id).unwrap().start(),
            RationalTime::from_secs(i as i64)
        );
    }

    log.redo(&mut t).unwrap();
    let redone: Vec<RationalTime> = ids
        .iter()
        .map(|id| t.composition(v).unwrap().find_source(*id).unwrap().start())
        .collect();
    assert_eq!(moved, redone);
}

#[test]
fn undo_resize_restores_linked_pair() {
    let (mut t, v, _a) = av_timeline();
    let mut log = ActionLog::new(100);
    let src = t.add_source(v, clip("c1", 3), 1, true).unwrap();
    let brother = t.composition(v).unwrap().find_source(src).unwrap().linked().unwrap();
    t.drain_events();

    log.begin("Resize clip").unwrap();
    t.set_source_start_duration(
        v,
        src,
        Some(RationalTime::from_secs(10)),
        Some(RationalTime::from_secs(1)),
    )
    .unwrap();
    log.observe(&t.drain_events());
    log.commit().unwrap();

    log.undo(&mut t).unwrap();
    for id in [src, brother] {
        let (_, obj) = t.find_source(id).unwrap();
        assert_eq!(obj.start(), RationalTime::ZERO);
        assert_eq!(obj.duration(), RationalTime::from_secs(3));
    }
}

// ── Rollback ───────────────────────────────────────────────────

#[test]
fn rollback_reverts_a_partial_gesture() {
    let (mut t, v, a) = av_timeline();
    let mut log = ActionLog::new(100);

    log.begin("Abandoned gesture").unwrap();
    t.add_source(v, clip("c1", 2), 1, true).unwrap();
    log.observe(&t.drain_events());
    log.rollback(&mut t).unwrap();

    assert_eq!(layer_len(&t, v), 0);
    assert_eq!(layer_len(&t, a), 0);
    assert!(!log.can_undo());
}

#[test]
fn events_outside_a_transaction_are_not_undoable() {
    let (mut t, v, _a) = av_timeline();
    let mut log = ActionLog::new(100);

    t.add_source(v, clip("c1", 2), 1, false).unwrap();
    log.observe(&t.drain_events());

    assert!(!log.can_undo());
    assert_eq!(layer_len(&t, v), 1);
}
