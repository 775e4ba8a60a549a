//! Integration tests for the composition editing operations.
//!
//! Exercises cross-crate interactions between montage-core and
//! montage-timeline through the public Timeline API.

use montage_core::{MontageError, RationalTime};
use montage_timeline::{
    Composition, MediaKind, MoveOptions, RemoveOptions, SourceFactory, TimedObject, Timeline,
};
use uuid::Uuid;

// ── Helpers ────────────────────────────────────────────────────

fn clip(name: &str, secs: i64) -> TimedObject {
    TimedObject::from_factory(
        name,
        SourceFactory::new("media/test.mp4", RationalTime::from_secs(secs)),
        MediaKind::Video,
    )
}

fn video_timeline() -> (Timeline, Uuid) {
    let mut t = Timeline::new("Integration Test Timeline");
    let comp = t.add_composition(Composition::new("V1", MediaKind::Video));
    (t, comp)
}

fn av_timeline() -> (Timeline, Uuid, Uuid) {
    let mut t = Timeline::new("Integration Test Timeline");
    let (v, a) = t.add_linked_pair("V1", "A1");
    (t, v, a)
}

/// Append `names` one after another, one second each, returning their ids.
fn build_row(t: &mut Timeline, comp: Uuid, names: &[&str]) -> Vec<Uuid> {
    let mut ids = Vec::new();
    let mut last = None;
    for name in names {
        let id = t
            .insert_source_after(comp, clip(name, 1), last, false, false)
            .unwrap();
        ids.push(id);
        last = Some(id);
    }
    ids
}

fn starts(t: &Timeline, comp: Uuid) -> Vec<i64> {
    t.composition(comp).unwrap().layers()[0]
        .objects()
        .iter()
        .map(|o| o.start().to_seconds_f64() as i64)
        .collect()
}

fn order(t: &Timeline, comp: Uuid) -> Vec<Uuid> {
    t.composition(comp).unwrap().layers()[0]
        .objects()
        .iter()
        .map(|o| o.id)
        .collect()
}

// ── Move round-trip ────────────────────────────────────────────

#[test]
fn move_last_source_to_middle() {
    // [S1, S2, S3] at 0/1/2s, move_source(S3, 1) → [S1, S3, S2] at 0/1/2s
    let (mut t, comp) = video_timeline();
    let ids = build_row(&mut t, comp, &["s1", "s2", "s3"]);
    assert_eq!(starts(&t, comp), vec![0, 1, 2]);

    t.move_source(comp, ids[2], 1, MoveOptions::default()).unwrap();

    assert_eq!(order(&t, comp), vec![ids[0], ids[2], ids[1]]);
    assert_eq!(starts(&t, comp), vec![0, 1, 2]);
}

#[test]
fn move_first_source_to_end() {
    let (mut t, comp) = video_timeline();
    let ids = build_row(&mut t, comp, &["s1", "s2", "s3"]);

    t.move_source(comp, ids[0], -1, MoveOptions::default()).unwrap();

    assert_eq!(order(&t, comp), vec![ids[1], ids[2], ids[0]]);
    assert_eq!(starts(&t, comp), vec![0, 1, 2]);
}

#[test]
fn move_positions_clamp_at_both_ends() {
    let (mut t, comp) = video_timeline();
    let ids = build_row(&mut t, comp, &["s1", "s2"]);

    // far past the end clamps to the end
    t.move_source(comp, ids[0], 99, MoveOptions::default()).unwrap();
    assert_eq!(order(&t, comp), vec![ids[1], ids[0]]);

    // below -1 clamps to the front
    t.move_source(comp, ids[0], -5, MoveOptions::default()).unwrap();
    assert_eq!(order(&t, comp), vec![ids[0], ids[1]]);
    assert_eq!(starts(&t, comp), vec![0, 1]);
}

// ── Remove ─────────────────────────────────────────────────────

#[test]
fn remove_with_collapse_closes_gap() {
    let (mut t, comp) = video_timeline();
    let ids = build_row(&mut t, comp, &["s1", "s2"]);

    t.remove_source(
        comp,
        ids[0],
        RemoveOptions {
            remove_linked: true,
            collapse_neighbours: true,
            collapse_neighbours_on_linked_too: false,
        },
    )
    .unwrap();

    assert_eq!(order(&t, comp), vec![ids[1]]);
    assert_eq!(starts(&t, comp), vec![0]);
}

#[test]
fn remove_without_collapse_keeps_layout() {
    let (mut t, comp) = video_timeline();
    let ids = build_row(&mut t, comp, &["s1", "s2"]);

    t.remove_source(
        comp,
        ids[0],
        RemoveOptions {
            remove_linked: true,
            collapse_neighbours: false,
            collapse_neighbours_on_linked_too: false,
        },
    )
    .unwrap();

    assert_eq!(starts(&t, comp), vec![1]);
}

#[test]
fn collapse_without_remove_linked_is_rejected_unchanged() {
    let (mut t, v, a) = av_timeline();
    let src_id = t.add_source(v, clip("c1", 2), 1, true).unwrap();
    t.drain_events();
    let video_before = t.composition(v).unwrap().clone();
    let audio_before = t.composition(a).unwrap().clone();

    let result = t.remove_source(
        v,
        src_id,
        RemoveOptions {
            remove_linked: false,
            collapse_neighbours: true,
            collapse_neighbours_on_linked_too: false,
        },
    );

    assert!(matches!(result, Err(MontageError::InvalidArgument(_))));
    assert_eq!(t.composition(v).unwrap(), &video_before);
    assert_eq!(t.composition(a).unwrap(), &audio_before);
    assert!(t.pending_events().is_empty());
}

#[test]
fn remove_missing_source_is_not_found() {
    let (mut t, comp) = video_timeline();
    build_row(&mut t, comp, &["s1"]);
    let result = t.remove_source(comp, Uuid::new_v4(), RemoveOptions::default());
    assert!(matches!(result, Err(MontageError::NotFound(_))));
}

// ── Insert and push ────────────────────────────────────────────

#[test]
fn insert_after_with_push_clears_overlap() {
    // [S1 (0,2s)], S3 at (2s,1s); inserting S2 (2s) after S1 with push
    // lands S2 at 2s and shifts S3 to 4s.
    let (mut t, comp) = video_timeline();
    let s1 = t.add_source(comp, clip("s1", 2), 1, false).unwrap();
    let s3_id = t
        .insert_source_after(comp, clip("s3", 1), Some(s1), false, false)
        .unwrap();
    assert_eq!(
        t.composition(comp).unwrap().find_source(s3_id).unwrap().start(),
        RationalTime::from_secs(2)
    );

    let s2_id = t
        .insert_source_after(comp, clip("s2", 2), Some(s1), true, false)
        .unwrap();

    let comp_ref = t.composition(comp).unwrap();
    assert_eq!(
        comp_ref.find_source(s2_id).unwrap().start(),
        RationalTime::from_secs(2)
    );
    assert_eq!(
        comp_ref.find_source(s3_id).unwrap().start(),
        RationalTime::from_secs(4)
    );
    assert!(comp_ref.layers()[0].is_sorted());
}

#[test]
fn insert_after_missing_anchor_starts_at_zero() {
    let (mut t, comp) = video_timeline();
    let id = t
        .insert_source_after(comp, clip("s1", 3), Some(Uuid::new_v4()), true, false)
        .unwrap();
    assert_eq!(
        t.composition(comp).unwrap().find_source(id).unwrap().start(),
        RationalTime::ZERO
    );
}

#[test]
fn insert_takes_factory_duration() {
    let (mut t, comp) = video_timeline();
    let id = t
        .insert_source_after(comp, clip("s1", 5), None, true, false)
        .unwrap();
    assert_eq!(
        t.composition(comp).unwrap().find_source(id).unwrap().duration(),
        RationalTime::from_secs(5)
    );
}

#[test]
fn append_and_prepend() {
    let (mut t, comp) = video_timeline();
    let first = t.append_source(comp, clip("first", 3), 1, false).unwrap();
    let second = t.append_source(comp, clip("second", 2), 1, false).unwrap();
    let front = t.prepend_source(comp, clip("front", 1), true, false).unwrap();

    let comp_ref = t.composition(comp).unwrap();
    assert_eq!(comp_ref.find_source(front).unwrap().start(), RationalTime::ZERO);
    assert_eq!(
        comp_ref.find_source(first).unwrap().start(),
        RationalTime::from_secs(1)
    );
    assert_eq!(
        comp_ref.find_source(second).unwrap().start(),
        RationalTime::from_secs(4)
    );
}

// ── Shifts ─────────────────────────────────────────────────────

#[test]
fn shift_sources_ripples_range() {
    let (mut t, comp) = video_timeline();
    build_row(&mut t, comp, &["s1", "s2", "s3"]);

    t.shift_sources(comp, RationalTime::from_secs(2), 1, None).unwrap();
    assert_eq!(starts(&t, comp), vec![0, 3, 4]);
}

#[test]
fn shift_sources_rejects_inverted_range() {
    let (mut t, comp) = video_timeline();
    build_row(&mut t, comp, &["s1", "s2"]);
    let before = t.composition(comp).unwrap().clone();

    let result = t.shift_sources(comp, RationalTime::from_secs(1), 2, Some(0));
    assert!(matches!(result, Err(MontageError::InvalidRange(_))));
    assert_eq!(t.composition(comp).unwrap(), &before);
}

#[test]
fn shift_below_zero_is_rejected_unchanged() {
    let (mut t, comp) = video_timeline();
    build_row(&mut t, comp, &["s1", "s2"]);
    let before = t.composition(comp).unwrap().clone();

    let result = t.shift_sources(comp, -RationalTime::from_secs(5), 0, None);
    assert!(matches!(result, Err(MontageError::InvalidArgument(_))));
    assert_eq!(t.composition(comp).unwrap(), &before);
}

// ── Linked compositions ────────────────────────────────────────

#[test]
fn mirrored_add_keeps_both_tracks_identical() {
    let (mut t, v, a) = av_timeline();
    let src = t.add_source(v, clip("c1", 3), 1, true).unwrap();

    let video = t.composition(v).unwrap();
    let audio = t.composition(a).unwrap();
    assert_eq!(video.layers()[0].len(), 1);
    assert_eq!(audio.layers()[0].len(), 1);

    let brother_id = video.find_source(src).unwrap().linked().unwrap();
    let brother = audio.find_source(brother_id).unwrap();
    assert_eq!(brother.media_kind, MediaKind::Audio);
    assert_eq!(brother.start(), video.find_source(src).unwrap().start());
    assert_eq!(brother.duration(), video.find_source(src).unwrap().duration());
}

#[test]
fn linked_pair_stays_in_sync_through_resize() {
    let (mut t, v, _a) = av_timeline();
    let src = t.add_source(v, clip("c1", 3), 1, true).unwrap();
    let brother = t.composition(v).unwrap().find_source(src).unwrap().linked().unwrap();

    t.set_source_start_duration(
        v,
        src,
        Some(RationalTime::from_secs(7)),
        Some(RationalTime::from_secs(4)),
    )
    .unwrap();

    let (_, b) = t.find_source(brother).unwrap();
    assert_eq!(b.start(), RationalTime::from_secs(7));
    assert_eq!(b.duration(), RationalTime::from_secs(4));
}

#[test]
fn linked_symmetry_holds_for_link_and_unlink() {
    let (mut t, v, a) = av_timeline();
    let x = t.add_source(v, clip("x", 1), 1, false).unwrap();
    let y = t.add_source(a, clip("y", 1), 1, false).unwrap();

    t.link_sources(v, x, a, y).unwrap();
    assert_eq!(t.find_source(x).unwrap().1.linked(), Some(y));
    assert_eq!(t.find_source(y).unwrap().1.linked(), Some(x));

    t.unlink_source(a, y).unwrap();
    assert_eq!(t.find_source(x).unwrap().1.linked(), None);
    assert_eq!(t.find_source(y).unwrap().1.linked(), None);

    // unlinking an unlinked source is a no-op
    t.unlink_source(a, y).unwrap();
}

#[test]
fn linked_removal_leaves_linked_layout_uncollapsed() {
    // documented asymmetry: the collapse ripples through the primary
    // composition only
    let (mut t, v, a) = av_timeline();
    let c1 = t.add_source(v, clip("c1", 1), 1, true).unwrap();
    t.insert_source_after(v, clip("c2", 1), Some(c1), false, true)
        .unwrap();

    t.remove_source(
        v,
        c1,
        RemoveOptions {
            remove_linked: true,
            collapse_neighbours: true,
            collapse_neighbours_on_linked_too: false,
        },
    )
    .unwrap();

    assert_eq!(starts(&t, v), vec![0]);
    assert_eq!(starts(&t, a), vec![1]);
}

#[test]
fn linked_removal_can_collapse_both_sides_on_request() {
    let (mut t, v, a) = av_timeline();
    let c1 = t.add_source(v, clip("c1", 1), 1, true).unwrap();
    t.insert_source_after(v, clip("c2", 1), Some(c1), false, true)
        .unwrap();

    t.remove_source(
        v,
        c1,
        RemoveOptions {
            remove_linked: true,
            collapse_neighbours: true,
            collapse_neighbours_on_linked_too: true,
        },
    )
    .unwrap();

    assert_eq!(starts(&t, v), vec![0]);
    assert_eq!(starts(&t, a), vec![0]);
}

// ── Condensed view ─────────────────────────────────────────────

#[test]
fn condensed_matches_fresh_merge_after_every_edit() {
    let (mut t, comp) = video_timeline();
    let ids = build_row(&mut t, comp, &["s1", "s2", "s3", "s4"]);

    let check = |t: &Timeline| {
        let c = t.composition(comp).unwrap();
        assert_eq!(c.condensed(), c.compute_condensed().as_slice());
    };
    check(&t);

    t.move_source(comp, ids[3], 0, MoveOptions::default()).unwrap();
    check(&t);

    t.remove_source(comp, ids[1], RemoveOptions::default()).unwrap();
    check(&t);

    t.shift_sources(comp, RationalTime::from_secs(1), 0, None).unwrap();
    check(&t);

    t.set_source_start_duration(comp, ids[0], Some(RationalTime::from_secs(9)), None)
        .unwrap();
    check(&t);
}

#[test]
fn condensed_change_fires_once_per_actual_change() {
    use montage_timeline::TimelineEvent;

    let (mut t, comp) = video_timeline();
    t.add_source(comp, clip("c1", 2), 1, false).unwrap();
    let events = t.drain_events();
    let changes = events
        .iter()
        .filter(|e| matches!(e, TimelineEvent::CondensedListChanged { .. }))
        .count();
    assert_eq!(changes, 1);

    // a rejected edit fires nothing
    let _ = t.remove_source(comp, Uuid::new_v4(), RemoveOptions::default());
    assert!(t.pending_events().is_empty());
}

// ── Clean up ───────────────────────────────────────────────────

#[test]
fn clean_up_empties_the_composition() {
    let (mut t, v, a) = av_timeline();
    t.add_source(v, clip("c1", 1), 1, true).unwrap();
    t.add_source(v, clip("c2", 1), 1, true).unwrap();

    t.clean_up(v).unwrap();
    let video = t.composition(v).unwrap();
    assert!(video.layers()[0].is_empty());
    assert!(video.condensed().is_empty());
    // clean-up is composition-local; the linked track keeps its sources
    assert_eq!(t.composition(a).unwrap().layers()[0].len(), 2);
}

// ── Positions ──────────────────────────────────────────────────

#[test]
fn layer_and_source_positions_are_one_based() {
    let (mut t, comp) = video_timeline();
    let ids = build_row(&mut t, comp, &["s1", "s2"]);

    let c = t.composition(comp).unwrap();
    assert_eq!(c.get_source_layer_position(ids[0]), 1);
    assert_eq!(c.get_simple_source_position(ids[0]), 1);
    assert_eq!(c.get_simple_source_position(ids[1]), 2);
    assert_eq!(c.get_source_layer_position(Uuid::new_v4()), 0);
    assert_eq!(c.get_simple_source_position(Uuid::new_v4()), 0);
}
