//! The timeline: the owning scope for compositions and mirrored edits.
//!
//! A timeline owns every composition of a project and is the only place
//! that can see two compositions at once, so all cross-composition work
//! lives here: linked-composition mirroring, brother construction, and
//! linked start/duration propagation. Mirroring is synchronous and atomic:
//! the primary edit runs first, then the mirrored edit, and a mirrored
//! failure rolls the primary back before the error propagates, so both
//! linked tracks agree when the call returns, or neither changed.
//!
//! Mirrored calls cannot recurse: the inner edit is the single-composition
//! variant on [`Composition`], which has no linked-sibling parameter.

use montage_core::{MontageError, RationalTime, Result};
use tracing::debug;
use uuid::Uuid;

use crate::composition::Composition;
use crate::event::TimelineEvent;
use crate::object::TimedObject;

/// Flags for [`Timeline::move_source`].
#[derive(Debug, Clone, Copy)]
pub struct MoveOptions {
    /// Accepted for API symmetry with the other linked-aware edits, but a
    /// full symmetric move on the linked composition is an explicit,
    /// separately decided extension point; the linked composition is left
    /// untouched.
    pub move_linked: bool,
    /// Cascade-push occupants of the insertion point forward until the
    /// moved source fits.
    pub push_neighbours: bool,
    /// Close the gap the source leaves behind.
    pub collapse_neighbours: bool,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            move_linked: false,
            push_neighbours: true,
            collapse_neighbours: true,
        }
    }
}

/// Flags for [`Timeline::remove_source`].
#[derive(Debug, Clone, Copy)]
pub struct RemoveOptions {
    /// Also remove the linked partner from the linked composition.
    pub remove_linked: bool,
    /// Shift everything after the removed source backward by its duration.
    /// Requires `remove_linked`; collapsing only one of two linked tracks
    /// would desynchronize their layouts.
    pub collapse_neighbours: bool,
    /// Collapse neighbours on the linked side as well. Off by default: the
    /// historical behavior ripples the collapse through the primary
    /// composition only, and that asymmetry is preserved as-is.
    pub collapse_neighbours_on_linked_too: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self {
            remove_linked: true,
            collapse_neighbours: false,
            collapse_neighbours_on_linked_too: false,
        }
    }
}

/// A timeline: every composition of one project plus the pending
/// change-event queue.
#[derive(Debug, Clone)]
pub struct Timeline {
    /// Unique timeline ID
    pub id: Uuid,
    /// Timeline name
    pub name: String,
    compositions: Vec<Composition>,
    events: Vec<TimelineEvent>,
}

impl Timeline {
    /// Create a new empty timeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            compositions: Vec::new(),
            events: Vec::new(),
        }
    }

    // ── Composition management ──────────────────────────────────

    /// Add a composition. Returns its id.
    pub fn add_composition(&mut self, composition: Composition) -> Uuid {
        let id = composition.id;
        self.compositions.push(composition);
        id
    }

    /// Create a linked video/audio composition pair, the usual shape of a
    /// loaded project.
    pub fn add_linked_pair(
        &mut self,
        video_name: impl Into<String>,
        audio_name: impl Into<String>,
    ) -> (Uuid, Uuid) {
        use crate::object::MediaKind;
        let video = self.add_composition(Composition::new(video_name, MediaKind::Video));
        let audio = self.add_composition(Composition::new(audio_name, MediaKind::Audio));
        self.link_compositions(video, audio)
            .expect("freshly created compositions are unlinked");
        (video, audio)
    }

    /// All compositions, in creation order.
    pub fn compositions(&self) -> &[Composition] {
        &self.compositions
    }

    /// Look up a composition by id.
    pub fn composition(&self, id: Uuid) -> Option<&Composition> {
        self.compositions.iter().find(|c| c.id == id)
    }

    fn comp_index(&self, id: Uuid) -> Result<usize> {
        self.compositions
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| MontageError::NotFound(format!("composition {id} not in timeline")))
    }

    pub(crate) fn composition_and_events_mut(
        &mut self,
        id: Uuid,
    ) -> Result<(&mut Composition, &mut Vec<TimelineEvent>)> {
        let idx = self.comp_index(id)?;
        Ok((&mut self.compositions[idx], &mut self.events))
    }

    /// Establish the symmetric linked-composition relation between two
    /// compositions. No-op when the two are already linked to each other;
    /// fails when either is linked elsewhere.
    pub fn link_compositions(&mut self, a: Uuid, b: Uuid) -> Result<()> {
        if a == b {
            return Err(MontageError::InvalidArgument(
                "cannot link a composition to itself".into(),
            ));
        }
        let ai = self.comp_index(a)?;
        let bi = self.comp_index(b)?;
        let a_linked = self.compositions[ai].linked_composition;
        let b_linked = self.compositions[bi].linked_composition;
        if a_linked == Some(b) && b_linked == Some(a) {
            return Ok(());
        }
        if a_linked.is_some() || b_linked.is_some() {
            return Err(MontageError::InvalidArgument(
                "composition is already linked to another composition".into(),
            ));
        }
        self.compositions[ai].linked_composition = Some(b);
        self.compositions[bi].linked_composition = Some(a);
        debug!(a = %a, b = %b, "linked compositions");
        Ok(())
    }

    /// Dissolve the linked-composition relation between two compositions.
    pub fn unlink_compositions(&mut self, a: Uuid, b: Uuid) -> Result<()> {
        let ai = self.comp_index(a)?;
        let bi = self.comp_index(b)?;
        if self.compositions[ai].linked_composition != Some(b)
            || self.compositions[bi].linked_composition != Some(a)
        {
            return Err(MontageError::InvalidArgument(
                "compositions are not linked to each other".into(),
            ));
        }
        self.compositions[ai].linked_composition = None;
        self.compositions[bi].linked_composition = None;
        Ok(())
    }

    // ── Events ──────────────────────────────────────────────────

    /// Take the queued change events, oldest first.
    pub fn drain_events(&mut self) -> Vec<TimelineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Events queued since the last drain.
    pub fn pending_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    // ── Lookup ──────────────────────────────────────────────────

    /// Find a source anywhere on the timeline.
    pub fn find_source(&self, id: Uuid) -> Option<(&Composition, &TimedObject)> {
        self.compositions
            .iter()
            .find_map(|c| c.find_source(id).map(|o| (c, o)))
    }

    fn locate_source(&self, id: Uuid) -> Option<usize> {
        self.compositions
            .iter()
            .position(|c| c.find_source(id).is_some())
    }

    // ── Rollback plumbing ───────────────────────────────────────

    /// Run a multi-composition edit; on failure, restore the named
    /// compositions and drop any events queued by the partial edit.
    fn with_rollback<T>(
        &mut self,
        involved: &[usize],
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let mut unique = involved.to_vec();
        unique.sort_unstable();
        unique.dedup();
        let snapshots: Vec<(usize, Composition)> = unique
            .iter()
            .map(|&i| (i, self.compositions[i].clone()))
            .collect();
        let ev_mark = self.events.len();
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                for (i, snapshot) in snapshots {
                    self.compositions[i] = snapshot;
                }
                self.events.truncate(ev_mark);
                Err(e)
            }
        }
    }

    fn linked_index(&self, idx: usize) -> Result<Option<usize>> {
        match self.compositions[idx].linked_composition {
            Some(lid) => Ok(Some(self.comp_index(lid)?)),
            None => Ok(None),
        }
    }

    // ── Source editing ──────────────────────────────────────────

    /// Insert a source into the layer selected by `position` (`0` = above
    /// all, `n` = position n, `-1` = bottom). With `auto_linked` and a
    /// linked composition, the source's brother is added there with the
    /// same parameters.
    pub fn add_source(
        &mut self,
        composition: Uuid,
        source: TimedObject,
        position: i32,
        auto_linked: bool,
    ) -> Result<Uuid> {
        let idx = self.comp_index(composition)?;
        let linked_idx = if auto_linked { self.linked_index(idx)? } else { None };
        let mut involved = vec![idx];
        involved.extend(linked_idx);
        self.with_rollback(&involved, |t| {
            let src_id = t.compositions[idx].add_source(source, position, &mut t.events)?;
            if let Some(li) = linked_idx {
                t.mirror_add(idx, li, src_id, position)?;
            }
            Ok(src_id)
        })
    }

    /// Insert a source immediately after an existing one (or at time zero
    /// when `after` is missing). The source takes its factory's natural
    /// duration; with `push_following`, everything after the anchor shifts
    /// forward to make room before the insertion happens.
    pub fn insert_source_after(
        &mut self,
        composition: Uuid,
        mut source: TimedObject,
        after: Option<Uuid>,
        push_following: bool,
        auto_linked: bool,
    ) -> Result<Uuid> {
        let idx = self.comp_index(composition)?;
        if let Some(factory) = &source.factory {
            source.duration = factory.default_duration;
        }
        let comp = &self.compositions[idx];
        let anchor = after.and_then(|a| comp.find_source(a).map(|o| (a, o.end())));
        let (start, position, followers_from) = match anchor {
            Some((a_id, end)) => (
                end,
                comp.get_source_layer_position(a_id) as i32,
                comp.get_simple_source_position(a_id) as usize,
            ),
            None => (RationalTime::ZERO, 1, 0),
        };
        source.start = start;

        let linked_idx = if auto_linked { self.linked_index(idx)? } else { None };
        let mut involved = vec![idx];
        involved.extend(linked_idx);
        let duration = source.duration;
        self.with_rollback(&involved, |t| {
            if push_following && followers_from < t.compositions[idx].layers()[0].len() {
                t.compositions[idx].shift_sources(duration, followers_from, None, &mut t.events)?;
            }
            let src_id = t.compositions[idx].add_source(source, position, &mut t.events)?;
            if let Some(li) = linked_idx {
                t.mirror_add(idx, li, src_id, position)?;
            }
            Ok(src_id)
        })
    }

    /// Append a source after the last object of the layer selected by
    /// `position`.
    pub fn append_source(
        &mut self,
        composition: Uuid,
        source: TimedObject,
        position: i32,
        auto_linked: bool,
    ) -> Result<Uuid> {
        let idx = self.comp_index(composition)?;
        let comp = &self.compositions[idx];
        let layer_idx = comp.resolve_layer(position);
        let last = comp.layer(layer_idx).and_then(|l| l.last()).map(|o| o.id);
        self.insert_source_after(composition, source, last, false, auto_linked)
    }

    /// Insert a source at time zero, pushing the existing sources forward.
    pub fn prepend_source(
        &mut self,
        composition: Uuid,
        source: TimedObject,
        push_following: bool,
        auto_linked: bool,
    ) -> Result<Uuid> {
        self.insert_source_after(composition, source, None, push_following, auto_linked)
    }

    /// Move a source to a new position within its layer. See
    /// [`Composition`] for the relocation protocol; `opts.move_linked` is
    /// accepted but the linked composition is not touched.
    pub fn move_source(
        &mut self,
        composition: Uuid,
        source: Uuid,
        new_position: i32,
        opts: MoveOptions,
    ) -> Result<()> {
        let idx = self.comp_index(composition)?;
        self.compositions[idx].move_source(
            source,
            new_position,
            opts.push_neighbours,
            opts.collapse_neighbours,
            &mut self.events,
        )
    }

    /// Remove a source, optionally with its linked partner on the linked
    /// composition.
    pub fn remove_source(
        &mut self,
        composition: Uuid,
        source: Uuid,
        opts: RemoveOptions,
    ) -> Result<TimedObject> {
        if (opts.collapse_neighbours || opts.collapse_neighbours_on_linked_too)
            && !opts.remove_linked
        {
            return Err(MontageError::InvalidArgument(
                "cannot collapse neighbours without removing the linked object too".into(),
            ));
        }
        let idx = self.comp_index(composition)?;
        let linked_idx = if opts.remove_linked { self.linked_index(idx)? } else { None };
        let mut involved = vec![idx];
        involved.extend(linked_idx);
        self.with_rollback(&involved, |t| {
            let removed =
                t.compositions[idx].remove_source(source, opts.collapse_neighbours, &mut t.events)?;
            if let Some(li) = linked_idx {
                if let Some(partner) = removed.linked() {
                    if t.compositions[li].find_source(partner).is_some() {
                        t.compositions[li].remove_source(
                            partner,
                            opts.collapse_neighbours_on_linked_too,
                            &mut t.events,
                        )?;
                    }
                }
            }
            Ok(removed)
        })
    }

    /// Apply `offset` to every source start in `[start_pos, end_pos)` of a
    /// composition's top layer.
    pub fn shift_sources(
        &mut self,
        composition: Uuid,
        offset: RationalTime,
        start_pos: usize,
        end_pos: Option<usize>,
    ) -> Result<()> {
        let idx = self.comp_index(composition)?;
        self.compositions[idx].shift_sources(offset, start_pos, end_pos, &mut self.events)
    }

    /// Set a source's start and/or duration, propagating to its linked
    /// partner wherever it lives so both stay identical.
    pub fn set_source_start_duration(
        &mut self,
        composition: Uuid,
        source: Uuid,
        start: Option<RationalTime>,
        duration: Option<RationalTime>,
    ) -> Result<bool> {
        let idx = self.comp_index(composition)?;
        let partner = self.compositions[idx]
            .find_source(source)
            .ok_or_else(|| MontageError::NotFound(format!("source {source} not in composition")))?
            .linked();
        let partner_idx = partner.and_then(|p| self.locate_source(p));
        let mut involved = vec![idx];
        involved.extend(partner_idx);
        self.with_rollback(&involved, |t| {
            let changed =
                t.compositions[idx].set_start_duration(source, start, duration, &mut t.events)?;
            if changed {
                if let (Some(p), Some(pi)) = (partner, partner_idx) {
                    t.compositions[pi].set_start_duration(p, start, duration, &mut t.events)?;
                }
            }
            Ok(changed)
        })
    }

    /// Release everything a composition contains.
    pub fn clean_up(&mut self, composition: Uuid) -> Result<()> {
        let idx = self.comp_index(composition)?;
        self.compositions[idx].clean_up(&mut self.events)
    }

    // ── Linkage and brothers ────────────────────────────────────

    /// Resolve the brother of a source, constructing and attaching it to
    /// the linked composition on first call. With `autolink`, the linked
    /// relation is (re-)established to the brother. Returns the brother id.
    pub fn get_brother(&mut self, composition: Uuid, source: Uuid, autolink: bool) -> Result<Uuid> {
        let idx = self.comp_index(composition)?;
        let li = self.linked_index(idx)?.ok_or_else(|| {
            MontageError::InvalidArgument(
                "composition has no linked composition to host the brother".into(),
            )
        })?;
        let position = self.compositions[idx].get_source_layer_position(source) as i32;
        self.with_rollback(&[idx, li], |t| {
            let brother = t.ensure_brother(idx, li, source, position)?;
            if autolink {
                t.link_objects_internal(idx, source, li, brother)?;
            }
            Ok(brother)
        })
    }

    /// Establish a symmetric linked relation between two sources, unlinking
    /// any current partners first.
    pub fn link_sources(
        &mut self,
        composition_a: Uuid,
        a: Uuid,
        composition_b: Uuid,
        b: Uuid,
    ) -> Result<()> {
        if a == b {
            return Err(MontageError::InvalidArgument(
                "cannot link a source to itself".into(),
            ));
        }
        let ai = self.comp_index(composition_a)?;
        let bi = self.comp_index(composition_b)?;
        if self.compositions[ai].find_source(a).is_none() {
            return Err(MontageError::NotFound(format!("source {a} not in composition")));
        }
        if self.compositions[bi].find_source(b).is_none() {
            return Err(MontageError::NotFound(format!("source {b} not in composition")));
        }
        // old partners may live in yet other compositions
        let mut involved = vec![ai, bi];
        for obj in [a, b] {
            if let Some((_, o)) = self.find_source(obj) {
                if let Some(p) = o.linked() {
                    involved.extend(self.locate_source(p));
                }
            }
        }
        self.with_rollback(&involved, |t| t.link_objects_internal(ai, a, bi, b))
    }

    /// Remove a source's linked relation symmetrically. No-op when the
    /// source is not linked.
    pub fn unlink_source(&mut self, composition: Uuid, source: Uuid) -> Result<()> {
        let idx = self.comp_index(composition)?;
        if self.compositions[idx].find_source(source).is_none() {
            return Err(MontageError::NotFound(format!(
                "source {source} not in composition"
            )));
        }
        self.clear_link(idx, source)
    }

    /// Construct the brother on the linked composition if it is not already
    /// attached there. Returns its id.
    fn ensure_brother(
        &mut self,
        idx: usize,
        linked_idx: usize,
        source: Uuid,
        position: i32,
    ) -> Result<Uuid> {
        let existing = {
            let src = self.compositions[idx].find_source(source).ok_or_else(|| {
                MontageError::NotFound(format!("source {source} not in composition"))
            })?;
            src.brother()
        };
        if let Some(bid) = existing {
            if self.compositions[linked_idx].find_source(bid).is_some() {
                return Ok(bid);
            }
        }
        let brother = self.compositions[idx]
            .find_source_mut(source)
            .ok_or_else(|| MontageError::NotFound(format!("source {source} not in composition")))?
            .make_brother()?;
        let brother_id = brother.id;
        debug!(source = %source, brother = %brother_id, "constructed brother");
        // make_brother already wrote the field; record the pairing so a
        // replay reproduces it
        self.events.push(TimelineEvent::BrotherChanged {
            composition: self.compositions[idx].id,
            object: source,
            old_brother: existing,
            new_brother: Some(brother_id),
        });
        self.compositions[linked_idx].add_source(brother, position, &mut self.events)?;
        Ok(brother_id)
    }

    /// Mirror an add onto the linked composition using the source's
    /// brother. Skipped when the source has no factory to construct a
    /// brother from.
    fn mirror_add(&mut self, idx: usize, linked_idx: usize, source: Uuid, position: i32) -> Result<()> {
        let has_factory = self.compositions[idx]
            .find_source(source)
            .map(|o| o.factory.is_some())
            .unwrap_or(false);
        if !has_factory {
            debug!(source = %source, "source has no factory; mirrored add skipped");
            return Ok(());
        }
        let brother = self.ensure_brother(idx, linked_idx, source, position)?;
        self.link_objects_internal(idx, source, linked_idx, brother)
    }

    /// Symmetric link with partner cleanup. The caller holds the rollback
    /// snapshot.
    fn link_objects_internal(&mut self, ai: usize, a: Uuid, bi: usize, b: Uuid) -> Result<()> {
        let a_linked = self.compositions[ai]
            .find_source(a)
            .and_then(|o| o.linked());
        let b_linked = self.compositions[bi]
            .find_source(b)
            .and_then(|o| o.linked());
        if a_linked == Some(b) && b_linked == Some(a) {
            return Ok(());
        }
        self.clear_link(ai, a)?;
        self.clear_link(bi, b)?;
        self.compositions[ai].set_linked_raw(a, Some(b), &mut self.events)?;
        self.compositions[bi].set_linked_raw(b, Some(a), &mut self.events)?;
        Ok(())
    }

    /// Clear a source's linked relation on both ends.
    fn clear_link(&mut self, idx: usize, source: Uuid) -> Result<()> {
        let old = self.compositions[idx].set_linked_raw(source, None, &mut self.events)?;
        if let Some(partner) = old {
            if let Some(pi) = self.locate_source(partner) {
                self.compositions[pi].set_linked_raw(partner, None, &mut self.events)?;
            }
        }
        Ok(())
    }
}
