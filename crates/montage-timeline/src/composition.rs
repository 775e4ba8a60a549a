//! Compositions: one timeline track's sources, effects, and transitions.
//!
//! A composition owns prioritized source layers plus effect and transition
//! lists, and keeps a cached "condensed" top-level view: the flattened,
//! start-ordered merge of all source layers and transitions. The cache is
//! recomputed after every structural mutation and the change notification
//! fires only when the merged list actually differs, so bulk edits do not
//! trigger refresh storms.
//!
//! Cross-composition concerns (mirrored edits, linkage propagation) live in
//! [`crate::timeline`]; the methods here are the single-composition halves
//! and never recurse into a sibling.

use montage_core::{MontageError, RationalTime, Result};
use smallvec::{smallvec, SmallVec};
use tracing::debug;
use uuid::Uuid;

use crate::event::{EffectSlot, TimelineEvent};
use crate::layer::SourceLayer;
use crate::object::{MediaKind, TimedObject};

/// One element of the condensed top-level view.
///
/// Compared element-wise (id and start, not deep content) against the cache
/// to decide whether the condensed-list-changed notification fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CondensedEntry {
    pub id: Uuid,
    pub start: RationalTime,
}

/// A composition: the container for one logical track.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    /// Unique composition ID
    pub id: Uuid,
    /// Composition name
    pub name: String,
    /// Media kind of this track
    pub media_kind: MediaKind,
    /// Source layers, topmost first. There is always at least one.
    pub(crate) layers: SmallVec<[SourceLayer; 1]>,
    global_effects: Vec<TimedObject>,
    /// Per-priority-layer simple effect lists.
    simple_effects: Vec<Vec<TimedObject>>,
    complex_effects: Vec<TimedObject>,
    /// Transitions, kept start-ordered like a layer.
    transitions: Vec<TimedObject>,
    /// Source used to fill gaps during playback.
    default_source: Option<TimedObject>,
    condensed: Vec<CondensedEntry>,
    /// Sibling composition whose edits mirror onto this one, and vice versa.
    pub(crate) linked_composition: Option<Uuid>,
}

impl Composition {
    /// Create a new composition with one default full-band source layer.
    pub fn new(name: impl Into<String>, media_kind: MediaKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            media_kind,
            layers: smallvec![SourceLayer::default_band()],
            global_effects: Vec::new(),
            simple_effects: Vec::new(),
            complex_effects: Vec::new(),
            transitions: Vec::new(),
            default_source: None,
            condensed: Vec::new(),
            linked_composition: None,
        }
    }

    // ── Structure access ────────────────────────────────────────

    /// Source layers, topmost first.
    pub fn layers(&self) -> &[SourceLayer] {
        &self.layers
    }

    /// Layer at the given index.
    pub fn layer(&self, index: usize) -> Option<&SourceLayer> {
        self.layers.get(index)
    }

    /// Add a source layer spanning the given priority band. Returns its
    /// index.
    pub fn add_layer(&mut self, min_priority: u32, max_priority: u32) -> usize {
        self.layers.push(SourceLayer::new(min_priority, max_priority));
        self.layers.len() - 1
    }

    /// Transitions, in start order.
    pub fn transitions(&self) -> &[TimedObject] {
        &self.transitions
    }

    pub fn global_effects(&self) -> &[TimedObject] {
        &self.global_effects
    }

    pub fn simple_effects(&self) -> &[Vec<TimedObject>] {
        &self.simple_effects
    }

    pub fn complex_effects(&self) -> &[TimedObject] {
        &self.complex_effects
    }

    /// The gap-filling default source, if any.
    pub fn default_source(&self) -> Option<&TimedObject> {
        self.default_source.as_ref()
    }

    pub fn set_default_source(&mut self, source: Option<TimedObject>) {
        self.default_source = source;
    }

    /// Sibling composition this one mirrors edits with, if any.
    pub fn linked_composition(&self) -> Option<Uuid> {
        self.linked_composition
    }

    /// Find a source by id across all layers.
    pub fn find_source(&self, id: Uuid) -> Option<&TimedObject> {
        self.layers.iter().find_map(|l| l.find(id))
    }

    /// Every timed object this composition holds: layer sources, effects,
    /// transitions, and the default source.
    pub(crate) fn all_objects(&self) -> impl Iterator<Item = &TimedObject> {
        self.layers
            .iter()
            .flat_map(|l| l.objects().iter())
            .chain(self.global_effects.iter())
            .chain(self.simple_effects.iter().flatten())
            .chain(self.complex_effects.iter())
            .chain(self.transitions.iter())
            .chain(self.default_source.iter())
    }

    /// Find any timed object (source, effect, transition, default source)
    /// mutably by id.
    pub(crate) fn find_object_mut(&mut self, id: Uuid) -> Option<&mut TimedObject> {
        if self.layers.iter().any(|l| l.contains(id)) {
            return self.layers.iter_mut().find_map(|l| l.find_mut(id));
        }
        self.global_effects
            .iter_mut()
            .chain(self.simple_effects.iter_mut().flatten())
            .chain(self.complex_effects.iter_mut())
            .chain(self.transitions.iter_mut())
            .chain(self.default_source.iter_mut())
            .find(|o| o.id == id)
    }

    pub(crate) fn find_source_mut(&mut self, id: Uuid) -> Option<&mut TimedObject> {
        self.layers.iter_mut().find_map(|l| l.find_mut(id))
    }

    /// (layer index, index within layer) of a source.
    pub(crate) fn source_location(&self, id: Uuid) -> Option<(usize, usize)> {
        self.layers
            .iter()
            .enumerate()
            .find_map(|(li, l)| l.index_of(id).map(|oi| (li, oi)))
    }

    /// 1-based layer position of a source, 0 when absent.
    pub fn get_source_layer_position(&self, id: Uuid) -> u32 {
        self.layers
            .iter()
            .position(|l| l.contains(id))
            .map(|i| i as u32 + 1)
            .unwrap_or(0)
    }

    /// 1-based index of a source within its layer, 0 when absent.
    pub fn get_simple_source_position(&self, id: Uuid) -> u32 {
        self.layers
            .iter()
            .find_map(|l| l.position_of(id))
            .map(|p| p as u32)
            .unwrap_or(0)
    }

    /// Resolve the layer selected by a positional argument: `0` = above all,
    /// `n` = 1-based layer position n, `-1` (or any lower value) = bottom.
    pub(crate) fn resolve_layer(&self, position: i32) -> usize {
        let last = self.layers.len() - 1;
        match position {
            p if p < 0 => last,
            0 => 0,
            p => ((p as usize) - 1).min(last),
        }
    }

    // ── Condensed view ──────────────────────────────────────────

    /// The cached condensed top-level view.
    pub fn condensed(&self) -> &[CondensedEntry] {
        &self.condensed
    }

    /// Deterministic merge-by-start of all source layers plus transitions.
    ///
    /// Stable, so equal starts keep layer-then-transition order.
    pub fn compute_condensed(&self) -> Vec<CondensedEntry> {
        let mut entries: Vec<CondensedEntry> = self
            .layers
            .iter()
            .flat_map(|l| l.objects().iter())
            .chain(self.transitions.iter())
            .map(|o| CondensedEntry {
                id: o.id,
                start: o.start(),
            })
            .collect();
        entries.sort_by_key(|e| e.start);
        entries
    }

    /// Recompute the condensed cache; fires the change notification only
    /// when the merged list differs element-wise from the cached one.
    pub(crate) fn update_condensed_list(&mut self, events: &mut Vec<TimelineEvent>) -> bool {
        let fresh = self.compute_condensed();
        if fresh == self.condensed {
            return false;
        }
        self.condensed = fresh;
        events.push(TimelineEvent::CondensedListChanged {
            composition: self.id,
            list: self.condensed.clone(),
        });
        true
    }

    /// Rebuild the condensed cache without notifications (deserialization).
    pub(crate) fn refresh_condensed(&mut self) {
        self.condensed = self.compute_condensed();
    }

    // ── Source editing ──────────────────────────────────────────

    /// Insert a source into the layer selected by `position`.
    ///
    /// The source must carry a positive duration and non-negative start.
    pub(crate) fn add_source(
        &mut self,
        source: TimedObject,
        position: i32,
        events: &mut Vec<TimelineEvent>,
    ) -> Result<Uuid> {
        source.validate_for_attach()?;
        if self.find_source(source.id).is_some() {
            return Err(MontageError::InvalidArgument(format!(
                "source {} is already present in composition {}",
                source.name, self.name
            )));
        }
        let layer_idx = self.resolve_layer(position);
        let id = source.id;
        debug!(
            composition = %self.name,
            source = %source.name,
            start = %source.start(),
            duration = %source.duration(),
            "adding source"
        );
        let recorded = source.clone();
        self.layers[layer_idx].insert_sorted(source);
        self.update_condensed_list(events);
        events.push(TimelineEvent::SourceAdded {
            composition: self.id,
            layer: layer_idx,
            source: recorded,
        });
        Ok(id)
    }

    /// Remove a source from its layer, optionally closing the gap it leaves
    /// by shifting every following object backward by its duration.
    pub(crate) fn remove_source(
        &mut self,
        id: Uuid,
        collapse_neighbours: bool,
        events: &mut Vec<TimelineEvent>,
    ) -> Result<TimedObject> {
        let (layer_idx, index) = self
            .source_location(id)
            .ok_or_else(|| MontageError::NotFound(format!("source {id} not in composition")))?;
        let layer = &mut self.layers[layer_idx];
        let followers: Vec<(Uuid, RationalTime, RationalTime)> = layer.objects()[index + 1..]
            .iter()
            .map(|o| (o.id, o.start(), o.duration()))
            .collect();
        let removed = layer.remove_at(index);
        debug!(
            composition = %self.name,
            source = %removed.name,
            collapse = collapse_neighbours,
            "removing source"
        );
        if collapse_neighbours {
            if let Err(e) = layer.shift_range(-removed.duration(), index, None) {
                // restore the exact pre-call state before surfacing the error
                layer.insert_at(index, removed);
                return Err(e);
            }
            for (oid, old_start, duration) in followers {
                events.push(TimelineEvent::StartDurationChanged {
                    composition: self.id,
                    object: oid,
                    old_start,
                    old_duration: duration,
                    new_start: old_start - removed.duration(),
                    new_duration: duration,
                });
            }
        }
        self.update_condensed_list(events);
        events.push(TimelineEvent::SourceRemoved {
            composition: self.id,
            layer: layer_idx,
            index,
            source: removed.clone(),
        });
        Ok(removed)
    }

    /// Apply `offset` to every source start in `[start_pos, end_pos)` of the
    /// top source layer. `end_pos` defaults to the layer length.
    pub(crate) fn shift_sources(
        &mut self,
        offset: RationalTime,
        start_pos: usize,
        end_pos: Option<usize>,
        events: &mut Vec<TimelineEvent>,
    ) -> Result<()> {
        if let Some(end) = end_pos {
            if start_pos > end {
                return Err(MontageError::InvalidRange(format!(
                    "shift range {start_pos}..{end} is inverted"
                )));
            }
        }
        let layer = &mut self.layers[0];
        let end = end_pos.unwrap_or(layer.len()).min(layer.len());
        let affected: Vec<(Uuid, RationalTime, RationalTime)> = layer.objects()
            [start_pos.min(end)..end]
            .iter()
            .map(|o| (o.id, o.start(), o.duration()))
            .collect();
        layer.shift_range(offset, start_pos, Some(end))?;
        for (oid, old_start, duration) in affected {
            events.push(TimelineEvent::StartDurationChanged {
                composition: self.id,
                object: oid,
                old_start,
                old_duration: duration,
                new_start: old_start + offset,
                new_duration: duration,
            });
        }
        self.update_condensed_list(events);
        Ok(())
    }

    /// Move a source to a new (UI-driven) position within its layer.
    ///
    /// `new_position` counts positions in the pre-move list: `-1` or any
    /// value past the end moves to the end, values below `-1` move to the
    /// front. With `collapse_neighbours` the vacated gap is closed; with
    /// `push_neighbours` objects at the insertion point are cascaded forward
    /// until the moved source fits without introducing new overlap.
    ///
    /// The multi-step relocation runs against a snapshot: any failing step
    /// restores the layer exactly as it was.
    pub(crate) fn move_source(
        &mut self,
        id: Uuid,
        new_position: i32,
        push_neighbours: bool,
        collapse_neighbours: bool,
        events: &mut Vec<TimelineEvent>,
    ) -> Result<()> {
        let (layer_idx, old_index) = self
            .source_location(id)
            .ok_or_else(|| MontageError::NotFound(format!("source {id} not in composition")))?;
        let len = self.layers[layer_idx].len();
        let new_pos: usize = if new_position == -1 || new_position > len as i32 {
            len
        } else if new_position < -1 {
            0
        } else {
            new_position as usize
        };
        // `new_position` counts slots of the pre-move list, so once the
        // removal is adjusted for, old_index and old_index + 1 are the same
        // place (the latter covers "already last" moved to the end)
        if new_pos == old_index || new_pos == old_index + 1 {
            return Ok(());
        }
        debug!(
            composition = %self.name,
            source = %id,
            from = old_index,
            to = new_pos,
            "moving source"
        );

        let snapshot = self.layers[layer_idx].clone();
        let before: Vec<(Uuid, RationalTime, RationalTime)> = snapshot
            .objects()
            .iter()
            .map(|o| (o.id, o.start(), o.duration()))
            .collect();

        if let Err(e) = Self::relocate(
            &mut self.layers[layer_idx],
            old_index,
            new_pos,
            push_neighbours,
            collapse_neighbours,
        ) {
            self.layers[layer_idx] = snapshot;
            return Err(e);
        }

        for (oid, old_start, duration) in before {
            let new_start = self.layers[layer_idx]
                .find(oid)
                .map(|o| o.start())
                .unwrap_or(old_start);
            if new_start != old_start {
                events.push(TimelineEvent::StartDurationChanged {
                    composition: self.id,
                    object: oid,
                    old_start,
                    old_duration: duration,
                    new_start,
                    new_duration: duration,
                });
            }
        }
        self.update_condensed_list(events);
        Ok(())
    }

    /// The sequential relocation protocol of `move_source`. Operates on raw
    /// indexes of the pre-move list; the caller holds the rollback snapshot.
    fn relocate(
        layer: &mut SourceLayer,
        old_index: usize,
        new_pos: usize,
        push_neighbours: bool,
        collapse_neighbours: bool,
    ) -> Result<()> {
        let len = layer.len();
        let moving = layer.get(old_index).expect("old_index is in range");
        let moving_duration = moving.duration();
        let saved_priority = moving.priority();

        // park the moving object at the band's lowest visual priority so it
        // does not interfere with the shift computations
        let park = layer.max_priority;
        layer.get_mut(old_index).expect("in range").priority = park;

        // close the gap the source leaves behind
        if collapse_neighbours && old_index < len - 1 {
            layer.shift_range_raw(-moving_duration, old_index + 1, Some(len))?;
        }

        // cascade-push occupants of the insertion point forward until the
        // moved source fits; never past the old position, those objects are
        // passed over by the removal itself
        if push_neighbours && new_pos < len {
            let mut pushmin = moving_duration
                + if new_pos > 0 {
                    layer.get(new_pos - 1).expect("in range").end()
                } else {
                    RationalTime::ZERO
                };
            for i in new_pos..old_index {
                let occupant_start = layer.get(i).expect("in range").start();
                if occupant_start >= pushmin {
                    break;
                }
                layer.shift_one(i, pushmin - occupant_start)?;
                pushmin = layer.get(i).expect("in range").end();
            }
        }

        // place the source after its (possibly just-shifted) predecessor
        let new_start = if new_pos == 0 {
            RationalTime::ZERO
        } else {
            layer.get(new_pos - 1).expect("in range").end()
        };
        layer.get_mut(old_index).expect("in range").start = new_start;

        // relocate in the list; the position is UI-driven, not time-driven,
        // so this bypasses sorted insertion deliberately
        let obj = layer.remove_at(old_index);
        let insert_at = if old_index < new_pos { new_pos - 1 } else { new_pos };
        layer.insert_at(insert_at, obj);

        layer.get_mut(insert_at).expect("just inserted").priority = saved_priority;
        Ok(())
    }

    /// Set a source's start and/or duration. Negative starts clamp to zero;
    /// a non-positive duration is rejected. Returns `false` (emitting
    /// nothing) when the requested values equal the current ones.
    pub(crate) fn set_start_duration(
        &mut self,
        id: Uuid,
        start: Option<RationalTime>,
        duration: Option<RationalTime>,
        events: &mut Vec<TimelineEvent>,
    ) -> Result<bool> {
        let (layer_idx, index) = self
            .source_location(id)
            .ok_or_else(|| MontageError::NotFound(format!("source {id} not in composition")))?;
        let obj = self.layers[layer_idx].get(index).expect("located above");
        let old_start = obj.start();
        let old_duration = obj.duration();
        let new_start = match start {
            Some(s) if s.is_negative() => RationalTime::ZERO,
            Some(s) => s,
            None => old_start,
        };
        let new_duration = duration.unwrap_or(old_duration);
        if !new_duration.is_positive() {
            return Err(MontageError::InvalidDuration(format!(
                "duration {new_duration} is not positive"
            )));
        }
        if new_start == old_start && new_duration == old_duration {
            return Ok(false);
        }
        {
            let obj = self.layers[layer_idx].get_mut(index).expect("located above");
            obj.start = new_start;
            obj.duration = new_duration;
        }
        self.layers[layer_idx].resort();
        events.push(TimelineEvent::StartDurationChanged {
            composition: self.id,
            object: id,
            old_start,
            old_duration,
            new_start,
            new_duration,
        });
        self.update_condensed_list(events);
        Ok(true)
    }

    /// Update a source's linked reference. Returns the previous value.
    pub(crate) fn set_linked_raw(
        &mut self,
        id: Uuid,
        linked: Option<Uuid>,
        events: &mut Vec<TimelineEvent>,
    ) -> Result<Option<Uuid>> {
        let comp_id = self.id;
        let obj = self
            .find_source_mut(id)
            .ok_or_else(|| MontageError::NotFound(format!("source {id} not in composition")))?;
        let old = obj.linked;
        if old == linked {
            return Ok(old);
        }
        obj.linked = linked;
        events.push(TimelineEvent::LinkedChanged {
            composition: comp_id,
            object: id,
            old_linked: old,
            new_linked: linked,
        });
        Ok(old)
    }

    /// Update a source's brother reference.
    pub(crate) fn set_brother_raw(
        &mut self,
        id: Uuid,
        brother: Option<Uuid>,
        events: &mut Vec<TimelineEvent>,
    ) -> Result<()> {
        let comp_id = self.id;
        let obj = self
            .find_source_mut(id)
            .ok_or_else(|| MontageError::NotFound(format!("source {id} not in composition")))?;
        let old = obj.brother;
        if old == brother {
            return Ok(());
        }
        obj.brother = brother;
        events.push(TimelineEvent::BrotherChanged {
            composition: comp_id,
            object: id,
            old_brother: old,
            new_brother: brother,
        });
        Ok(())
    }

    // ── Transitions and effects ─────────────────────────────────

    /// Add a transition, kept in start order with the sources it bridges.
    pub(crate) fn add_transition(
        &mut self,
        transition: TimedObject,
        events: &mut Vec<TimelineEvent>,
    ) -> Result<Uuid> {
        transition.validate_for_attach()?;
        let id = transition.id;
        let recorded = transition.clone();
        let index = self
            .transitions
            .partition_point(|t| t.start() <= transition.start());
        self.transitions.insert(index, transition);
        self.update_condensed_list(events);
        events.push(TimelineEvent::TransitionAdded {
            composition: self.id,
            transition: recorded,
        });
        Ok(id)
    }

    /// Remove a transition by id.
    pub(crate) fn remove_transition(
        &mut self,
        id: Uuid,
        events: &mut Vec<TimelineEvent>,
    ) -> Result<TimedObject> {
        let index = self
            .transitions
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| MontageError::NotFound(format!("transition {id} not in composition")))?;
        let removed = self.transitions.remove(index);
        self.update_condensed_list(events);
        events.push(TimelineEvent::TransitionRemoved {
            composition: self.id,
            transition: removed.clone(),
        });
        Ok(removed)
    }

    /// Add an effect to the given slot. Simple-effect layers grow on demand.
    pub(crate) fn add_effect(
        &mut self,
        slot: EffectSlot,
        effect: TimedObject,
        events: &mut Vec<TimelineEvent>,
    ) -> Result<Uuid> {
        let id = effect.id;
        let recorded = effect.clone();
        match slot {
            EffectSlot::Global => self.global_effects.push(effect),
            EffectSlot::Simple(layer) => {
                if self.simple_effects.len() <= layer {
                    self.simple_effects.resize_with(layer + 1, Vec::new);
                }
                self.simple_effects[layer].push(effect);
            }
            EffectSlot::Complex => self.complex_effects.push(effect),
        }
        events.push(TimelineEvent::EffectAdded {
            composition: self.id,
            slot,
            effect: recorded,
        });
        Ok(id)
    }

    /// Remove an effect by id from whichever slot holds it.
    pub(crate) fn remove_effect(
        &mut self,
        id: Uuid,
        events: &mut Vec<TimelineEvent>,
    ) -> Result<(EffectSlot, TimedObject)> {
        let found = if let Some(i) = self.global_effects.iter().position(|e| e.id == id) {
            Some((EffectSlot::Global, self.global_effects.remove(i)))
        } else if let Some((li, i)) = self
            .simple_effects
            .iter()
            .enumerate()
            .find_map(|(li, l)| l.iter().position(|e| e.id == id).map(|i| (li, i)))
        {
            Some((EffectSlot::Simple(li), self.simple_effects[li].remove(i)))
        } else {
            self.complex_effects
                .iter()
                .position(|e| e.id == id)
                .map(|i| (EffectSlot::Complex, self.complex_effects.remove(i)))
        };
        let (slot, effect) = found
            .ok_or_else(|| MontageError::NotFound(format!("effect {id} not in composition")))?;
        events.push(TimelineEvent::EffectRemoved {
            composition: self.id,
            slot,
            effect: effect.clone(),
        });
        Ok((slot, effect))
    }

    /// Release everything this composition contains, through the normal
    /// removal paths so every subscriber sees the full cascade. Used when
    /// the owning track is discarded.
    pub(crate) fn clean_up(&mut self, events: &mut Vec<TimelineEvent>) -> Result<()> {
        debug!(composition = %self.name, "cleaning up composition");
        let effect_ids: Vec<Uuid> = self
            .global_effects
            .iter()
            .chain(self.simple_effects.iter().flatten())
            .chain(self.complex_effects.iter())
            .map(|e| e.id)
            .collect();
        for id in effect_ids {
            self.remove_effect(id, events)?;
        }
        let transition_ids: Vec<Uuid> = self.transitions.iter().map(|t| t.id).collect();
        for id in transition_ids {
            self.remove_transition(id, events)?;
        }
        let source_ids: Vec<Uuid> = self
            .layers
            .iter()
            .flat_map(|l| l.objects().iter())
            .map(|o| o.id)
            .collect();
        for id in source_ids {
            self.remove_source(id, false, events)?;
        }
        self.default_source = None;
        Ok(())
    }
}
