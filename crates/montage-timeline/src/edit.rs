//! Undoable edits.
//!
//! Uses the Command pattern: the composition core emits change events, and
//! the [`ActionLog`] synthesizes a reversible [`EditAction`] from each one
//! inside an explicit `begin(name)` … `commit()` transaction boundary.
//! Every action knows how to apply itself to a [`Timeline`] and produce its
//! inverse for undo. The editing operations themselves never write undo
//! records; this module is the subscriber side of the contract.

use montage_core::{MontageError, RationalTime, Result};
use tracing::debug;
use uuid::Uuid;

use crate::event::{EffectSlot, TimelineEvent};
use crate::object::TimedObject;
use crate::timeline::Timeline;

/// A reversible edit on the timeline.
#[derive(Debug, Clone)]
pub enum EditAction {
    /// A source was inserted into a composition layer.
    AddSource {
        composition: Uuid,
        layer: usize,
        source: TimedObject,
    },
    /// A source was removed from a composition layer.
    RemoveSource {
        composition: Uuid,
        layer: usize,
        source: TimedObject,
    },
    /// A source's start/duration changed.
    SetStartDuration {
        composition: Uuid,
        object: Uuid,
        old_start: RationalTime,
        old_duration: RationalTime,
        new_start: RationalTime,
        new_duration: RationalTime,
    },
    /// One side of a linked relation changed.
    SetLinked {
        composition: Uuid,
        object: Uuid,
        old_linked: Option<Uuid>,
        new_linked: Option<Uuid>,
    },
    /// A brother pairing was established or cleared.
    SetBrother {
        composition: Uuid,
        object: Uuid,
        old_brother: Option<Uuid>,
        new_brother: Option<Uuid>,
    },
    AddTransition {
        composition: Uuid,
        transition: TimedObject,
    },
    RemoveTransition {
        composition: Uuid,
        transition: TimedObject,
    },
    AddEffect {
        composition: Uuid,
        slot: EffectSlot,
        effect: TimedObject,
    },
    RemoveEffect {
        composition: Uuid,
        slot: EffectSlot,
        effect: TimedObject,
    },
}

impl EditAction {
    /// Build the action a change event describes. Derived notifications
    /// (the condensed list) carry no independent state and map to nothing.
    pub fn from_event(event: &TimelineEvent) -> Option<Self> {
        match event {
            TimelineEvent::SourceAdded {
                composition,
                layer,
                source,
            } => Some(Self::AddSource {
                composition: *composition,
                layer: *layer,
                source: source.clone(),
            }),
            TimelineEvent::SourceRemoved {
                composition,
                layer,
                source,
                ..
            } => Some(Self::RemoveSource {
                composition: *composition,
                layer: *layer,
                source: source.clone(),
            }),
            TimelineEvent::StartDurationChanged {
                composition,
                object,
                old_start,
                old_duration,
                new_start,
                new_duration,
            } => Some(Self::SetStartDuration {
                composition: *composition,
                object: *object,
                old_start: *old_start,
                old_duration: *old_duration,
                new_start: *new_start,
                new_duration: *new_duration,
            }),
            TimelineEvent::LinkedChanged {
                composition,
                object,
                old_linked,
                new_linked,
            } => Some(Self::SetLinked {
                composition: *composition,
                object: *object,
                old_linked: *old_linked,
                new_linked: *new_linked,
            }),
            TimelineEvent::BrotherChanged {
                composition,
                object,
                old_brother,
                new_brother,
            } => Some(Self::SetBrother {
                composition: *composition,
                object: *object,
                old_brother: *old_brother,
                new_brother: *new_brother,
            }),
            TimelineEvent::CondensedListChanged { .. } => None,
            TimelineEvent::TransitionAdded {
                composition,
                transition,
            } => Some(Self::AddTransition {
                composition: *composition,
                transition: transition.clone(),
            }),
            TimelineEvent::TransitionRemoved {
                composition,
                transition,
            } => Some(Self::RemoveTransition {
                composition: *composition,
                transition: transition.clone(),
            }),
            TimelineEvent::EffectAdded {
                composition,
                slot,
                effect,
            } => Some(Self::AddEffect {
                composition: *composition,
                slot: *slot,
                effect: effect.clone(),
            }),
            TimelineEvent::EffectRemoved {
                composition,
                slot,
                effect,
            } => Some(Self::RemoveEffect {
                composition: *composition,
                slot: *slot,
                effect: effect.clone(),
            }),
        }
    }

    /// Apply this action to a timeline.
    ///
    /// Replays address the single composition the action was recorded
    /// against and never mirror; mirrored halves were recorded as their own
    /// actions.
    pub fn apply(&self, timeline: &mut Timeline) -> Result<()> {
        match self {
            Self::AddSource {
                composition,
                layer,
                source,
            } => {
                let (comp, events) = timeline.composition_and_events_mut(*composition)?;
                comp.add_source(source.clone(), *layer as i32 + 1, events)?;
                Ok(())
            }
            Self::RemoveSource {
                composition,
                source,
                ..
            } => {
                let (comp, events) = timeline.composition_and_events_mut(*composition)?;
                comp.remove_source(source.id, false, events)?;
                Ok(())
            }
            Self::SetStartDuration {
                composition,
                object,
                new_start,
                new_duration,
                ..
            } => {
                let (comp, events) = timeline.composition_and_events_mut(*composition)?;
                comp.set_start_duration(*object, Some(*new_start), Some(*new_duration), events)?;
                Ok(())
            }
            Self::SetLinked {
                composition,
                object,
                new_linked,
                ..
            } => {
                let (comp, events) = timeline.composition_and_events_mut(*composition)?;
                comp.set_linked_raw(*object, *new_linked, events)?;
                Ok(())
            }
            Self::SetBrother {
                composition,
                object,
                new_brother,
                ..
            } => {
                let (comp, events) = timeline.composition_and_events_mut(*composition)?;
                comp.set_brother_raw(*object, *new_brother, events)?;
                Ok(())
            }
            Self::AddTransition {
                composition,
                transition,
            } => {
                let (comp, events) = timeline.composition_and_events_mut(*composition)?;
                comp.add_transition(transition.clone(), events)?;
                Ok(())
            }
            Self::RemoveTransition {
                composition,
                transition,
            } => {
                let (comp, events) = timeline.composition_and_events_mut(*composition)?;
                comp.remove_transition(transition.id, events)?;
                Ok(())
            }
            Self::AddEffect {
                composition,
                slot,
                effect,
            } => {
                let (comp, events) = timeline.composition_and_events_mut(*composition)?;
                comp.add_effect(*slot, effect.clone(), events)?;
                Ok(())
            }
            Self::RemoveEffect {
                composition,
                effect,
                ..
            } => {
                let (comp, events) = timeline.composition_and_events_mut(*composition)?;
                comp.remove_effect(effect.id, events)?;
                Ok(())
            }
        }
    }

    /// Produce the inverse action (for undo).
    pub fn inverse(&self) -> Self {
        match self {
            Self::AddSource {
                composition,
                layer,
                source,
            } => Self::RemoveSource {
                composition: *composition,
                layer: *layer,
                source: source.clone(),
            },
            Self::RemoveSource {
                composition,
                layer,
                source,
            } => Self::AddSource {
                composition: *composition,
                layer: *layer,
                source: source.clone(),
            },
            Self::SetStartDuration {
                composition,
                object,
                old_start,
                old_duration,
                new_start,
                new_duration,
            } => Self::SetStartDuration {
                composition: *composition,
                object: *object,
                old_start: *new_start,
                old_duration: *new_duration,
                new_start: *old_start,
                new_duration: *old_duration,
            },
            Self::SetLinked {
                composition,
                object,
                old_linked,
                new_linked,
            } => Self::SetLinked {
                composition: *composition,
                object: *object,
                old_linked: *new_linked,
                new_linked: *old_linked,
            },
            Self::SetBrother {
                composition,
                object,
                old_brother,
                new_brother,
            } => Self::SetBrother {
                composition: *composition,
                object: *object,
                old_brother: *new_brother,
                new_brother: *old_brother,
            },
            Self::AddTransition {
                composition,
                transition,
            } => Self::RemoveTransition {
                composition: *composition,
                transition: transition.clone(),
            },
            Self::RemoveTransition {
                composition,
                transition,
            } => Self::AddTransition {
                composition: *composition,
                transition: transition.clone(),
            },
            Self::AddEffect {
                composition,
                slot,
                effect,
            } => Self::RemoveEffect {
                composition: *composition,
                slot: *slot,
                effect: effect.clone(),
            },
            Self::RemoveEffect {
                composition,
                slot,
                effect,
            } => Self::AddEffect {
                composition: *composition,
                slot: *slot,
                effect: effect.clone(),
            },
        }
    }
}

/// A named group of actions applied (and undone) as one unit.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// User-visible name ("Move clip", "Delete clip", …).
    pub name: String,
    actions: Vec<EditAction>,
}

impl Transaction {
    /// The recorded actions, oldest first.
    pub fn actions(&self) -> &[EditAction] {
        &self.actions
    }
}

/// Transactional undo/redo log fed by the change-event stream.
#[derive(Debug)]
pub struct ActionLog {
    current: Option<Transaction>,
    undo: Vec<Transaction>,
    redo: Vec<Transaction>,
    max_depth: usize,
}

impl ActionLog {
    /// Create a new log with the given maximum history depth.
    pub fn new(max_depth: usize) -> Self {
        Self {
            current: None,
            undo: Vec::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    /// Open a transaction. Events observed from now on are recorded into it.
    pub fn begin(&mut self, name: impl Into<String>) -> Result<()> {
        if self.current.is_some() {
            return Err(MontageError::InvalidArgument(
                "a transaction is already open".into(),
            ));
        }
        self.current = Some(Transaction {
            name: name.into(),
            actions: Vec::new(),
        });
        Ok(())
    }

    /// Check whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.current.is_some()
    }

    /// Record one change event into the open transaction. Events observed
    /// outside a transaction are not undoable and are dropped.
    pub fn record(&mut self, event: &TimelineEvent) {
        if let Some(tx) = &mut self.current {
            if let Some(action) = EditAction::from_event(event) {
                tx.actions.push(action);
            }
        }
    }

    /// Record a drained event batch.
    pub fn observe(&mut self, events: &[TimelineEvent]) {
        for event in events {
            self.record(event);
        }
    }

    /// Close the open transaction and make it undoable. An empty
    /// transaction is discarded. Opening a new transaction after this one
    /// invalidates any redo history.
    pub fn commit(&mut self) -> Result<()> {
        let tx = self.current.take().ok_or_else(|| {
            MontageError::InvalidArgument("no open transaction to commit".into())
        })?;
        if tx.actions.is_empty() {
            return Ok(());
        }
        debug!(transaction = %tx.name, actions = tx.actions.len(), "committed transaction");
        self.redo.clear();
        self.undo.push(tx);
        if self.undo.len() > self.max_depth {
            self.undo.remove(0);
        }
        Ok(())
    }

    /// Abort the open transaction, reverting its recorded actions.
    ///
    /// Replay events queued during the revert are drained and dropped; they
    /// describe no new user edit.
    pub fn rollback(&mut self, timeline: &mut Timeline) -> Result<()> {
        let tx = self.current.take().ok_or_else(|| {
            MontageError::InvalidArgument("no open transaction to roll back".into())
        })?;
        for action in tx.actions.iter().rev() {
            action.inverse().apply(timeline)?;
        }
        timeline.drain_events();
        Ok(())
    }

    /// Undo the most recent transaction. Returns its name.
    pub fn undo(&mut self, timeline: &mut Timeline) -> Result<String> {
        let tx = self
            .undo
            .pop()
            .ok_or_else(|| MontageError::NotFound("nothing to undo".into()))?;
        for action in tx.actions.iter().rev() {
            action.inverse().apply(timeline)?;
        }
        timeline.drain_events();
        let name = tx.name.clone();
        debug!(transaction = %name, "undone");
        self.redo.push(tx);
        Ok(name)
    }

    /// Redo the most recently undone transaction. Returns its name.
    pub fn redo(&mut self, timeline: &mut Timeline) -> Result<String> {
        let tx = self
            .redo
            .pop()
            .ok_or_else(|| MontageError::NotFound("nothing to redo".into()))?;
        for action in tx.actions.iter() {
            action.apply(timeline)?;
        }
        timeline.drain_events();
        let name = tx.name.clone();
        debug!(transaction = %name, "redone");
        self.undo.push(tx);
        Ok(name)
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Number of undoable transactions.
    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    /// Number of redoable transactions.
    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.current = None;
        self.undo.clear();
        self.redo.clear();
    }
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(200)
    }
}

// ── Tests ───────────────────────────────────────────────────────
