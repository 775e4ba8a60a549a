//! Change notifications emitted by editing operations.
//!
//! Every state-changing operation queues events at the end of the call,
//! after all invariants are restored. Each event carries enough old/new data
//! for a subscriber to build a symmetric do/undo pair; the action log in
//! [`crate::edit`] is one such subscriber, a UI layer would be another.

use montage_core::RationalTime;
use uuid::Uuid;

use crate::composition::CondensedEntry;
use crate::object::TimedObject;

/// Which effect list of a composition an effect lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectSlot {
    Global,
    /// Per-priority-layer simple effect list, by layer index.
    Simple(usize),
    Complex,
}

/// A change notification from the composition core.
#[derive(Debug, Clone)]
pub enum TimelineEvent {
    /// A source was inserted into a composition layer.
    SourceAdded {
        composition: Uuid,
        layer: usize,
        source: TimedObject,
    },
    /// A source was removed from a composition layer.
    SourceRemoved {
        composition: Uuid,
        layer: usize,
        /// Index the source occupied before removal.
        index: usize,
        source: TimedObject,
    },
    /// A source's start and/or duration changed.
    StartDurationChanged {
        composition: Uuid,
        object: Uuid,
        old_start: RationalTime,
        old_duration: RationalTime,
        new_start: RationalTime,
        new_duration: RationalTime,
    },
    /// A source's linked partner changed.
    LinkedChanged {
        composition: Uuid,
        object: Uuid,
        old_linked: Option<Uuid>,
        new_linked: Option<Uuid>,
    },
    /// A source's brother pairing was established or cleared.
    BrotherChanged {
        composition: Uuid,
        object: Uuid,
        old_brother: Option<Uuid>,
        new_brother: Option<Uuid>,
    },
    /// The flattened top-level view differs from its previous cached value.
    CondensedListChanged {
        composition: Uuid,
        list: Vec<CondensedEntry>,
    },
    /// A transition was added to a composition.
    TransitionAdded {
        composition: Uuid,
        transition: TimedObject,
    },
    /// A transition was removed from a composition.
    TransitionRemoved {
        composition: Uuid,
        transition: TimedObject,
    },
    /// An effect was added to one of a composition's effect lists.
    EffectAdded {
        composition: Uuid,
        slot: EffectSlot,
        effect: TimedObject,
    },
    /// An effect was removed from one of a composition's effect lists.
    EffectRemoved {
        composition: Uuid,
        slot: EffectSlot,
        effect: TimedObject,
    },
}
