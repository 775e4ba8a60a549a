//! Montage Timeline - Non-linear composition model
//!
//! Implements the timeline data model for the Montage editor:
//! - Timed objects arranged on prioritized, start-ordered source layers
//! - Compositions with a cached condensed top-level view
//! - Linked audio/video compositions with mirrored ("auto-linked") edits
//!   and lazily constructed brother objects
//! - Change events feeding a transactional undo/redo action log
//! - Versioned serialization with deferred uid-reference resolution

pub mod composition;
pub mod edit;
pub mod event;
pub mod layer;
pub mod object;
pub mod registry;
pub mod serialization;
pub mod timeline;

pub use composition::{Composition, CondensedEntry};
pub use edit::{ActionLog, EditAction, Transaction};
pub use event::{EffectSlot, TimelineEvent};
pub use layer::SourceLayer;
pub use object::{MediaKind, SourceFactory, TimedObject};
pub use registry::{LinkRegistry, PendingRef, RefSlot};
pub use serialization::{
    deserialize_timeline, serialize_timeline, SerializedComposition, SerializedLayer,
    SerializedTimedObject, SerializedTimeline, TimelineFile, CURRENT_VERSION,
};
pub use timeline::{MoveOptions, RemoveOptions, Timeline};
