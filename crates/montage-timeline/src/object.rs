//! Timed objects: the entities arranged on composition layers.

use montage_core::{MontageError, RationalTime, Result, TimeRange};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Media kind of a timed object.
///
/// The linkage relation is independent of media kind; a brother always has
/// the complementary kind of its counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MediaKind {
    #[default]
    None,
    Audio,
    Video,
}

impl MediaKind {
    /// The complementary kind, used when constructing a brother object.
    pub fn complement(self) -> MediaKind {
        match self {
            MediaKind::Audio => MediaKind::Video,
            MediaKind::Video => MediaKind::Audio,
            MediaKind::None => MediaKind::None,
        }
    }
}

/// Opaque reference to the media factory that produced a source.
///
/// The composition model reads `default_duration` and forwards the handle
/// unchanged; everything else about the factory belongs to the media layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFactory {
    /// Stable factory identifier, used as the serialized reference.
    pub uid: Uuid,
    /// Factory name (displayed in UI).
    pub name: String,
    /// Natural length of material produced from this factory.
    pub default_duration: RationalTime,
}

impl SourceFactory {
    /// Create a new factory handle.
    pub fn new(name: impl Into<String>, default_duration: RationalTime) -> Self {
        Self {
            uid: Uuid::new_v4(),
            name: name.into(),
            default_duration,
        }
    }
}

/// A time-bounded object on a composition layer.
///
/// Created detached; attached to exactly one [`SourceLayer`] which holds the
/// authoritative value. All other references (`linked`, `brother`, external)
/// are ids. Start and duration are mutated only through the editing API so
/// that layer ordering, linkage propagation, and the condensed cache stay
/// consistent.
///
/// [`SourceLayer`]: crate::layer::SourceLayer
#[derive(Debug, Clone, PartialEq)]
pub struct TimedObject {
    /// Unique object ID
    pub id: Uuid,
    /// Object name (displayed in UI)
    pub name: String,
    /// Start offset on the timeline
    pub(crate) start: RationalTime,
    /// Duration on the timeline
    pub(crate) duration: RationalTime,
    /// Layer priority slot
    pub(crate) priority: u32,
    /// Media kind
    pub media_kind: MediaKind,
    /// Factory this object was produced from, if any
    pub factory: Option<SourceFactory>,
    /// Live bidirectional pairing kept in start/duration sync
    pub(crate) linked: Option<Uuid>,
    /// Complementary-kind counterpart of the same logical clip
    pub(crate) brother: Option<Uuid>,
}

impl TimedObject {
    /// Create a new detached object with zero start and duration.
    pub fn new(name: impl Into<String>, media_kind: MediaKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            start: RationalTime::ZERO,
            duration: RationalTime::ZERO,
            priority: 0,
            media_kind,
            factory: None,
            linked: None,
            brother: None,
        }
    }

    /// Create a detached object from a factory, taking the factory's natural
    /// duration.
    pub fn from_factory(name: impl Into<String>, factory: SourceFactory, kind: MediaKind) -> Self {
        let duration = factory.default_duration;
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            start: RationalTime::ZERO,
            duration,
            priority: 0,
            media_kind: kind,
            factory: Some(factory),
            linked: None,
            brother: None,
        }
    }

    /// Start offset on the timeline.
    #[inline]
    pub fn start(&self) -> RationalTime {
        self.start
    }

    /// Duration on the timeline.
    #[inline]
    pub fn duration(&self) -> RationalTime {
        self.duration
    }

    /// End time (exclusive).
    #[inline]
    pub fn end(&self) -> RationalTime {
        self.start + self.duration
    }

    /// Occupied time range.
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.duration)
    }

    /// Layer priority slot.
    #[inline]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Id of the linked partner, if any.
    #[inline]
    pub fn linked(&self) -> Option<Uuid> {
        self.linked
    }

    /// Id of the brother object, if one was ever constructed.
    #[inline]
    pub fn brother(&self) -> Option<Uuid> {
        self.brother
    }

    /// Check the attachment preconditions: positive duration, non-negative
    /// start.
    pub fn validate_for_attach(&self) -> Result<()> {
        if !self.duration.is_positive() {
            return Err(MontageError::InvalidSource(format!(
                "source {} has non-positive duration {}",
                self.name, self.duration
            )));
        }
        if self.start.is_negative() {
            return Err(MontageError::InvalidSource(format!(
                "source {} has negative start {}",
                self.name, self.start
            )));
        }
        Ok(())
    }

    /// Construct the complementary-kind counterpart of this object and record
    /// the symmetric brother pairing on both sides.
    ///
    /// The brother copies this object's factory, timing, and priority. Fails
    /// with `InvalidSource` when there is no factory to construct from.
    pub(crate) fn make_brother(&mut self) -> Result<TimedObject> {
        let factory = self.factory.clone().ok_or_else(|| {
            MontageError::InvalidSource(format!(
                "source {} has no factory to construct a brother from",
                self.name
            ))
        })?;
        let mut brother = TimedObject {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            start: self.start,
            duration: self.duration,
            priority: self.priority,
            media_kind: self.media_kind.complement(),
            factory: Some(factory),
            linked: None,
            brother: Some(self.id),
        };
        self.brother = Some(brother.id);
        brother.brother = Some(self.id);
        Ok(brother)
    }
}
