//! Source layers: priority-banded, start-ordered object sequences.

use montage_core::{MontageError, RationalTime, Result};
use uuid::Uuid;

use crate::object::TimedObject;

/// An ordered sequence of [`TimedObject`]s sharing a priority band.
///
/// Objects are kept sorted by start ascending, ties in insertion order.
/// Overlap between consecutive objects is legal; the layer never reorders
/// except through explicit calls.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLayer {
    /// Lowest priority slot of this band
    pub min_priority: u32,
    /// Highest priority slot of this band
    pub max_priority: u32,
    objects: Vec<TimedObject>,
}

impl SourceLayer {
    /// Create a new empty layer spanning the given priority band.
    pub fn new(min_priority: u32, max_priority: u32) -> Self {
        Self {
            min_priority,
            max_priority,
            objects: Vec::new(),
        }
    }

    /// The default full-band layer a composition starts with.
    pub fn default_band() -> Self {
        Self::new(0, u32::MAX)
    }

    /// Number of objects in this layer.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the layer is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All objects, in layer order.
    pub fn objects(&self) -> &[TimedObject] {
        &self.objects
    }

    /// Object at the given index.
    pub fn get(&self, index: usize) -> Option<&TimedObject> {
        self.objects.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut TimedObject> {
        self.objects.get_mut(index)
    }

    /// Last object in layer order.
    pub fn last(&self) -> Option<&TimedObject> {
        self.objects.last()
    }

    /// Check whether an object with the given id is in this layer.
    pub fn contains(&self, id: Uuid) -> bool {
        self.index_of(id).is_some()
    }

    /// Find an object by id.
    pub fn find(&self, id: Uuid) -> Option<&TimedObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub(crate) fn find_mut(&mut self, id: Uuid) -> Option<&mut TimedObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    /// 0-based index of an object.
    pub fn index_of(&self, id: Uuid) -> Option<usize> {
        self.objects.iter().position(|o| o.id == id)
    }

    /// 1-based layer position for UI consumption.
    pub fn position_of(&self, id: Uuid) -> Option<usize> {
        self.index_of(id).map(|i| i + 1)
    }

    /// Insert an object preserving start order.
    ///
    /// The object lands before the first element whose start is strictly
    /// greater, so equal starts keep the existing elements first (stable
    /// merge behavior). Returns the insertion index.
    pub fn insert_sorted(&mut self, obj: TimedObject) -> usize {
        let index = self.objects.partition_point(|o| o.start <= obj.start);
        self.objects.insert(index, obj);
        index
    }

    /// Insert at an explicit index. The caller is responsible for keeping
    /// the start-order invariant (used for position-driven relocation and
    /// undo restoration).
    pub(crate) fn insert_at(&mut self, index: usize, obj: TimedObject) {
        let index = index.min(self.objects.len());
        self.objects.insert(index, obj);
    }

    /// Remove an object by id. Returns the removed value.
    pub fn remove(&mut self, id: Uuid) -> Result<TimedObject> {
        let index = self
            .index_of(id)
            .ok_or_else(|| MontageError::NotFound(format!("object {id} not in layer")))?;
        Ok(self.objects.remove(index))
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> TimedObject {
        self.objects.remove(index)
    }

    /// Add `offset` to the start of every object in `[start_index, end_index)`.
    ///
    /// `end_index` defaults to the layer length. A shift that would take any
    /// start below zero fails before anything is modified; silent clamping
    /// would desynchronize this layer from a linked one.
    pub fn shift_range(
        &mut self,
        offset: RationalTime,
        start_index: usize,
        end_index: Option<usize>,
    ) -> Result<()> {
        self.shift_range_raw(offset, start_index, end_index)?;
        self.resort();
        Ok(())
    }

    /// `shift_range` without the final ordering pass, for multi-step
    /// protocols that manage list positions themselves.
    pub(crate) fn shift_range_raw(
        &mut self,
        offset: RationalTime,
        start_index: usize,
        end_index: Option<usize>,
    ) -> Result<()> {
        let end = end_index.unwrap_or(self.objects.len()).min(self.objects.len());
        if start_index >= end {
            return Ok(());
        }
        for obj in &self.objects[start_index..end] {
            if (obj.start + offset).is_negative() {
                return Err(MontageError::InvalidArgument(format!(
                    "shifting {} by {} would move its start below zero",
                    obj.name, offset
                )));
            }
        }
        for obj in &mut self.objects[start_index..end] {
            obj.start += offset;
        }
        Ok(())
    }

    /// Shift a single object, cascading validation included.
    pub(crate) fn shift_one(&mut self, index: usize, offset: RationalTime) -> Result<()> {
        let obj = self.objects.get_mut(index).ok_or_else(|| {
            MontageError::NotFound(format!("no object at layer index {index}"))
        })?;
        if (obj.start + offset).is_negative() {
            return Err(MontageError::InvalidArgument(format!(
                "shifting {} by {} would move its start below zero",
                obj.name, offset
            )));
        }
        obj.start += offset;
        Ok(())
    }

    /// Restore the start-order invariant after start mutations.
    ///
    /// Stable, so equal starts keep their current relative order and a
    /// consistent list is untouched.
    pub(crate) fn resort(&mut self) {
        self.objects.sort_by_key(|o| o.start);
    }

    /// Check the start-order invariant.
    pub fn is_sorted(&self) -> bool {
        self.objects.windows(2).all(|w| w[0].start <= w[1].start)
    }
}

impl Default for SourceLayer {
    fn default() -> Self {
        Self::default_band()
    }
}
