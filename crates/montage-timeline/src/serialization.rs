//! Timeline serialization with versioning and migration.
//!
//! Uses JSON with a schema version field for forward-compatible
//! persistence. The on-disk structure references objects and factories by
//! stable uid; cross-references (`linked-uid`, `brother-uid`) may point
//! forward in the file and are resolved through a [`LinkRegistry`] owned by
//! the load.

use std::collections::HashMap;

use montage_core::{MontageError, RationalTime, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::composition::Composition;
use crate::event::EffectSlot;
use crate::layer::SourceLayer;
use crate::object::{MediaKind, SourceFactory, TimedObject};
use crate::registry::{LinkRegistry, RefSlot};
use crate::timeline::Timeline;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Serialized form of a timed object. References are uids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedTimedObject {
    pub uid: Uuid,
    pub name: String,
    pub start: RationalTime,
    pub duration: RationalTime,
    #[serde(default)]
    pub priority: u32,
    pub media_type: MediaKind,
    #[serde(rename = "factory-uid", default, skip_serializing_if = "Option::is_none")]
    pub factory_uid: Option<Uuid>,
    #[serde(rename = "brother-uid", default, skip_serializing_if = "Option::is_none")]
    pub brother_uid: Option<Uuid>,
    #[serde(rename = "linked-uid", default, skip_serializing_if = "Option::is_none")]
    pub linked_uid: Option<Uuid>,
}

impl SerializedTimedObject {
    fn from_object(o: &TimedObject) -> Self {
        Self {
            uid: o.id,
            name: o.name.clone(),
            start: o.start(),
            duration: o.duration(),
            priority: o.priority(),
            media_type: o.media_kind,
            factory_uid: o.factory.as_ref().map(|f| f.uid),
            brother_uid: o.brother(),
            linked_uid: o.linked(),
        }
    }
}

/// One serialized source layer: its priority band and its ordered objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedLayer {
    #[serde(rename = "min-priority")]
    pub min_priority: u32,
    #[serde(rename = "max-priority")]
    pub max_priority: u32,
    pub sources: Vec<SerializedTimedObject>,
}

/// Serialized form of a composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedComposition {
    pub uid: Uuid,
    pub name: String,
    pub media_type: MediaKind,
    /// Per-layer ordered source lists.
    pub sources: Vec<SerializedLayer>,
    #[serde(rename = "global-effects", default, skip_serializing_if = "Vec::is_empty")]
    pub global_effects: Vec<SerializedTimedObject>,
    #[serde(rename = "simple-effects", default, skip_serializing_if = "Vec::is_empty")]
    pub simple_effects: Vec<Vec<SerializedTimedObject>>,
    #[serde(rename = "complex-effects", default, skip_serializing_if = "Vec::is_empty")]
    pub complex_effects: Vec<SerializedTimedObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<SerializedTimedObject>,
    #[serde(rename = "default-source", default, skip_serializing_if = "Option::is_none")]
    pub default_source: Option<SerializedTimedObject>,
    #[serde(
        rename = "linked-composition",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub linked_composition: Option<Uuid>,
}

/// Serialized form of a whole timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedTimeline {
    pub uid: Uuid,
    pub name: String,
    /// Factory table referenced by `factory-uid`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub factories: Vec<SourceFactory>,
    pub compositions: Vec<SerializedComposition>,
}

/// Build the serialized form of a timeline.
pub fn serialize_timeline(timeline: &Timeline) -> SerializedTimeline {
    let mut factories: HashMap<Uuid, SourceFactory> = HashMap::new();
    for comp in timeline.compositions() {
        for obj in comp.all_objects() {
            if let Some(f) = &obj.factory {
                factories.entry(f.uid).or_insert_with(|| f.clone());
            }
        }
    }
    let mut factories: Vec<SourceFactory> = factories.into_values().collect();
    factories.sort_by_key(|f| f.uid);

    let compositions = timeline
        .compositions()
        .iter()
        .map(|comp| SerializedComposition {
            uid: comp.id,
            name: comp.name.clone(),
            media_type: comp.media_kind,
            sources: comp
                .layers()
                .iter()
                .map(|layer| SerializedLayer {
                    min_priority: layer.min_priority,
                    max_priority: layer.max_priority,
                    sources: layer
                        .objects()
                        .iter()
                        .map(SerializedTimedObject::from_object)
                        .collect(),
                })
                .collect(),
            global_effects: comp
                .global_effects()
                .iter()
                .map(SerializedTimedObject::from_object)
                .collect(),
            simple_effects: comp
                .simple_effects()
                .iter()
                .map(|l| l.iter().map(SerializedTimedObject::from_object).collect())
                .collect(),
            complex_effects: comp
                .complex_effects()
                .iter()
                .map(SerializedTimedObject::from_object)
                .collect(),
            transitions: comp
                .transitions()
                .iter()
                .map(SerializedTimedObject::from_object)
                .collect(),
            default_source: comp.default_source().map(SerializedTimedObject::from_object),
            linked_composition: comp.linked_composition(),
        })
        .collect();

    SerializedTimeline {
        uid: timeline.id,
        name: timeline.name.clone(),
        factories,
        compositions,
    }
}

/// Rebuild a timeline from its serialized form.
///
/// Objects register in a fresh [`LinkRegistry`] as they are constructed;
/// `linked-uid`/`brother-uid` references are parked there and patched once
/// every object exists, so references may point forward in the file.
pub fn deserialize_timeline(serialized: &SerializedTimeline) -> Result<Timeline> {
    let mut factory_table: HashMap<Uuid, SourceFactory> = HashMap::new();
    for factory in &serialized.factories {
        if factory_table.insert(factory.uid, factory.clone()).is_some() {
            return Err(MontageError::DuplicateLink(format!(
                "factory uid {} appears twice",
                factory.uid
            )));
        }
    }

    let mut registry = LinkRegistry::new();
    let mut compositions: Vec<Composition> = Vec::with_capacity(serialized.compositions.len());
    let mut scratch = Vec::new();

    for scomp in &serialized.compositions {
        let mut comp = Composition::new(scomp.name.clone(), scomp.media_type);
        comp.id = scomp.uid;

        comp.layers.clear();
        for slayer in &scomp.sources {
            let mut layer = SourceLayer::new(slayer.min_priority, slayer.max_priority);
            for sobj in &slayer.sources {
                layer.insert_sorted(build_object(sobj, &factory_table, &mut registry)?);
            }
            comp.layers.push(layer);
        }
        if comp.layers.is_empty() {
            comp.layers.push(SourceLayer::default_band());
        }

        for sobj in &scomp.global_effects {
            let obj = build_object(sobj, &factory_table, &mut registry)?;
            comp.add_effect(EffectSlot::Global, obj, &mut scratch)?;
        }
        for (layer_idx, slist) in scomp.simple_effects.iter().enumerate() {
            for sobj in slist {
                let obj = build_object(sobj, &factory_table, &mut registry)?;
                comp.add_effect(EffectSlot::Simple(layer_idx), obj, &mut scratch)?;
            }
        }
        for sobj in &scomp.complex_effects {
            let obj = build_object(sobj, &factory_table, &mut registry)?;
            comp.add_effect(EffectSlot::Complex, obj, &mut scratch)?;
        }
        for sobj in &scomp.transitions {
            let obj = build_object(sobj, &factory_table, &mut registry)?;
            comp.add_transition(obj, &mut scratch)?;
        }
        if let Some(sobj) = &scomp.default_source {
            comp.set_default_source(Some(build_object(sobj, &factory_table, &mut registry)?));
        }

        compositions.push(comp);
    }

    // patch the parked cross-references now that every object exists
    for patch in registry.resolve()? {
        let owner = compositions
            .iter_mut()
            .find_map(|c| c.find_object_mut(patch.owner))
            .ok_or_else(|| {
                MontageError::Internal(format!("registered object {} vanished", patch.owner))
            })?;
        match patch.slot {
            RefSlot::Linked => owner.linked = Some(patch.target),
            RefSlot::Brother => owner.brother = Some(patch.target),
        }
    }

    // linked-composition relations must be present and symmetric
    for scomp in &serialized.compositions {
        if let Some(target) = scomp.linked_composition {
            let partner = serialized
                .compositions
                .iter()
                .find(|c| c.uid == target)
                .ok_or_else(|| {
                    MontageError::UnresolvedReference(format!(
                        "linked composition {target} is not in the file"
                    ))
                })?;
            if partner.linked_composition != Some(scomp.uid) {
                return Err(MontageError::Serialization(format!(
                    "composition link {} -> {} is not symmetric",
                    scomp.uid, target
                )));
            }
        }
    }

    let mut timeline = Timeline::new(serialized.name.clone());
    timeline.id = serialized.uid;
    for (mut comp, scomp) in compositions.into_iter().zip(&serialized.compositions) {
        comp.linked_composition = scomp.linked_composition;
        comp.refresh_condensed();
        timeline.add_composition(comp);
    }
    Ok(timeline)
}

fn build_object(
    s: &SerializedTimedObject,
    factories: &HashMap<Uuid, SourceFactory>,
    registry: &mut LinkRegistry,
) -> Result<TimedObject> {
    registry.register(s.uid)?;
    let factory = match s.factory_uid {
        Some(fuid) => Some(factories.get(&fuid).cloned().ok_or_else(|| {
            MontageError::UnresolvedReference(format!(
                "factory {fuid} referenced by {} is not in the factory table",
                s.uid
            ))
        })?),
        None => None,
    };
    if let Some(target) = s.brother_uid {
        registry.defer(s.uid, RefSlot::Brother, target);
    }
    if let Some(target) = s.linked_uid {
        registry.defer(s.uid, RefSlot::Linked, target);
    }
    Ok(TimedObject {
        id: s.uid,
        name: s.name.clone(),
        start: s.start,
        duration: s.duration,
        priority: s.priority,
        media_kind: s.media_type,
        factory,
        linked: None,
        brother: None,
    })
}

// ── Versioned file wrapper ──────────────────────────────────────

/// Versioned timeline file wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct TimelineFile {
    /// Schema version for migration.
    pub version: u32,
    /// The timeline data.
    pub timeline: SerializedTimeline,
    /// Application version that wrote this file.
    pub app_version: String,
}

impl TimelineFile {
    /// Capture a timeline into a file wrapper.
    pub fn new(timeline: &Timeline) -> Self {
        Self {
            version: CURRENT_VERSION,
            timeline: serialize_timeline(timeline),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Rebuild the live timeline.
    pub fn into_timeline(&self) -> Result<Timeline> {
        deserialize_timeline(&self.timeline)
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| {
            MontageError::Serialization(format!("failed to serialize timeline: {e}"))
        })
    }

    /// Deserialize from JSON bytes, applying migrations if needed.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| MontageError::Serialization(format!("invalid JSON: {e}")))?;

        let version = raw.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        if version > CURRENT_VERSION {
            return Err(MontageError::Serialization(format!(
                "timeline file version {version} is newer than supported version {CURRENT_VERSION}"
            )));
        }

        let migrated = migrate(raw, version)?;
        serde_json::from_value(migrated)
            .map_err(|e| MontageError::Serialization(format!("failed to parse timeline: {e}")))
    }

    /// Save to a file path.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        let data = self.to_json()?;
        std::fs::write(path, data)?;
        info!(path = %path.display(), "saved timeline");
        Ok(())
    }

    /// Load from a file path.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        info!(path = %path.display(), "loaded timeline file");
        Self::from_json(&data)
    }
}

/// Apply sequential migrations from `from_version` to [`CURRENT_VERSION`].
fn migrate(mut data: serde_json::Value, from_version: u32) -> Result<serde_json::Value> {
    let mut version = from_version;

    while version < CURRENT_VERSION {
        match version {
            0 => {
                // v0 → v1: the entire value IS the timeline (old format)
                if data.get("version").is_none() {
                    data = serde_json::json!({
                        "version": 1,
                        "timeline": data,
                        "app_version": "0.1.0",
                    });
                }
                version = 1;
            }
            _ => {
                return Err(MontageError::Serialization(format!(
                    "no migration path from version {version}"
                )));
            }
        }
    }

    Ok(data)
}
