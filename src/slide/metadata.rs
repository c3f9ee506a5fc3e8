//! Slide metadata.
//!
//! Slide properties are carried as a flat mapping from a fixed set of known
//! property names to optional scalars. Every known name is always present in
//! the mapping; a property the slide does not define maps to `None` rather
//! than being omitted.
//!
//! # Aperio Descriptions
//!
//! Aperio scanners store their properties in the ImageDescription string:
//!
//! ```text
//! Aperio Image Library v12.0.15
//! 46920x33600 (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.499
//! ```
//!
//! When a slide provides `tiff.ImageDescription` but no `aperio.*` keys,
//! the `aperio.*` keys are derived from the description.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, SinkError, SourceError};

// =============================================================================
// Property Schema
// =============================================================================

/// Expected scalar kind of a known property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Int,
    Float,
    Text,
}

/// Known slide property names and their scalar kinds.
pub const SLIDE_PROPERTIES: &[(&str, PropertyKind)] = &[
    ("aperio.AppMag", PropertyKind::Int),
    ("aperio.Date", PropertyKind::Text),
    ("aperio.DisplayColor", PropertyKind::Int),
    ("aperio.Exposure Scale", PropertyKind::Float),
    ("aperio.Exposure Time", PropertyKind::Text),
    ("aperio.Filename", PropertyKind::Text),
    ("aperio.Focus Offset", PropertyKind::Float),
    ("aperio.ICC Profile", PropertyKind::Text),
    ("aperio.ImageID", PropertyKind::Text),
    ("aperio.Left", PropertyKind::Float),
    ("aperio.LineAreaXOffset", PropertyKind::Float),
    ("aperio.LineAreaYOffset", PropertyKind::Float),
    ("aperio.LineCameraSkew", PropertyKind::Float),
    ("aperio.MPP", PropertyKind::Float),
    ("aperio.OriginalHeight", PropertyKind::Int),
    ("aperio.OriginalWidth", PropertyKind::Int),
    ("aperio.ScanScope ID", PropertyKind::Text),
    ("aperio.StripeWidth", PropertyKind::Int),
    ("aperio.Time", PropertyKind::Text),
    ("aperio.Time Zone", PropertyKind::Text),
    ("aperio.Top", PropertyKind::Float),
    ("aperio.User", PropertyKind::Text),
    ("openslide.associated.label.height", PropertyKind::Int),
    ("openslide.associated.label.width", PropertyKind::Int),
    ("openslide.associated.macro.height", PropertyKind::Int),
    ("openslide.associated.macro.width", PropertyKind::Int),
    ("openslide.associated.thumbnail.height", PropertyKind::Int),
    ("openslide.associated.thumbnail.width", PropertyKind::Int),
    ("openslide.comment", PropertyKind::Text),
    ("openslide.icc-size", PropertyKind::Int),
    ("openslide.level-count", PropertyKind::Int),
    ("openslide.level[0].downsample", PropertyKind::Float),
    ("openslide.level[0].height", PropertyKind::Int),
    ("openslide.level[0].tile-height", PropertyKind::Int),
    ("openslide.level[0].tile-width", PropertyKind::Int),
    ("openslide.level[0].width", PropertyKind::Int),
    ("openslide.level[1].downsample", PropertyKind::Float),
    ("openslide.level[1].height", PropertyKind::Int),
    ("openslide.level[1].tile-height", PropertyKind::Int),
    ("openslide.level[1].tile-width", PropertyKind::Int),
    ("openslide.level[1].width", PropertyKind::Int),
    ("openslide.level[2].downsample", PropertyKind::Float),
    ("openslide.level[2].height", PropertyKind::Int),
    ("openslide.level[2].tile-height", PropertyKind::Int),
    ("openslide.level[2].tile-width", PropertyKind::Int),
    ("openslide.level[2].width", PropertyKind::Int),
    ("openslide.level[3].downsample", PropertyKind::Float),
    ("openslide.level[3].height", PropertyKind::Int),
    ("openslide.level[3].tile-height", PropertyKind::Int),
    ("openslide.level[3].tile-width", PropertyKind::Int),
    ("openslide.level[3].width", PropertyKind::Int),
    ("openslide.mpp-x", PropertyKind::Float),
    ("openslide.mpp-y", PropertyKind::Float),
    ("openslide.objective-power", PropertyKind::Int),
    ("openslide.quickhash-1", PropertyKind::Text),
    ("openslide.vendor", PropertyKind::Text),
    ("tiff.ImageDescription", PropertyKind::Text),
    ("tiff.ResolutionUnit", PropertyKind::Text),
];

/// Look up the expected kind of a known property.
pub fn property_kind(key: &str) -> Option<PropertyKind> {
    SLIDE_PROPERTIES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, kind)| *kind)
}

// =============================================================================
// Metadata Values
// =============================================================================

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Coerce a raw property string to the expected kind.
    ///
    /// Values that do not parse as the expected kind are kept as text.
    pub fn coerce(raw: &str, kind: PropertyKind) -> Self {
        let trimmed = raw.trim();
        match kind {
            PropertyKind::Int => {
                if let Ok(v) = trimmed.parse::<i64>() {
                    return MetadataValue::Int(v);
                }
                match trimmed.parse::<f64>() {
                    Ok(v) if v.fract() == 0.0 && v.is_finite() => MetadataValue::Int(v as i64),
                    _ => MetadataValue::Text(raw.to_string()),
                }
            }
            PropertyKind::Float => match trimmed.parse::<f64>() {
                Ok(v) => MetadataValue::Float(v),
                Err(_) => MetadataValue::Text(raw.to_string()),
            },
            PropertyKind::Text => MetadataValue::Text(raw.to_string()),
        }
    }

    /// Numeric view of the value, parsing text if needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(v) => Some(*v as f64),
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Text view of the value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Int(v) => write!(f, "{}", v),
            MetadataValue::Float(v) => write!(f, "{}", v),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

// =============================================================================
// SlideMetadata
// =============================================================================

/// Immutable flat mapping of slide properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SlideMetadata {
    values: BTreeMap<String, Option<MetadataValue>>,
}

impl Default for SlideMetadata {
    fn default() -> Self {
        Self::empty()
    }
}

impl SlideMetadata {
    /// Metadata with every known property absent.
    pub fn empty() -> Self {
        let values = SLIDE_PROPERTIES
            .iter()
            .map(|(name, _)| (name.to_string(), None))
            .collect();
        Self { values }
    }

    /// Build metadata from raw string properties.
    ///
    /// Only known property names are kept. Aperio keys missing from
    /// `properties` are derived from an Aperio ImageDescription when one is
    /// present.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let mut metadata = Self::empty();

        for (name, kind) in SLIDE_PROPERTIES {
            if let Some(raw) = properties.get(*name) {
                metadata
                    .values
                    .insert(name.to_string(), Some(MetadataValue::coerce(raw, *kind)));
            }
        }

        let has_aperio = properties.keys().any(|k| k.starts_with("aperio."));
        if !has_aperio {
            if let Some(description) = properties.get("tiff.ImageDescription") {
                metadata.apply_aperio_description(description);
            }
        }

        metadata
    }

    /// Parse a sidecar JSON object of properties.
    ///
    /// The object must be flat; scalar values of any JSON type are accepted
    /// and coerced to the schema kind.
    pub fn from_json_str(json: &str) -> Result<Self, SourceError> {
        let raw: HashMap<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|e| SourceError::InvalidDescriptor {
                reason: format!("invalid properties file: {}", e),
            })?;

        let mut properties = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            let text = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s,
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                other => {
                    return Err(SourceError::InvalidDescriptor {
                        reason: format!("property {} is not a scalar: {}", key, other),
                    })
                }
            };
            properties.insert(key, text);
        }

        Ok(Self::from_properties(&properties))
    }

    /// Derive `aperio.*` properties from an Aperio ImageDescription.
    fn apply_aperio_description(&mut self, description: &str) {
        if !description.contains("Aperio") {
            return;
        }

        self.set_if_absent("openslide.vendor", MetadataValue::Text("aperio".to_string()));

        // Parse pipe-separated key=value pairs
        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let name = format!("aperio.{}", key.trim());
            if let Some(kind) = property_kind(&name) {
                self.set_if_absent(&name, MetadataValue::coerce(value.trim(), kind));
            }
        }

        if let Some(mpp) = self.get("aperio.MPP").and_then(MetadataValue::as_f64) {
            self.set_if_absent("openslide.mpp-x", MetadataValue::Float(mpp));
            self.set_if_absent("openslide.mpp-y", MetadataValue::Float(mpp));
        }
        if let Some(MetadataValue::Int(mag)) = self.get("aperio.AppMag").cloned() {
            self.set_if_absent("openslide.objective-power", MetadataValue::Int(mag));
        }
    }

    fn set_if_absent(&mut self, key: &str, value: MetadataValue) {
        let slot = self.values.entry(key.to_string()).or_insert(None);
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    /// Return a copy with one property set.
    pub fn with(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.values.insert(key.into(), Some(value));
        self
    }

    /// Get a property value; `None` when absent or unknown.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.values.get(key).and_then(Option::as_ref)
    }

    /// Whether `key` is part of the mapping (present or explicitly absent).
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Numeric property value.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(MetadataValue::as_f64)
    }

    /// Iterate over every property, including absent ones.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&MetadataValue>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Iterate over properties that have a value.
    pub fn present(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.values
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.as_str(), v)))
    }

    /// Number of properties, including absent ones.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the mapping holds no properties at all.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Write the full mapping as pretty-printed JSON.
    pub async fn write_json(&self, path: &Path) -> Result<(), SinkError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| SinkError::Encode {
            message: e.to_string(),
        })?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| SinkError::Io(IoError::from_std(path, &e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
