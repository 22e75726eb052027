//! Animation catalog: immutable `(kind, action) → AnimationDef` lookup plus
//! the sprite sheet each unit kind is drawn from.
//!
//! The catalog is built once at startup, either from the built-in manifest or
//! from a RON file, and every configuration mistake (duplicate entries, empty
//! frame ranges, non-positive frame rates) is reported then. At runtime
//! [`AnimationCatalog::resolve`] falls back to the kind's idle strip when an
//! action has no strip of its own.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::{UnitAction, UnitKind};

/// Manifest compiled into the binary, used when no catalog file is configured.
const BUILTIN_MANIFEST: &str = include_str!("../assets/catalog.ron");

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A frame strip on a kind's sprite sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationDef {
    /// Key the render surface knows this animation by (e.g. `soldier_walk`).
    pub key: String,
    /// First frame index, inclusive.
    pub frame_start: u32,
    /// Last frame index, inclusive.
    pub frame_end: u32,
    /// Playback speed in frames per second.
    pub frame_rate: f32,
    /// Restart from `frame_start` after `frame_end`; otherwise hold the last frame.
    pub looping: bool,
}

impl AnimationDef {
    /// Number of frames in the strip. Zero for an inverted range.
    pub fn frame_count(&self) -> u32 {
        self.frame_end
            .checked_sub(self.frame_start)
            .map_or(0, |span| span.saturating_add(1))
    }

    /// Checks the frame range and frame rate.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidFrameRange`] or
    /// [`CatalogError::InvalidFrameRate`].
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.frame_start > self.frame_end {
            return Err(CatalogError::InvalidFrameRange {
                key: self.key.clone(),
                start: self.frame_start,
                end: self.frame_end,
            });
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(CatalogError::InvalidFrameRate {
                key: self.key.clone(),
                rate: self.frame_rate,
            });
        }
        Ok(())
    }
}

/// The texture a unit kind is drawn from, cut into fixed-size frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteSheet {
    /// Unit kind this sheet belongs to.
    pub kind: UnitKind,
    /// Texture path, relative to the asset root.
    pub texture: String,
    /// Width of one frame in pixels.
    pub frame_width: u32,
    /// Height of one frame in pixels.
    pub frame_height: u32,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Catalog construction errors. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// I/O error reading the manifest file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// RON deserialization error.
    #[error("ron parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    /// The same `(kind, action)` pair was defined twice.
    #[error("duplicate animation for {kind}/{action}")]
    DuplicateAnimation {
        /// Unit kind.
        kind: UnitKind,
        /// Unit action.
        action: UnitAction,
    },

    /// Two entries share an animation key.
    #[error("duplicate animation key: {0}")]
    DuplicateKey(String),

    /// A kind was given two sprite sheets.
    #[error("duplicate sprite sheet for {0}")]
    DuplicateSheet(UnitKind),

    /// `frame_start` is past `frame_end`.
    #[error("animation {key}: frame range {start}..={end} is empty")]
    InvalidFrameRange {
        /// Offending animation key.
        key: String,
        /// Declared first frame.
        start: u32,
        /// Declared last frame.
        end: u32,
    },

    /// Frame rate is zero, negative, or not finite.
    #[error("animation {key}: frame rate {rate} must be positive")]
    InvalidFrameRate {
        /// Offending animation key.
        key: String,
        /// Declared frame rate.
        rate: f32,
    },
}

/// Neither the requested action nor the kind's idle strip is in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no animation for {kind}/{action} and no {kind}/idle fallback")]
pub struct UnknownAnimation {
    /// Requested kind.
    pub kind: UnitKind,
    /// Requested action.
    pub action: UnitAction,
}

// ---------------------------------------------------------------------------
// RON manifest
// ---------------------------------------------------------------------------

/// Top-level RON manifest.
#[derive(Debug, Deserialize)]
pub struct CatalogManifest {
    /// Sprite sheets, one per kind.
    #[serde(default)]
    pub sheets: Vec<SpriteSheet>,
    /// Animation strips.
    pub animations: Vec<AnimationEntry>,
}

/// A single animation entry in the RON manifest.
#[derive(Debug, Deserialize)]
pub struct AnimationEntry {
    /// Unit kind.
    pub kind: UnitKind,
    /// Unit action.
    pub action: UnitAction,
    /// Animation key.
    pub key: String,
    /// First frame, inclusive.
    pub frame_start: u32,
    /// Last frame, inclusive.
    pub frame_end: u32,
    /// Frames per second.
    pub frame_rate: f32,
    /// Whether playback loops.
    #[serde(default)]
    pub looping: bool,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Accumulates catalog entries, rejecting duplicates as they are added.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    animations: HashMap<(UnitKind, UnitAction), AnimationDef>,
    keys: HashSet<String>,
    sheets: HashMap<UnitKind, SpriteSheet>,
}

impl CatalogBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the sprite sheet for a kind.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateSheet`] if the kind already has one.
    pub fn sheet(&mut self, sheet: SpriteSheet) -> Result<&mut Self, CatalogError> {
        if self.sheets.contains_key(&sheet.kind) {
            return Err(CatalogError::DuplicateSheet(sheet.kind));
        }
        self.sheets.insert(sheet.kind.clone(), sheet);
        Ok(self)
    }

    /// Adds the animation for `(kind, action)`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the pair or the key is already present, or
    /// if the definition itself is invalid.
    pub fn animation(
        &mut self,
        kind: UnitKind,
        action: UnitAction,
        def: AnimationDef,
    ) -> Result<&mut Self, CatalogError> {
        def.validate()?;
        let slot = (kind, action);
        if self.animations.contains_key(&slot) {
            let (kind, action) = slot;
            return Err(CatalogError::DuplicateAnimation { kind, action });
        }
        if !self.keys.insert(def.key.clone()) {
            return Err(CatalogError::DuplicateKey(def.key));
        }
        self.animations.insert(slot, def);
        Ok(self)
    }

    /// Freezes the builder into an immutable catalog.
    pub fn build(self) -> AnimationCatalog {
        AnimationCatalog {
            animations: self.animations,
            sheets: self.sheets,
        }
    }
}

// ---------------------------------------------------------------------------
// AnimationCatalog
// ---------------------------------------------------------------------------

/// Immutable registry of animations and sprite sheets.
#[derive(Debug, Clone)]
pub struct AnimationCatalog {
    animations: HashMap<(UnitKind, UnitAction), AnimationDef>,
    sheets: HashMap<UnitKind, SpriteSheet>,
}

impl AnimationCatalog {
    /// Returns a builder for assembling a catalog in code.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// The catalog shipped with the client: soldier, archer and cavalry with
    /// idle, walk, attack and death strips.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] only if the embedded manifest is broken.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_ron_str(BUILTIN_MANIFEST)
    }

    /// Loads a catalog from a RON manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on I/O, parse, or validation failures.
    pub fn from_ron(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        let catalog = Self::from_ron_str(&contents)?;
        tracing::info!(
            path = %path.display(),
            animations = catalog.len(),
            "loaded animation catalog"
        );
        Ok(catalog)
    }

    /// Loads a catalog from a RON manifest string.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on parse or validation failures.
    pub fn from_ron_str(ron_str: &str) -> Result<Self, CatalogError> {
        let manifest: CatalogManifest = ron::from_str(ron_str)?;
        Self::from_manifest(manifest)
    }

    /// Builds a catalog from an already-parsed manifest.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on duplicate or invalid entries.
    pub fn from_manifest(manifest: CatalogManifest) -> Result<Self, CatalogError> {
        let mut builder = CatalogBuilder::new();
        for sheet in manifest.sheets {
            builder.sheet(sheet)?;
        }
        for entry in manifest.animations {
            builder.animation(
                entry.kind,
                entry.action,
                AnimationDef {
                    key: entry.key,
                    frame_start: entry.frame_start,
                    frame_end: entry.frame_end,
                    frame_rate: entry.frame_rate,
                    looping: entry.looping,
                },
            )?;
        }
        Ok(builder.build())
    }

    /// Resolves the animation for `(kind, action)`, falling back to
    /// `(kind, idle)`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownAnimation`] if neither entry exists. The caller decides
    /// whether that is fatal.
    pub fn resolve(
        &self,
        kind: &UnitKind,
        action: &UnitAction,
    ) -> Result<&AnimationDef, UnknownAnimation> {
        self.get(kind, action)
            .or_else(|| self.get(kind, &UnitAction::Idle))
            .ok_or_else(|| UnknownAnimation {
                kind: kind.clone(),
                action: action.clone(),
            })
    }

    /// Exact lookup without fallback.
    pub fn get(&self, kind: &UnitKind, action: &UnitAction) -> Option<&AnimationDef> {
        self.animations.get(&(kind.clone(), action.clone()))
    }

    /// Sprite sheet for a kind, if one was registered.
    pub fn sheet(&self, kind: &UnitKind) -> Option<&SpriteSheet> {
        self.sheets.get(kind)
    }

    /// All sprite sheets.
    pub fn sheets(&self) -> impl Iterator<Item = &SpriteSheet> {
        self.sheets.values()
    }

    /// All animation definitions, ordered by key.
    pub fn animations(&self) -> Vec<&AnimationDef> {
        let mut defs: Vec<&AnimationDef> = self.animations.values().collect();
        defs.sort_by(|a, b| a.key.cmp(&b.key));
        defs
    }

    /// Number of `(kind, action)` entries.
    pub fn len(&self) -> usize {
        self.animations.len()
    }

    /// Returns `true` if the catalog has no animations.
    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
