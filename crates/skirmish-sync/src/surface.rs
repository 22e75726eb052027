//! The render surface capability the reconciler drives.
//!
//! A surface owns live sprites and hands out opaque handles; it keeps no
//! notion of unit identity. [`RecordingSurface`] is an in-memory surface that
//! logs every call, for tests and headless tooling.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::catalog::AnimationDef;
use crate::snapshot::UnitKind;

/// Per-call failures reported by a render surface. None of them is fatal to
/// reconciliation; the affected entity is skipped and retried on the next
/// snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    /// No sprite sheet is loaded for the kind.
    #[error("no sprite asset loaded for kind {0}")]
    AssetMissing(UnitKind),

    /// The animation key was never defined on this surface.
    #[error("animation key {0} is not defined")]
    UnknownAnimationKey(String),

    /// The handle does not refer to a live sprite.
    #[error("sprite handle {0} is not live")]
    StaleHandle(String),

    /// Any other backend failure.
    #[error("render backend error: {0}")]
    Backend(String),
}

/// Sprite-rendering capability consumed by the scene reconciler.
pub trait RenderSurface {
    /// Opaque reference to a live sprite.
    type Handle: Copy + Eq + fmt::Debug;

    /// Registers an animation so later [`play_animation`](Self::play_animation)
    /// calls can refer to it by key. Called once per catalog entry at mount.
    fn define_animation(&mut self, def: &AnimationDef) -> Result<(), SurfaceError>;

    /// Creates a sprite for `kind` at `(x, y)`.
    fn create_sprite(&mut self, x: f32, y: f32, kind: &UnitKind)
    -> Result<Self::Handle, SurfaceError>;

    /// Switches the sprite's playing animation, starting from its first frame.
    fn play_animation(&mut self, handle: Self::Handle, key: &str) -> Result<(), SurfaceError>;

    /// Destroys the sprite. The handle is invalid afterwards.
    fn destroy_sprite(&mut self, handle: Self::Handle) -> Result<(), SurfaceError>;

    /// Moves the sprite.
    fn update_position(&mut self, handle: Self::Handle, x: f32, y: f32)
    -> Result<(), SurfaceError>;
}

// ---------------------------------------------------------------------------
// RecordingSurface
// ---------------------------------------------------------------------------

/// One call made against a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    /// `create_sprite` returned `handle`.
    Create {
        /// Handle handed out.
        handle: u64,
        /// Requested kind.
        kind: UnitKind,
        /// Requested x.
        x: f32,
        /// Requested y.
        y: f32,
    },
    /// `play_animation`.
    Play {
        /// Target sprite.
        handle: u64,
        /// Animation key.
        key: String,
    },
    /// `destroy_sprite`.
    Destroy {
        /// Target sprite.
        handle: u64,
    },
    /// `update_position`.
    Move {
        /// Target sprite.
        handle: u64,
        /// New x.
        x: f32,
        /// New y.
        y: f32,
    },
}

/// In-memory surface that records successful sprite calls.
///
/// Animation definitions are tracked but not recorded as calls. Creation can
/// be made to fail per kind to simulate missing assets.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    next_handle: u64,
    live: HashMap<u64, UnitKind>,
    playing: HashMap<u64, String>,
    defined: HashSet<String>,
    missing_assets: HashSet<UnitKind>,
    calls: Vec<SurfaceCall>,
}

impl RecordingSurface {
    /// Creates an empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future `create_sprite` for `kind` fail with
    /// [`SurfaceError::AssetMissing`].
    pub fn fail_assets_for(&mut self, kind: UnitKind) {
        self.missing_assets.insert(kind);
    }

    /// Clears a failure set up with [`fail_assets_for`](Self::fail_assets_for).
    pub fn restore_assets_for(&mut self, kind: &UnitKind) {
        self.missing_assets.remove(kind);
    }

    /// Destroys a sprite behind the reconciler's back, leaving its handle stale.
    pub fn evict(&mut self, handle: u64) {
        self.live.remove(&handle);
        self.playing.remove(&handle);
    }

    /// Every recorded call, oldest first.
    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    /// Returns and clears the recorded calls.
    pub fn take_calls(&mut self) -> Vec<SurfaceCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of live sprites.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if `handle` refers to a live sprite.
    pub fn is_live(&self, handle: u64) -> bool {
        self.live.contains_key(&handle)
    }

    /// Kind of a live sprite.
    pub fn kind_of(&self, handle: u64) -> Option<&UnitKind> {
        self.live.get(&handle)
    }

    /// Animation key the sprite is playing, if any.
    pub fn playing(&self, handle: u64) -> Option<&str> {
        self.playing.get(&handle).map(String::as_str)
    }

    fn check_live(&self, handle: u64) -> Result<(), SurfaceError> {
        if self.live.contains_key(&handle) {
            Ok(())
        } else {
            Err(SurfaceError::StaleHandle(handle.to_string()))
        }
    }
}

impl RenderSurface for RecordingSurface {
    type Handle = u64;

    fn define_animation(&mut self, def: &AnimationDef) -> Result<(), SurfaceError> {
        self.defined.insert(def.key.clone());
        Ok(())
    }

    fn create_sprite(&mut self, x: f32, y: f32, kind: &UnitKind) -> Result<u64, SurfaceError> {
        if self.missing_assets.contains(kind) {
            return Err(SurfaceError::AssetMissing(kind.clone()));
        }
        self.next_handle += 1;
        let handle = self.next_handle;
        self.live.insert(handle, kind.clone());
        self.calls.push(SurfaceCall::Create {
            handle,
            kind: kind.clone(),
            x,
            y,
        });
        Ok(handle)
    }

    fn play_animation(&mut self, handle: u64, key: &str) -> Result<(), SurfaceError> {
        self.check_live(handle)?;
        if !self.defined.contains(key) {
            return Err(SurfaceError::UnknownAnimationKey(key.to_string()));
        }
        self.playing.insert(handle, key.to_string());
        self.calls.push(SurfaceCall::Play {
            handle,
            key: key.to_string(),
        });
        Ok(())
    }

    fn destroy_sprite(&mut self, handle: u64) -> Result<(), SurfaceError> {
        self.check_live(handle)?;
        self.live.remove(&handle);
        self.playing.remove(&handle);
        self.calls.push(SurfaceCall::Destroy { handle });
        Ok(())
    }

    fn update_position(&mut self, handle: u64, x: f32, y: f32) -> Result<(), SurfaceError> {
        self.check_live(handle)?;
        self.calls.push(SurfaceCall::Move { handle, x, y });
        Ok(())
    }
}
