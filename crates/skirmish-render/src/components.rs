//! Components attached to every sprite entity.

use bevy_ecs::prelude::*;
use skirmish_sync::{SpriteSheet, UnitKind};

/// What a sprite is drawn from. Copied from the kind's sprite sheet at
/// creation time.
#[derive(Component, Clone, Debug, PartialEq)]
pub struct Sprite {
    /// Unit kind the sprite was created for.
    pub kind: UnitKind,
    /// Texture path.
    pub texture: String,
    /// Width of one frame in pixels.
    pub frame_width: u32,
    /// Height of one frame in pixels.
    pub frame_height: u32,
}

impl From<&SpriteSheet> for Sprite {
    fn from(sheet: &SpriteSheet) -> Self {
        Self {
            kind: sheet.kind.clone(),
            texture: sheet.texture.clone(),
            frame_width: sheet.frame_width,
            frame_height: sheet.frame_height,
        }
    }
}

/// Scene position in pixels.
#[derive(Component, Clone, Copy, Debug, PartialEq, Default)]
pub struct Position {
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
}

/// Playback state of the sprite's current animation.
///
/// `frame` is an absolute index on the sprite sheet, not an offset into the
/// strip. A sprite with no key shows frame 0 and never advances.
#[derive(Component, Clone, Debug, PartialEq, Default)]
pub struct AnimationPlayer {
    /// Key of the playing animation.
    pub key: Option<String>,
    /// Frame currently shown.
    pub frame: u32,
    /// Seconds accumulated towards the next frame.
    pub elapsed: f32,
    /// Set once a non-looping animation reaches its last frame.
    pub finished: bool,
}

impl AnimationPlayer {
    /// Restarts playback of `key` from `first_frame`.
    pub fn start(&mut self, key: &str, first_frame: u32) {
        self.key = Some(key.to_string());
        self.frame = first_frame;
        self.elapsed = 0.0;
        self.finished = false;
    }
}
