//! Headless render surface backed by a `bevy_ecs` world.
//!
//! Every sprite is an entity carrying [`Sprite`], [`Position`] and
//! [`AnimationPlayer`] components. [`EcsSurface::tick`] runs the animation
//! schedule, so frame indices advance exactly as a real renderer would show
//! them without needing a window or a GPU.

mod animation;
mod components;
mod surface;

pub use animation::{AnimationLibrary, FrameClock, advance_animations};
pub use components::{AnimationPlayer, Position, Sprite};
pub use surface::{EcsSurface, SpriteView};
