//! [`RenderSurface`] implementation over a `bevy_ecs` world.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use skirmish_sync::{
    AnimationCatalog, AnimationDef, RenderSurface, SpriteSheet, SurfaceError, UnitKind,
};

use crate::animation::{AnimationLibrary, FrameClock, advance_animations};
use crate::components::{AnimationPlayer, Position, Sprite};

/// Read-only view of one sprite, for inspection and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteView {
    /// Sprite handle.
    pub entity: Entity,
    /// Unit kind.
    pub kind: UnitKind,
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
    /// Playing animation key.
    pub animation: Option<String>,
    /// Frame currently shown.
    pub frame: u32,
    /// Non-looping animation has ended.
    pub finished: bool,
}

/// Render surface that keeps sprites as ECS entities.
pub struct EcsSurface {
    world: World,
    schedule: Schedule,
    sheets: HashMap<UnitKind, SpriteSheet>,
}

impl EcsSurface {
    /// Creates a surface that can draw the given sprite sheets.
    pub fn new(sheets: impl IntoIterator<Item = SpriteSheet>) -> Self {
        let mut world = World::new();
        world.insert_resource(FrameClock::default());
        world.insert_resource(AnimationLibrary::default());

        let mut schedule = Schedule::default();
        schedule.add_systems(advance_animations);

        Self {
            world,
            schedule,
            sheets: sheets
                .into_iter()
                .map(|sheet| (sheet.kind.clone(), sheet))
                .collect(),
        }
    }

    /// Creates a surface with every sprite sheet in `catalog`. Animations
    /// are registered separately through
    /// [`define_animation`](RenderSurface::define_animation).
    pub fn from_catalog(catalog: &AnimationCatalog) -> Self {
        Self::new(catalog.sheets().cloned())
    }

    /// Advances every animation by `delta` seconds.
    pub fn tick(&mut self, delta: f32) {
        self.world.resource_mut::<FrameClock>().delta = delta;
        self.schedule.run(&mut self.world);
    }

    /// Number of live sprites.
    pub fn sprite_count(&mut self) -> usize {
        self.world
            .query_filtered::<(), With<Sprite>>()
            .iter(&self.world)
            .count()
    }

    /// Number of registered animations.
    pub fn animation_count(&self) -> usize {
        self.world.resource::<AnimationLibrary>().len()
    }

    /// All live sprites, ordered by entity.
    pub fn snapshot_view(&mut self) -> Vec<SpriteView> {
        let mut views: Vec<SpriteView> = self
            .world
            .query::<(Entity, &Sprite, &Position, &AnimationPlayer)>()
            .iter(&self.world)
            .map(|(entity, sprite, pos, player)| SpriteView {
                entity,
                kind: sprite.kind.clone(),
                x: pos.x,
                y: pos.y,
                animation: player.key.clone(),
                frame: player.frame,
                finished: player.finished,
            })
            .collect();
        views.sort_by_key(|view| view.entity);
        views
    }

    /// View of a single sprite.
    pub fn sprite(&self, entity: Entity) -> Option<SpriteView> {
        let sprite = self.world.get::<Sprite>(entity)?;
        let pos = self.world.get::<Position>(entity)?;
        let player = self.world.get::<AnimationPlayer>(entity)?;
        Some(SpriteView {
            entity,
            kind: sprite.kind.clone(),
            x: pos.x,
            y: pos.y,
            animation: player.key.clone(),
            frame: player.frame,
            finished: player.finished,
        })
    }

    /// The underlying world.
    pub fn world(&self) -> &World {
        &self.world
    }
}

fn stale(entity: Entity) -> SurfaceError {
    SurfaceError::StaleHandle(format!("{entity:?}"))
}

impl RenderSurface for EcsSurface {
    type Handle = Entity;

    fn define_animation(&mut self, def: &AnimationDef) -> Result<(), SurfaceError> {
        def.validate()
            .map_err(|error| SurfaceError::Backend(error.to_string()))?;
        self.world
            .resource_mut::<AnimationLibrary>()
            .insert(def.clone());
        Ok(())
    }

    fn create_sprite(&mut self, x: f32, y: f32, kind: &UnitKind) -> Result<Entity, SurfaceError> {
        let sheet = self
            .sheets
            .get(kind)
            .ok_or_else(|| SurfaceError::AssetMissing(kind.clone()))?;
        let entity = self
            .world
            .spawn((
                Sprite::from(sheet),
                Position { x, y },
                AnimationPlayer::default(),
            ))
            .id();
        tracing::trace!(?entity, %kind, x, y, "sprite created");
        Ok(entity)
    }

    fn play_animation(&mut self, handle: Entity, key: &str) -> Result<(), SurfaceError> {
        let first_frame = self
            .world
            .resource::<AnimationLibrary>()
            .get(key)
            .map(|def| def.frame_start)
            .ok_or_else(|| SurfaceError::UnknownAnimationKey(key.to_string()))?;
        let mut player = self
            .world
            .get_mut::<AnimationPlayer>(handle)
            .ok_or_else(|| stale(handle))?;
        player.start(key, first_frame);
        Ok(())
    }

    fn destroy_sprite(&mut self, handle: Entity) -> Result<(), SurfaceError> {
        if self.world.get::<Sprite>(handle).is_none() {
            return Err(stale(handle));
        }
        self.world.despawn(handle);
        tracing::trace!(entity = ?handle, "sprite destroyed");
        Ok(())
    }

    fn update_position(&mut self, handle: Entity, x: f32, y: f32) -> Result<(), SurfaceError> {
        let mut pos = self
            .world
            .get_mut::<Position>(handle)
            .ok_or_else(|| stale(handle))?;
        pos.x = x;
        pos.y = y;
        Ok(())
    }
}
