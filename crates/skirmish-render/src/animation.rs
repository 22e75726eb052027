//! Frame advance for sprite animations.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use skirmish_sync::AnimationDef;

use crate::components::AnimationPlayer;

/// Seconds elapsed since the previous tick.
#[derive(Resource, Debug, Clone, Default)]
pub struct FrameClock {
    /// Frame delta in seconds.
    pub delta: f32,
}

/// Animation definitions registered with the surface, by key.
#[derive(Resource, Debug, Clone, Default)]
pub struct AnimationLibrary {
    defs: HashMap<String, AnimationDef>,
}

impl AnimationLibrary {
    /// Registers or replaces a definition.
    pub fn insert(&mut self, def: AnimationDef) {
        self.defs.insert(def.key.clone(), def);
    }

    /// Definition for `key`.
    pub fn get(&self, key: &str) -> Option<&AnimationDef> {
        self.defs.get(key)
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// Advances every playing animation by [`FrameClock::delta`].
///
/// Looping strips wrap back to their first frame; the rest stop on the last
/// frame and set [`AnimationPlayer::finished`].
pub fn advance_animations(
    clock: Res<FrameClock>,
    library: Res<AnimationLibrary>,
    mut players: Query<&mut AnimationPlayer>,
) {
    for mut player in &mut players {
        if player.finished {
            continue;
        }
        let Some(def) = player.key.as_deref().and_then(|key| library.get(key)) else {
            continue;
        };
        step(&mut player, def, clock.delta);
    }
}

fn step(player: &mut AnimationPlayer, def: &AnimationDef, delta: f32) {
    let frame_time = 1.0 / def.frame_rate;
    if !frame_time.is_finite() || frame_time <= 0.0 || def.frame_end < def.frame_start {
        return;
    }
    player.elapsed += delta;
    let whole = (player.elapsed / frame_time).floor();
    if whole < 1.0 {
        return;
    }
    player.elapsed -= whole * frame_time;
    // Float-to-int casts saturate.
    let steps = whole as u64;

    let start = u64::from(def.frame_start);
    let end = u64::from(def.frame_end);
    let current = u64::from(player.frame).clamp(start, end);
    if def.looping {
        let len = end - start + 1;
        player.frame = (start + (current - start + steps % len) % len) as u32;
    } else if steps <= end - current {
        player.frame = (current + steps) as u32;
    } else {
        player.frame = def.frame_end;
        player.finished = true;
        player.elapsed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(looping: bool) -> AnimationDef {
        AnimationDef {
            key: "soldier_walk".to_string(),
            frame_start: 4,
            frame_end: 7,
            frame_rate: 10.0,
            looping,
        }
    }

    fn started(def: &AnimationDef) -> AnimationPlayer {
        let mut player = AnimationPlayer::default();
        player.start(&def.key, def.frame_start);
        player
    }

    #[test]
    fn test_step_advances_one_frame_per_period() {
        let def = strip(true);
        let mut player = started(&def);
        step(&mut player, &def, 0.25);
        assert_eq!(player.frame, 6);
    }

    #[test]
    fn test_step_below_period_holds_frame() {
        let def = strip(true);
        let mut player = started(&def);
        step(&mut player, &def, 0.05);
        assert_eq!(player.frame, 4);
        assert!(player.elapsed > 0.0);
    }

    #[test]
    fn test_looping_strip_wraps() {
        let def = strip(true);
        let mut player = started(&def);
        // Four frames at 10 fps: 0.45 s is past the end and back to the start.
        step(&mut player, &def, 0.45);
        assert_eq!(player.frame, 4);
        assert!(!player.finished);
    }

    #[test]
    fn test_non_looping_strip_holds_last_frame() {
        let def = strip(false);
        let mut player = started(&def);
        step(&mut player, &def, 2.0);
        assert_eq!(player.frame, 7);
        assert!(player.finished);
    }

    #[test]
    fn test_unbounded_frame_rate_does_not_spin() {
        let mut def = strip(true);
        def.frame_rate = f32::MAX;
        let mut player = started(&def);
        step(&mut player, &def, 1.0);
        assert!((4..=7).contains(&player.frame));

        def.frame_rate = -10.0;
        let mut player = started(&def);
        step(&mut player, &def, 1.0);
        assert_eq!(player.frame, 4);
    }

    #[test]
    fn test_inverted_range_is_ignored() {
        let def = AnimationDef {
            frame_start: 7,
            frame_end: 4,
            ..strip(true)
        };
        let mut player = started(&def);
        step(&mut player, &def, 1.0);
        assert_eq!(player.frame, 7);
        assert_eq!(def.frame_count(), 0);
    }

    #[test]
    fn test_system_skips_unknown_keys() {
        let mut world = World::new();
        world.insert_resource(FrameClock { delta: 1.0 });
        world.insert_resource(AnimationLibrary::default());
        let entity = world
            .spawn(AnimationPlayer {
                key: Some("missing".to_string()),
                ..Default::default()
            })
            .id();

        let mut schedule = Schedule::default();
        schedule.add_systems(advance_animations);
        schedule.run(&mut world);

        assert_eq!(world.get::<AnimationPlayer>(entity).unwrap().frame, 0);
    }
}
