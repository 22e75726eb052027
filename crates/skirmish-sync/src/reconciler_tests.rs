use super::*;
use crate::catalog::{AnimationDef, SpriteSheet};
use crate::surface::{RecordingSurface, SurfaceCall};

fn catalog() -> AnimationCatalog {
    AnimationCatalog::builtin().unwrap()
}

/// A recording surface with every catalog animation defined, as after mount.
fn mounted(catalog: &AnimationCatalog) -> RecordingSurface {
    let mut surface = RecordingSurface::new();
    for def in catalog.animations() {
        surface.define_animation(def).unwrap();
    }
    surface
}

fn unit(id: &str, kind: UnitKind, x: f32, y: f32, action: UnitAction) -> UnitSnapshot {
    UnitSnapshot::new(id, kind, x, y, action)
}

fn soldier(id: &str, action: UnitAction) -> UnitSnapshot {
    unit(id, UnitKind::Soldier, 10.0, 20.0, action)
}

fn snapshot(units: Vec<UnitSnapshot>) -> GameSnapshot {
    GameSnapshot::new(units).unwrap()
}

fn rendered_ids(reconciler: &SceneReconciler<u64>) -> Vec<&str> {
    reconciler.ids().map(UnitId::as_str).collect()
}

fn creates(calls: &[SurfaceCall]) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, SurfaceCall::Create { .. }))
        .count()
}

fn destroys_of(calls: &[SurfaceCall], handle: u64) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, SurfaceCall::Destroy { handle: h } if *h == handle))
        .count()
}

// ---------------------------------------------------------------------------
// Core properties
// ---------------------------------------------------------------------------

#[test]
fn test_rendered_ids_track_snapshot_ids() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();

    let sequence = [
        vec!["a", "b", "c"],
        vec!["b", "d"],
        vec![],
        vec!["e"],
        vec!["e", "a"],
    ];
    for ids in sequence {
        let snap = snapshot(
            ids.iter()
                .map(|id| soldier(id, UnitAction::Walk))
                .collect(),
        );
        let report = reconciler.reconcile(&snap, &catalog, &mut surface);
        assert!(report.failures.is_empty());

        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(rendered_ids(&reconciler), expected);
        assert_eq!(surface.live_count(), ids.len());
    }
}

#[test]
fn test_same_snapshot_twice_is_noop() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();
    let snap = snapshot(vec![
        soldier("1", UnitAction::Walk),
        unit("2", UnitKind::Archer, 5.0, 5.0, UnitAction::Attack),
    ]);

    reconciler.reconcile(&snap, &catalog, &mut surface);
    surface.take_calls();

    assert!(reconciler.plan(&snap, &catalog).is_empty());
    let report = reconciler.reconcile(&snap, &catalog, &mut surface);
    assert!(report.is_noop());
    assert!(surface.calls().is_empty());
}

#[test]
fn test_overlapping_sequence_spawns_and_retires_once() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();

    let a = snapshot(vec![soldier("1", UnitAction::Walk)]);
    let b = snapshot(vec![
        soldier("1", UnitAction::Walk),
        soldier("2", UnitAction::Walk),
    ]);
    let c = snapshot(vec![soldier("2", UnitAction::Walk)]);

    reconciler.reconcile(&a, &catalog, &mut surface);
    let handle_1 = reconciler.entity(&UnitId::from("1")).unwrap().handle;
    assert_eq!(creates(&surface.take_calls()), 1);

    let report = reconciler.reconcile(&b, &catalog, &mut surface);
    let calls = surface.take_calls();
    assert_eq!(report.spawned, 1);
    assert_eq!(creates(&calls), 1);
    assert_eq!(destroys_of(&calls, handle_1), 0);

    let report = reconciler.reconcile(&c, &catalog, &mut surface);
    let calls = surface.take_calls();
    assert_eq!(report.retired, 1);
    assert_eq!(report.spawned, 0);
    assert_eq!(creates(&calls), 0);
    assert_eq!(destroys_of(&calls, handle_1), 1);
    assert_eq!(rendered_ids(&reconciler), vec!["2"]);
}

#[test]
fn test_action_change_replays_in_place() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();

    reconciler.reconcile(
        &snapshot(vec![soldier("7", UnitAction::Walk)]),
        &catalog,
        &mut surface,
    );
    let handle = reconciler.entity(&UnitId::from("7")).unwrap().handle;
    surface.take_calls();

    let report = reconciler.reconcile(
        &snapshot(vec![soldier("7", UnitAction::Attack)]),
        &catalog,
        &mut surface,
    );

    assert_eq!(report.replayed, 1);
    assert_eq!(
        surface.take_calls(),
        vec![SurfaceCall::Play {
            handle,
            key: "soldier_attack".to_string(),
        }]
    );
    let entity = reconciler.entity(&UnitId::from("7")).unwrap();
    assert_eq!(entity.handle, handle);
    assert_eq!(entity.current_action, UnitAction::Attack);
    assert_eq!(surface.playing(handle), Some("soldier_attack"));
}

#[test]
fn test_empty_snapshot_retires_everything() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();
    reconciler.reconcile(
        &snapshot(vec![
            soldier("1", UnitAction::Walk),
            unit("2", UnitKind::Cavalry, 0.0, 0.0, UnitAction::Idle),
        ]),
        &catalog,
        &mut surface,
    );

    let report = reconciler.reconcile(&GameSnapshot::empty(), &catalog, &mut surface);

    assert_eq!(report.retired, 2);
    assert!(reconciler.is_empty());
    assert_eq!(surface.live_count(), 0);
}

#[test]
fn test_retire_all_clears_scene() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();
    reconciler.reconcile(
        &snapshot(vec![soldier("1", UnitAction::Walk), soldier("2", UnitAction::Idle)]),
        &catalog,
        &mut surface,
    );

    let report = reconciler.retire_all(&mut surface);

    assert_eq!(report.retired, 2);
    assert!(reconciler.is_empty());
    assert_eq!(surface.live_count(), 0);
    assert!(reconciler.retire_all(&mut surface).is_noop());
}

// ---------------------------------------------------------------------------
// Animation resolution
// ---------------------------------------------------------------------------

#[test]
fn test_missing_action_falls_back_to_idle() {
    let mut builder = AnimationCatalog::builder();
    builder
        .sheet(SpriteSheet {
            kind: UnitKind::Soldier,
            texture: "soldier.png".into(),
            frame_width: 115,
            frame_height: 95,
        })
        .unwrap()
        .animation(
            UnitKind::Soldier,
            UnitAction::Walk,
            AnimationDef {
                key: "soldier_walk".to_string(),
                frame_start: 0,
                frame_end: 3,
                frame_rate: 10.0,
                looping: true,
            },
        )
        .unwrap()
        .animation(
            UnitKind::Soldier,
            UnitAction::Idle,
            AnimationDef {
                key: "soldier_idle".to_string(),
                frame_start: 0,
                frame_end: 0,
                frame_rate: 1.0,
                looping: true,
            },
        )
        .unwrap();
    let catalog = builder.build();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();

    let report = reconciler.reconcile(
        &snapshot(vec![soldier("u1", UnitAction::Attack)]),
        &catalog,
        &mut surface,
    );

    assert_eq!(report.spawned, 1);
    assert!(report.failures.is_empty());
    let entity = reconciler.entity(&UnitId::from("u1")).unwrap();
    assert_eq!(entity.current_action, UnitAction::Attack);
    assert_eq!(entity.current_animation.as_deref(), Some("soldier_idle"));
    assert_eq!(surface.playing(entity.handle), Some("soldier_idle"));
}

#[test]
fn test_unknown_kind_spawns_static_sprite() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();
    let wizard = UnitKind::from("wizard");

    let report = reconciler.reconcile(
        &snapshot(vec![unit("w", wizard.clone(), 1.0, 1.0, UnitAction::Walk)]),
        &catalog,
        &mut surface,
    );

    assert_eq!(report.spawned, 1);
    assert!(report.failures.is_empty());
    let calls = surface.take_calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], SurfaceCall::Create { kind, .. } if *kind == wizard));
    assert_eq!(reconciler.entity(&UnitId::from("w")).unwrap().current_animation, None);
}

#[test]
fn test_action_change_to_same_fallback_skips_replay() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();
    reconciler.reconcile(
        &snapshot(vec![soldier("1", UnitAction::Idle)]),
        &catalog,
        &mut surface,
    );
    surface.take_calls();

    // "cheer" has no strip and falls back to the idle strip already playing.
    let cheer = UnitAction::from("cheer");
    let report = reconciler.reconcile(
        &snapshot(vec![soldier("1", cheer.clone())]),
        &catalog,
        &mut surface,
    );

    assert_eq!(report.replayed, 0);
    assert!(surface.calls().is_empty());
    assert_eq!(
        reconciler.entity(&UnitId::from("1")).unwrap().current_action,
        cheer
    );

    // A second identical snapshot stays quiet.
    let again = reconciler.plan(&snapshot(vec![soldier("1", cheer)]), &catalog);
    assert!(again.is_empty());
}

#[test]
fn test_action_without_animation_recreates_static_sprite() {
    // Only the walk strip exists: no idle to fall back on.
    let mut builder = AnimationCatalog::builder();
    builder
        .sheet(SpriteSheet {
            kind: UnitKind::Soldier,
            texture: "soldier.png".to_string(),
            frame_width: 115,
            frame_height: 95,
        })
        .unwrap()
        .animation(
            UnitKind::Soldier,
            UnitAction::Walk,
            AnimationDef {
                key: "soldier_walk".to_string(),
                frame_start: 0,
                frame_end: 3,
                frame_rate: 10.0,
                looping: true,
            },
        )
        .unwrap();
    let catalog = builder.build();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();
    reconciler.reconcile(
        &snapshot(vec![soldier("7", UnitAction::Walk)]),
        &catalog,
        &mut surface,
    );
    let old = reconciler.entity(&UnitId::from("7")).unwrap().handle;
    assert_eq!(surface.playing(old), Some("soldier_walk"));

    let report = reconciler.reconcile(
        &snapshot(vec![soldier("7", UnitAction::Attack)]),
        &catalog,
        &mut surface,
    );

    assert_eq!(report.retired, 1);
    assert_eq!(report.spawned, 1);
    assert!(report.failures.is_empty());
    assert!(!surface.is_live(old));
    let entity = reconciler.entity(&UnitId::from("7")).unwrap();
    assert_eq!(entity.current_action, UnitAction::Attack);
    assert_eq!(entity.current_animation, None);
    assert_eq!(surface.playing(entity.handle), None);
    assert_eq!((entity.x, entity.y), (10.0, 20.0));

    // Already static: the same snapshot again changes nothing.
    let again = reconciler.plan(&snapshot(vec![soldier("7", UnitAction::Attack)]), &catalog);
    assert!(again.is_empty());
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

#[test]
fn test_position_change_moves_without_replay() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();
    reconciler.reconcile(
        &snapshot(vec![soldier("1", UnitAction::Walk)]),
        &catalog,
        &mut surface,
    );
    let handle = reconciler.entity(&UnitId::from("1")).unwrap().handle;
    surface.take_calls();

    let report = reconciler.reconcile(
        &snapshot(vec![unit("1", UnitKind::Soldier, 42.0, 7.5, UnitAction::Walk)]),
        &catalog,
        &mut surface,
    );

    assert_eq!(report.moved, 1);
    assert_eq!(report.replayed, 0);
    assert_eq!(
        surface.take_calls(),
        vec![SurfaceCall::Move {
            handle,
            x: 42.0,
            y: 7.5,
        }]
    );
    let entity = reconciler.entity(&UnitId::from("1")).unwrap();
    assert_eq!((entity.x, entity.y), (42.0, 7.5));
}

#[test]
fn test_kind_change_recreates_sprite() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();
    reconciler.reconcile(
        &snapshot(vec![soldier("1", UnitAction::Walk)]),
        &catalog,
        &mut surface,
    );
    let old = reconciler.entity(&UnitId::from("1")).unwrap().handle;
    surface.take_calls();

    let report = reconciler.reconcile(
        &snapshot(vec![unit("1", UnitKind::Cavalry, 10.0, 20.0, UnitAction::Walk)]),
        &catalog,
        &mut surface,
    );

    assert_eq!(report.retired, 1);
    assert_eq!(report.spawned, 1);
    let entity = reconciler.entity(&UnitId::from("1")).unwrap();
    assert_ne!(entity.handle, old);
    assert_eq!(entity.kind, UnitKind::Cavalry);
    assert!(!surface.is_live(old));
    assert_eq!(surface.kind_of(entity.handle), Some(&UnitKind::Cavalry));
    assert_eq!(surface.playing(entity.handle), Some("cavalry_walk"));
}

#[test]
fn test_plan_orders_retires_then_spawns_then_updates() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();
    reconciler.reconcile(
        &snapshot(vec![soldier("b", UnitAction::Walk), soldier("c", UnitAction::Walk)]),
        &catalog,
        &mut surface,
    );

    let plan = reconciler.plan(
        &snapshot(vec![
            soldier("c", UnitAction::Attack),
            soldier("a", UnitAction::Walk),
        ]),
        &catalog,
    );

    let kinds: Vec<(&str, &str)> = plan
        .ops
        .iter()
        .map(|op| {
            let tag = match op {
                SceneOp::Retire { .. } => "retire",
                SceneOp::Spawn { .. } => "spawn",
                SceneOp::Replay { .. } => "replay",
                SceneOp::Move { .. } => "move",
            };
            (tag, op.id().as_str())
        })
        .collect();
    assert_eq!(kinds, vec![("retire", "b"), ("spawn", "a"), ("replay", "c")]);
    assert_eq!(plan.retires(), 1);
    assert_eq!(plan.spawns(), 1);
}

// ---------------------------------------------------------------------------
// Surface failures
// ---------------------------------------------------------------------------

#[test]
fn test_failed_spawn_is_skipped_then_retried() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    surface.fail_assets_for(UnitKind::Archer);
    let mut reconciler = SceneReconciler::new();
    let snap = snapshot(vec![
        soldier("1", UnitAction::Walk),
        unit("2", UnitKind::Archer, 0.0, 0.0, UnitAction::Walk),
    ]);

    let report = reconciler.reconcile(&snap, &catalog, &mut surface);
    assert_eq!(report.spawned, 1);
    assert_eq!(
        report.failures,
        vec![EntityFailure {
            id: UnitId::from("2"),
            error: SurfaceError::AssetMissing(UnitKind::Archer),
        }]
    );
    assert_eq!(rendered_ids(&reconciler), vec!["1"]);

    surface.restore_assets_for(&UnitKind::Archer);
    let report = reconciler.reconcile(&snap, &catalog, &mut surface);
    assert_eq!(report.spawned, 1);
    assert!(report.failures.is_empty());
    assert_eq!(rendered_ids(&reconciler), vec!["1", "2"]);
}

#[test]
fn test_stale_handle_on_move_respawns_next_snapshot() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();
    reconciler.reconcile(
        &snapshot(vec![soldier("1", UnitAction::Walk)]),
        &catalog,
        &mut surface,
    );
    let handle = reconciler.entity(&UnitId::from("1")).unwrap().handle;
    surface.evict(handle);

    let moved = snapshot(vec![unit("1", UnitKind::Soldier, 99.0, 99.0, UnitAction::Walk)]);
    let report = reconciler.reconcile(&moved, &catalog, &mut surface);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0].error, SurfaceError::StaleHandle(_)));
    assert!(reconciler.is_empty());

    let report = reconciler.reconcile(&moved, &catalog, &mut surface);
    assert_eq!(report.spawned, 1);
    assert_eq!(surface.live_count(), 1);
}

#[test]
fn test_stale_handle_on_retire_drops_entry() {
    let catalog = catalog();
    let mut surface = mounted(&catalog);
    let mut reconciler = SceneReconciler::new();
    reconciler.reconcile(
        &snapshot(vec![soldier("1", UnitAction::Walk)]),
        &catalog,
        &mut surface,
    );
    let handle = reconciler.entity(&UnitId::from("1")).unwrap().handle;
    surface.evict(handle);

    let report = reconciler.reconcile(&GameSnapshot::empty(), &catalog, &mut surface);

    assert_eq!(report.retired, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(reconciler.is_empty());
}

#[test]
fn test_undefined_key_spawns_without_animation() {
    let catalog = catalog();
    // Nothing defined: every play_animation is rejected.
    let mut surface = RecordingSurface::new();
    let mut reconciler = SceneReconciler::new();

    let report = reconciler.reconcile(
        &snapshot(vec![soldier("1", UnitAction::Walk)]),
        &catalog,
        &mut surface,
    );

    assert_eq!(report.spawned, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0].error,
        SurfaceError::UnknownAnimationKey(_)
    ));
    let entity = reconciler.entity(&UnitId::from("1")).unwrap();
    assert_eq!(entity.current_animation, None);
    assert_eq!(surface.live_count(), 1);
}
