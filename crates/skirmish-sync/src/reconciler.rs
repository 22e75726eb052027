//! Scene reconciliation: brings the rendered scene into agreement with a new
//! snapshot using the fewest surface calls.
//!
//! [`SceneReconciler::plan`] is a pure diff of the current bookkeeping against
//! a [`GameSnapshot`]; [`SceneReconciler::apply`] executes the plan against a
//! [`RenderSurface`]. Operations are emitted in three phases:
//!
//! 1. **Retire** every id the snapshot no longer carries (ascending id order).
//! 2. **Spawn** every id the scene does not have yet (snapshot order).
//! 3. **Update** every surviving id (snapshot order): replay the animation when
//!    the action changed, move the sprite when its position changed.
//!
//! Bookkeeping changes only after the matching surface call succeeds, so the
//! entity map always describes what is actually on the surface, even if
//! application stops half way. A unit whose kind changes is retired and
//! spawned again under the same id.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::catalog::AnimationCatalog;
use crate::snapshot::{GameSnapshot, UnitAction, UnitId, UnitKind, UnitSnapshot};
use crate::surface::{RenderSurface, SurfaceError};

// ---------------------------------------------------------------------------
// Bookkeeping
// ---------------------------------------------------------------------------

/// The reconciler's record of one live sprite.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEntity<H> {
    /// Unit id from the snapshot.
    pub id: UnitId,
    /// Kind the sprite was created for.
    pub kind: UnitKind,
    /// Last applied action.
    pub current_action: UnitAction,
    /// Animation key currently playing, `None` for a static sprite.
    pub current_animation: Option<String>,
    /// Last applied x.
    pub x: f32,
    /// Last applied y.
    pub y: f32,
    /// Surface handle, valid until the entity is retired.
    pub handle: H,
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One step of a reconciliation plan.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneOp {
    /// Destroy the sprite and drop its bookkeeping entry.
    Retire {
        /// Unit to retire.
        id: UnitId,
    },
    /// Create a sprite and start its animation.
    Spawn {
        /// New unit.
        id: UnitId,
        /// Kind to create.
        kind: UnitKind,
        /// Action recorded for the unit.
        action: UnitAction,
        /// Initial x.
        x: f32,
        /// Initial y.
        y: f32,
        /// Resolved animation, `None` to create a static sprite.
        animation: Option<String>,
    },
    /// Record a new action and switch the playing animation in place.
    Replay {
        /// Unit whose action changed.
        id: UnitId,
        /// New action.
        action: UnitAction,
        /// Resolved animation, `None` if the catalog has nothing for it.
        animation: Option<String>,
    },
    /// Move the sprite.
    Move {
        /// Unit that moved.
        id: UnitId,
        /// New x.
        x: f32,
        /// New y.
        y: f32,
    },
}

impl SceneOp {
    /// The unit this operation targets.
    pub fn id(&self) -> &UnitId {
        match self {
            Self::Retire { id }
            | Self::Spawn { id, .. }
            | Self::Replay { id, .. }
            | Self::Move { id, .. } => id,
        }
    }
}

/// Ordered operations produced by [`SceneReconciler::plan`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Retires first, then spawns, then updates.
    pub ops: Vec<SceneOp>,
}

impl ReconcilePlan {
    /// Returns `true` if the scene already matches the snapshot.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Number of retire operations.
    pub fn retires(&self) -> usize {
        self.count(|op| matches!(op, SceneOp::Retire { .. }))
    }

    /// Number of spawn operations.
    pub fn spawns(&self) -> usize {
        self.count(|op| matches!(op, SceneOp::Spawn { .. }))
    }

    fn count(&self, pred: impl Fn(&SceneOp) -> bool) -> usize {
        self.ops.iter().filter(|op| pred(op)).count()
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A surface failure tied to the unit it affected.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFailure {
    /// Affected unit.
    pub id: UnitId,
    /// What the surface reported.
    pub error: SurfaceError,
}

/// Outcome of applying one plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Sprites destroyed.
    pub retired: usize,
    /// Sprites created.
    pub spawned: usize,
    /// Animations switched on existing sprites.
    pub replayed: usize,
    /// Sprites moved.
    pub moved: usize,
    /// Per-entity failures. The rest of the batch was still applied.
    pub failures: Vec<EntityFailure>,
}

impl ApplyReport {
    /// Returns `true` if nothing was changed and nothing failed.
    pub fn is_noop(&self) -> bool {
        self.retired == 0
            && self.spawned == 0
            && self.replayed == 0
            && self.moved == 0
            && self.failures.is_empty()
    }

    fn fail(&mut self, id: UnitId, error: SurfaceError) {
        tracing::warn!(unit = %id, %error, "render surface call failed");
        self.failures.push(EntityFailure { id, error });
    }
}

// ---------------------------------------------------------------------------
// SceneReconciler
// ---------------------------------------------------------------------------

/// Owns the id → sprite bookkeeping for one render surface.
pub struct SceneReconciler<H> {
    entities: BTreeMap<UnitId, RenderedEntity<H>>,
}

impl<H> Default for SceneReconciler<H> {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
        }
    }
}

impl<H: Copy + Eq + fmt::Debug> SceneReconciler<H> {
    /// Creates a reconciler with an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rendered entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if nothing is rendered.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Bookkeeping for one unit.
    pub fn entity(&self, id: &UnitId) -> Option<&RenderedEntity<H>> {
        self.entities.get(id)
    }

    /// Rendered ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &UnitId> {
        self.entities.keys()
    }

    /// All rendered entities in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = &RenderedEntity<H>> {
        self.entities.values()
    }

    /// Diffs the current scene against `snapshot`. Does not touch any surface.
    pub fn plan(&self, snapshot: &GameSnapshot, catalog: &AnimationCatalog) -> ReconcilePlan {
        let incoming: HashMap<&UnitId, &UnitSnapshot> =
            snapshot.units().iter().map(|u| (&u.id, u)).collect();
        let mut ops = Vec::new();
        let mut recreated: HashSet<&UnitId> = HashSet::new();
        let mut unanimated: HashSet<&UnitId> = HashSet::new();

        for (id, entity) in &self.entities {
            match incoming.get(id) {
                None => ops.push(SceneOp::Retire { id: id.clone() }),
                Some(unit) if unit.kind != entity.kind => {
                    tracing::debug!(
                        unit = %id,
                        from = %entity.kind,
                        to = %unit.kind,
                        "unit changed kind; recreating sprite"
                    );
                    ops.push(SceneOp::Retire { id: id.clone() });
                    recreated.insert(id);
                }
                // The surface cannot stop a strip, so a sprite whose new action
                // has no animation is recreated without one.
                Some(unit)
                    if unit.action != entity.current_action
                        && entity.current_animation.is_some()
                        && catalog.resolve(&unit.kind, &unit.action).is_err() =>
                {
                    tracing::warn!(
                        unit = %id,
                        action = %unit.action,
                        "no animation for new action; recreating as static sprite"
                    );
                    ops.push(SceneOp::Retire { id: id.clone() });
                    recreated.insert(id);
                    unanimated.insert(id);
                }
                Some(_) => {}
            }
        }

        for unit in snapshot.units() {
            if !self.entities.contains_key(&unit.id) || recreated.contains(&unit.id) {
                let animation = if unanimated.contains(&unit.id) {
                    None
                } else {
                    resolve_key(catalog, unit)
                };
                ops.push(SceneOp::Spawn {
                    id: unit.id.clone(),
                    kind: unit.kind.clone(),
                    action: unit.action.clone(),
                    x: unit.x,
                    y: unit.y,
                    animation,
                });
            }
        }

        for unit in snapshot.units() {
            let Some(entity) = self.entities.get(&unit.id) else {
                continue;
            };
            if recreated.contains(&unit.id) {
                continue;
            }
            if unit.action != entity.current_action {
                ops.push(SceneOp::Replay {
                    id: unit.id.clone(),
                    action: unit.action.clone(),
                    animation: resolve_key(catalog, unit),
                });
            }
            if (unit.x, unit.y) != (entity.x, entity.y) {
                ops.push(SceneOp::Move {
                    id: unit.id.clone(),
                    x: unit.x,
                    y: unit.y,
                });
            }
        }

        ReconcilePlan { ops }
    }

    /// Executes `plan` against `surface`, updating bookkeeping as each call
    /// succeeds. Failures are per entity and never stop the batch.
    pub fn apply<S>(&mut self, plan: ReconcilePlan, surface: &mut S) -> ApplyReport
    where
        S: RenderSurface<Handle = H>,
    {
        let mut report = ApplyReport::default();
        for op in plan.ops {
            match op {
                SceneOp::Retire { id } => self.retire(id, surface, &mut report),
                SceneOp::Spawn {
                    id,
                    kind,
                    action,
                    x,
                    y,
                    animation,
                } => self.spawn(id, kind, action, (x, y), animation, surface, &mut report),
                SceneOp::Replay {
                    id,
                    action,
                    animation,
                } => self.replay(id, action, animation, surface, &mut report),
                SceneOp::Move { id, x, y } => self.relocate(id, x, y, surface, &mut report),
            }
        }
        report
    }

    /// Plans and applies `snapshot` in one step.
    pub fn reconcile<S>(
        &mut self,
        snapshot: &GameSnapshot,
        catalog: &AnimationCatalog,
        surface: &mut S,
    ) -> ApplyReport
    where
        S: RenderSurface<Handle = H>,
    {
        let plan = self.plan(snapshot, catalog);
        self.apply(plan, surface)
    }

    /// Retires every rendered entity, as if an empty snapshot had arrived.
    pub fn retire_all<S>(&mut self, surface: &mut S) -> ApplyReport
    where
        S: RenderSurface<Handle = H>,
    {
        let ops = self
            .entities
            .keys()
            .map(|id| SceneOp::Retire { id: id.clone() })
            .collect();
        self.apply(ReconcilePlan { ops }, surface)
    }

    fn retire<S>(&mut self, id: UnitId, surface: &mut S, report: &mut ApplyReport)
    where
        S: RenderSurface<Handle = H>,
    {
        let Some(entity) = self.entities.remove(&id) else {
            return;
        };
        match surface.destroy_sprite(entity.handle) {
            Ok(()) => report.retired += 1,
            // Already gone from the surface; nothing left to track.
            Err(error @ SurfaceError::StaleHandle(_)) => report.fail(id, error),
            Err(error) => {
                // Still on screen. Keep tracking it so the next snapshot retries.
                self.entities.insert(id.clone(), entity);
                report.fail(id, error);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn<S>(
        &mut self,
        id: UnitId,
        kind: UnitKind,
        action: UnitAction,
        (x, y): (f32, f32),
        animation: Option<String>,
        surface: &mut S,
        report: &mut ApplyReport,
    ) where
        S: RenderSurface<Handle = H>,
    {
        if self.entities.contains_key(&id) {
            tracing::debug!(unit = %id, "previous sprite still live; spawn deferred");
            return;
        }
        let handle = match surface.create_sprite(x, y, &kind) {
            Ok(handle) => handle,
            Err(error) => {
                report.fail(id, error);
                return;
            }
        };
        let current_animation = match animation {
            Some(key) => match surface.play_animation(handle, &key) {
                Ok(()) => Some(key),
                Err(error) => {
                    report.fail(id.clone(), error);
                    None
                }
            },
            None => None,
        };
        self.entities.insert(
            id.clone(),
            RenderedEntity {
                id,
                kind,
                current_action: action,
                current_animation,
                x,
                y,
                handle,
            },
        );
        report.spawned += 1;
    }

    fn replay<S>(
        &mut self,
        id: UnitId,
        action: UnitAction,
        animation: Option<String>,
        surface: &mut S,
        report: &mut ApplyReport,
    ) where
        S: RenderSurface<Handle = H>,
    {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if let Some(key) = animation
            && entity.current_animation.as_deref() != Some(key.as_str())
        {
            match surface.play_animation(entity.handle, &key) {
                Ok(()) => {
                    entity.current_animation = Some(key);
                    report.replayed += 1;
                }
                Err(error) => {
                    self.drop_if_stale(&id, &error);
                    report.fail(id, error);
                    return;
                }
            }
        }
        entity.current_action = action;
    }

    fn relocate<S>(&mut self, id: UnitId, x: f32, y: f32, surface: &mut S, report: &mut ApplyReport)
    where
        S: RenderSurface<Handle = H>,
    {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        match surface.update_position(entity.handle, x, y) {
            Ok(()) => {
                entity.x = x;
                entity.y = y;
                report.moved += 1;
            }
            Err(error) => {
                self.drop_if_stale(&id, &error);
                report.fail(id, error);
            }
        }
    }

    /// Forgets an entity whose handle the surface no longer recognizes, so the
    /// next snapshot spawns it afresh.
    fn drop_if_stale(&mut self, id: &UnitId, error: &SurfaceError) {
        if matches!(error, SurfaceError::StaleHandle(_)) {
            tracing::warn!(unit = %id, "bookkeeping out of sync with surface; dropping entry");
            self.entities.remove(id);
        }
    }
}

/// Resolves the animation key for a unit, degrading to a static sprite when
/// the catalog has nothing usable.
fn resolve_key(catalog: &AnimationCatalog, unit: &UnitSnapshot) -> Option<String> {
    match catalog.resolve(&unit.kind, &unit.action) {
        Ok(def) => Some(def.key.clone()),
        Err(error) => {
            tracing::warn!(unit = %unit.id, %error, "rendering without animation");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
