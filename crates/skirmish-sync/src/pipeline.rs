//! The consumer end of the snapshot stream.
//!
//! [`SnapshotPipeline`] owns a catalog, a render surface and the reconciler
//! bookkeeping for that surface. It is driven from a single task: each
//! `state_update` payload is parsed and reconciled to completion before the
//! next one is looked at, so snapshots apply strictly in arrival order.

use serde_json::Value;

use crate::catalog::AnimationCatalog;
use crate::reconciler::{ApplyReport, SceneReconciler};
use crate::snapshot::{GameSnapshot, MalformedSnapshot, parse_snapshot};
use crate::surface::{RenderSurface, SurfaceError};

/// Snapshot-to-scene pipeline bound to one render surface.
pub struct SnapshotPipeline<S: RenderSurface> {
    catalog: AnimationCatalog,
    surface: S,
    reconciler: SceneReconciler<S::Handle>,
    mounted: bool,
    applied: u64,
}

impl<S: RenderSurface> SnapshotPipeline<S> {
    /// Creates an unmounted pipeline with an empty scene.
    pub fn new(catalog: AnimationCatalog, surface: S) -> Self {
        Self {
            catalog,
            surface,
            reconciler: SceneReconciler::new(),
            mounted: false,
            applied: 0,
        }
    }

    /// Registers every catalog animation with the surface. Calling it again
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first [`SurfaceError`] the surface reports.
    pub fn mount(&mut self) -> Result<(), SurfaceError> {
        if self.mounted {
            return Ok(());
        }
        let defs = self.catalog.animations();
        for def in &defs {
            self.surface.define_animation(def)?;
        }
        tracing::info!(animations = defs.len(), "animations registered with surface");
        self.mounted = true;
        Ok(())
    }

    /// Returns `true` between [`mount`](Self::mount) and
    /// [`unmount`](Self::unmount).
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Parses a raw `state_update` payload and reconciles the scene to it.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedSnapshot`] if the payload does not parse. The
    /// previous scene is left exactly as it was.
    pub fn on_state_update(&mut self, payload: &Value) -> Result<ApplyReport, MalformedSnapshot> {
        match parse_snapshot(payload) {
            Ok(snapshot) => Ok(self.apply_snapshot(&snapshot)),
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed snapshot");
                Err(err)
            }
        }
    }

    /// Reconciles the scene to an already-parsed snapshot.
    pub fn apply_snapshot(&mut self, snapshot: &GameSnapshot) -> ApplyReport {
        let report = self
            .reconciler
            .reconcile(snapshot, &self.catalog, &mut self.surface);
        self.applied += 1;
        if !report.is_noop() {
            tracing::debug!(
                units = snapshot.len(),
                retired = report.retired,
                spawned = report.spawned,
                replayed = report.replayed,
                moved = report.moved,
                failures = report.failures.len(),
                "snapshot applied"
            );
        }
        report
    }

    /// Treats a lost connection as an empty snapshot: every sprite goes.
    pub fn on_disconnect(&mut self) -> ApplyReport {
        let report = self.reconciler.retire_all(&mut self.surface);
        tracing::info!(retired = report.retired, "scene cleared after disconnect");
        report
    }

    /// Disposes every sprite and marks the pipeline unmounted.
    pub fn unmount(&mut self) -> ApplyReport {
        let report = self.reconciler.retire_all(&mut self.surface);
        self.mounted = false;
        report
    }

    /// Number of snapshots applied so far. Malformed payloads are not counted.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// The animation catalog.
    pub fn catalog(&self) -> &AnimationCatalog {
        &self.catalog
    }

    /// The render surface.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutable access to the surface, e.g. to advance its animation clock.
    /// Sprites must not be created or destroyed through it.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// The reconciler bookkeeping.
    pub fn reconciler(&self) -> &SceneReconciler<S::Handle> {
        &self.reconciler
    }
}
