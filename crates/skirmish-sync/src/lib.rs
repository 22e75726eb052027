//! State-to-render synchronization: snapshot parsing, the animation catalog,
//! the render surface capability, and the scene reconciler that keeps the
//! rendered sprites in agreement with the server's latest snapshot.

pub mod catalog;
pub mod pipeline;
pub mod reconciler;
pub mod snapshot;
pub mod surface;

pub use catalog::{
    AnimationCatalog, AnimationDef, CatalogBuilder, CatalogError, SpriteSheet, UnknownAnimation,
};
pub use pipeline::SnapshotPipeline;
pub use reconciler::{
    ApplyReport, EntityFailure, ReconcilePlan, RenderedEntity, SceneOp, SceneReconciler,
};
pub use snapshot::{
    GameSnapshot, MalformedSnapshot, STATE_UPDATE_EVENT, UnitAction, UnitId, UnitKind,
    UnitSnapshot, parse_snapshot,
};
pub use surface::{RecordingSurface, RenderSurface, SurfaceCall, SurfaceError};
