//! Provenance records for compile attempts
//!
//! One [`RunManifest`] is produced per compile attempt and persisted through a
//! write-once [`ManifestStore`].

mod builder;
mod model;
mod store;

pub use builder::ManifestBuilder;
pub use model::{
    CompileStatus, DetectionRecord, MANIFEST_SCHEMA_VERSION, RequestEcho, RunManifest, RunMetrics,
    TemplateRef, UNAVAILABLE,
};
pub use store::{FsManifestStore, InMemoryManifestStore, ManifestStore};
