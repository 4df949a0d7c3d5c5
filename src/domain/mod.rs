//! Domain layer types and invariants.

pub mod projects;

pub use projects::{
    CacheSnapshot, Credit, Dimensions, ImageRef, MediaItem, MediaKind, ProjectManifest,
    ProjectRecord,
};
