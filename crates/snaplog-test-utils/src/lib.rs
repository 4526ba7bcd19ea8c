//! Test helpers shared across Snaplog crates.

pub mod fixtures;
pub mod generation;

pub use fixtures::{
    JPEG_BYTES, companion, observation_json, photo, photo_at, photo_named, tagged_draft,
};
pub use generation::{FailingGenerator, RecordedCall, ScriptedGenerator};
