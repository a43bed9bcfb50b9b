//! core algorithms and wire data model for Skylink

pub mod counter;
pub mod framing;
pub mod manifest;

pub use counter::expand;
pub use framing::{Deframer, FrameError, FRAME_OVERHEAD, MAX_FRAME_PAYLOAD};
pub use manifest::{FileManifest, ManifestError, METADATA_FRAME_BYTES};
