//! ArenaCrop Job Model
//!
//! Defines the core data contracts for batch cropping:
//! - **Regions:** Fixed-size crop boxes in source-pixel coordinates
//! - **Drift:** Linear camera displacement measured between two frames
//! - **Jobs:** Immutable, fully-annotated units of work and their FIFO queue
//! - **Progress:** The durable per-video completion record
//! - **Metadata:** The subject table mapping videos to subject labels
//!
//! All coordinates are integer source pixels; `(0, 0)` is the top-left
//! corner of the source frame.

pub mod drift;
pub mod job;
pub mod metadata;
pub mod progress;
pub mod region;

pub use drift::*;
pub use job::*;
pub use metadata::*;
pub use progress::*;
pub use region::*;
