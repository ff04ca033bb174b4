//! High-level entry points tying the engine together: feed a trajectory
//! through detection, classification and accumulation, and hand back the
//! finalized statistics.

pub mod cluster;

pub use cluster::{FrameSource, InMemoryTrajectory, run};
