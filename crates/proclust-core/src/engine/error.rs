use thiserror::Error;

use super::config::ConfigError;
use crate::core::models::frame::FrameError;
use crate::core::models::topology::TopologyError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Frame source failed: {0}")]
    Source(String),

    #[error("Frame source declared {expected} frames but yielded {processed}")]
    FrameCountMismatch { expected: usize, processed: usize },

    #[error("Protein {protein} was assigned a cluster twice in frame {frame}")]
    DuplicateStatus { frame: usize, protein: usize },

    #[error("Protein {protein} was never assigned a cluster in frame {frame}")]
    MissingStatus { frame: usize, protein: usize },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
