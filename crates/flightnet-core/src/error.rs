//! Errors surfaced by the network engine.

use thiserror::Error;

use crate::models::NodeType;
use crate::topology::{PointId, SegmentId};

#[derive(Debug, Error)]
pub enum NetworkError {
    /// The batched elevation query failed or timed out.
    #[error("elevation service failure: {0}")]
    ElevationService(String),

    /// The elevation collaborator broke its order/length contract.
    #[error("elevation service returned {got} samples for {expected} positions")]
    ElevationCountMismatch { expected: usize, got: usize },

    #[error("unknown point {0}")]
    UnknownPoint(PointId),

    #[error("unknown segment {0}")]
    UnknownSegment(SegmentId),

    /// Only SEMAPHORE and CENTER (or WAYPOINT to clear) can mark a point.
    #[error("{0:?} cannot be used as a point marker")]
    InvalidMarker(NodeType),

    /// Drawing operation issued in the wrong drawing state.
    #[error("cannot {action} while {state}")]
    InvalidDrawingState { action: &'static str, state: &'static str },

    #[error("invalid network snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid project settings: {}", .0.join("; "))]
    InvalidSettings(Vec<String>),

    /// A newer linking/export pass started before this one finished.
    #[error("pass superseded by a newer linking/export request")]
    Superseded,
}

pub type Result<T> = std::result::Result<T, NetworkError>;
