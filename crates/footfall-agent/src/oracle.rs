//! Face analysis oracle boundary.
//!
//! The detection model is an external collaborator: something that, when
//! asked, produces zero or more raw observations for the current frame.
//! The agent never sees pixels, only observations.

use footfall_core::RawObservation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    /// The oracle cannot produce frames at all (camera gone, model
    /// failed to load). Fatal to the session.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    /// A replay source ran out of frames. Normal end of a bench run.
    #[error("input exhausted")]
    Exhausted,
    /// The oracle produced output the agent cannot parse.
    #[error("malformed oracle output: {0}")]
    Malformed(String),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// One frame's worth of analysis on demand.
///
/// An empty vector is a valid answer: the frame contained no face.
pub trait FaceOracle {
    async fn analyze(&mut self) -> Result<Vec<RawObservation>, OracleError>;
}
