//! Per-call deadline and cancellation.
//!
//! A [`CallContext`] is checked at two points in a detection call: once the
//! camera frame has arrived, and between ground removal and clustering. The
//! inner distance loops never poll it.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use obstacles_pointcloud::context::{CallContext, Stage};
//!
//! let ctx = CallContext::new().with_timeout(Duration::from_secs(1));
//! assert!(ctx.checkpoint(Stage::Acquisition).is_ok());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::perception::{PerceptionError, Result};

/// Where in a detection call a checkpoint sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// After the camera delivered (or failed to deliver) a frame.
    Acquisition,
    /// After ground removal, before clustering.
    Clustering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquisition => f.write_str("acquisition"),
            Self::Clustering => f.write_str("clustering"),
        }
    }
}

/// Caller-supplied deadline and cancel flag. The default never cancels.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancel once `flag` is set to `true` by another thread.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the flag is raised or the deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        let flagged = self
            .cancel
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Acquire));
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        flagged || expired
    }

    /// Return [`PerceptionError::Cancelled`] if the call should stop at `stage`.
    pub fn checkpoint(&self, stage: Stage) -> Result<()> {
        if self.is_cancelled() {
            return Err(PerceptionError::Cancelled { stage });
        }
        Ok(())
    }
}
