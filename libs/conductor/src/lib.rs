//! Pacing engine: turns a pre-loaded record sequence into a timed async
//! stream, plus the slice operator used to cap a run.

use std::pin::Pin;

use futures::Stream;
use serde::Deserialize;

use datacat_api::{Record, RecordSequence};

pub mod error;
mod fixed;
mod original;
mod slice;

pub use error::ConductorError;
pub use fixed::FixedRateConductor;
pub use original::{OriginalRateConductor, PacingState, record_instant, sleep_time};
pub use slice::{Slice, SliceExt, SliceSpec};

/// Paced, single-pass, pull-based stream of records.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record, ConductorError>> + Send>>;

/// Controls when each record of a sequence is handed to the consumer.
///
/// Records are produced only on demand; a pacing delay suspends the
/// calling task, never the process.
pub trait Conductor: Send + Sync {
    fn kind(&self) -> &'static str;

    fn conduct(&self, data: RecordSequence) -> RecordStream;
}

// ═══════════════════════════════════════════════════════════════
//  Pacing Policy
// ═══════════════════════════════════════════════════════════════

/// How the delay between two records is computed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum PacingPolicy {
    /// Constant throughput, records per second.
    Rate { rate: f64 },
    /// Replay the gaps between the instants stored in `field`.
    Original {
        field: String,
        /// strftime layout. Without it: RFC 3339 / ISO 8601.
        #[serde(default)]
        format: Option<String>,
    },
}

/// Build the conductor for a policy. An invalid rate is rejected here,
/// not at run time.
pub fn build(policy: &PacingPolicy, debug: bool) -> Result<Box<dyn Conductor>, ConductorError> {
    match policy {
        PacingPolicy::Rate { rate } => Ok(Box::new(FixedRateConductor::new(*rate)?.with_debug(debug))),
        PacingPolicy::Original { field, format } => Ok(Box::new(
            OriginalRateConductor::new(field.clone(), format.clone()).with_debug(debug),
        )),
    }
}

/// Per-record pacing trace. `debug` promotes it from trace to info.
pub(crate) fn log_pacing(debug: bool, conductor: &'static str, index: usize, sleep: std::time::Duration) {
    if debug {
        tracing::info!(conductor, index, sleep_us = sleep.as_micros() as u64, "paced record");
    } else {
        tracing::trace!(conductor, index, sleep_us = sleep.as_micros() as u64, "paced record");
    }
}
