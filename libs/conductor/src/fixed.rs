use std::time::Duration;

use datacat_api::RecordSequence;

use crate::{Conductor, ConductorError, RecordStream, log_pacing};

/// Emits records at a constant rate (rows/s).
///
/// Before every record, the first included, the caller is suspended for
/// `1 / rate`. An exhausted sequence ends the stream without a final delay.
#[derive(Debug, Clone)]
pub struct FixedRateConductor {
    row_period: Duration,
    debug: bool,
}

impl FixedRateConductor {
    pub fn new(rows_per_s: f64) -> Result<Self, ConductorError> {
        if !rows_per_s.is_finite() || rows_per_s <= 0.0 {
            return Err(ConductorError::InvalidRate(rows_per_s));
        }
        let row_period =
            Duration::try_from_secs_f64(1.0 / rows_per_s).map_err(|_| ConductorError::InvalidRate(rows_per_s))?;
        Ok(Self { row_period, debug: false })
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn row_period(&self) -> Duration {
        self.row_period
    }
}

impl Conductor for FixedRateConductor {
    fn kind(&self) -> &'static str {
        "rate"
    }

    fn conduct(&self, data: RecordSequence) -> RecordStream {
        let period = self.row_period;
        let debug = self.debug;
        Box::pin(async_stream::stream! {
            for (index, record) in data.into_iter().enumerate() {
                tokio::time::sleep(period).await;
                log_pacing(debug, "rate", index, period);
                yield Ok::<_, ConductorError>(record);
            }
        })
    }
}
