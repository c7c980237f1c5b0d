use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

use datacat_api::{Record, RecordSequence, Value, time::parse_instant};

use crate::{Conductor, ConductorError, RecordStream, log_pacing};

/// Reproduces the original gaps between records, read from a time field.
///
/// Drift correction is local: each step only subtracts the time spent
/// since the previous yield, never the accumulated drift of the run.
#[derive(Debug, Clone)]
pub struct OriginalRateConductor {
    field: String,
    format: Option<String>,
    debug: bool,
}

/// Timestamp of the previously yielded record and the monotonic clock
/// reading taken when it was yielded. Set together, once per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingState {
    pub instant: DateTime<Utc>,
    pub clock: Instant,
}

impl OriginalRateConductor {
    pub fn new(field: impl Into<String>, format: Option<String>) -> Self {
        Self { field: field.into(), format, debug: false }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Conductor for OriginalRateConductor {
    fn kind(&self) -> &'static str {
        "original"
    }

    fn conduct(&self, data: RecordSequence) -> RecordStream {
        let field = self.field.clone();
        let format = self.format.clone();
        let debug = self.debug;

        Box::pin(async_stream::stream! {
            let mut state: Option<PacingState> = None;

            for (index, record) in data.into_iter().enumerate() {
                let instant = match record_instant(&record, &field, format.as_deref(), index) {
                    Ok(instant) => instant,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let (clock, slept) = match state {
                    // First record goes out immediately.
                    None => (Instant::now(), Duration::ZERO),
                    Some(prev) => {
                        let now = Instant::now();
                        let expected = instant - prev.instant;
                        let elapsed = now - prev.clock;
                        let sleep = sleep_time(expected, elapsed);
                        log_drift(debug, index, expected, elapsed);
                        if sleep.is_zero() {
                            (now, sleep)
                        } else {
                            tokio::time::sleep(sleep).await;
                            (Instant::now(), sleep)
                        }
                    }
                };

                log_pacing(debug, "original", index, slept);
                state = Some(PacingState { instant, clock });
                yield Ok::<_, ConductorError>(record);
            }
        })
    }
}

fn log_drift(debug: bool, index: usize, expected: TimeDelta, elapsed: Duration) {
    let expected_us = expected.num_microseconds().unwrap_or(i64::MAX);
    let elapsed_us = elapsed.as_micros() as u64;
    if debug {
        tracing::info!(index, expected_us, elapsed_us, "original gap");
    } else {
        tracing::trace!(index, expected_us, elapsed_us, "original gap");
    }
}

/// `max(0, expected − elapsed)`, both rounded to the nearest microsecond.
///
/// A negative `expected` (record earlier than its predecessor) gives zero.
pub fn sleep_time(expected: TimeDelta, elapsed: Duration) -> Duration {
    let expected_us = match expected.num_nanoseconds() {
        Some(ns) => round_div(ns as i128, 1_000),
        // beyond ±292 years in nanoseconds
        None => expected.num_microseconds().map_or(
            if expected > TimeDelta::zero() { i64::MAX as i128 } else { i64::MIN as i128 },
            |us| us as i128,
        ),
    };
    let elapsed_us = round_div(elapsed.as_nanos() as i128, 1_000);

    let sleep_us = expected_us - elapsed_us;
    if sleep_us <= 0 {
        Duration::ZERO
    } else {
        Duration::from_micros(u64::try_from(sleep_us).unwrap_or(u64::MAX))
    }
}

/// Round half away from zero.
fn round_div(n: i128, d: i128) -> i128 {
    if n >= 0 { (n + d / 2) / d } else { -((-n + d / 2) / d) }
}

/// Extract and parse the timing value of one record.
///
/// Accepts either an already parsed instant or text; numbers are accepted
/// only with an explicit `format` (e.g. `%s`).
pub fn record_instant(
    record: &Record,
    field: &str,
    format: Option<&str>,
    index: usize,
) -> Result<DateTime<Utc>, ConductorError> {
    let value = record
        .get(field)
        .ok_or_else(|| ConductorError::MissingField { field: field.to_string(), index })?;

    let parse = |raw: String| {
        parse_instant(&raw, format).map_err(|e| ConductorError::Timestamp {
            field: field.to_string(),
            raw,
            reason: e.to_string(),
        })
    };

    match value {
        Value::Timestamp(ts) => Ok(*ts),
        Value::String(s) => parse(s.clone()),
        Value::Int64(_) | Value::Float64(_) if format.is_some() => parse(value.to_string()),
        Value::Int64(_) | Value::Float64(_) => Err(ConductorError::Timestamp {
            field: field.to_string(),
            raw: value.to_string(),
            reason: "numeric timestamps need an explicit format (e.g. \"%s\")".into(),
        }),
        other => Err(ConductorError::Timestamp {
            field: field.to_string(),
            raw: other.to_string(),
            reason: format!("unsupported value type {}", other.type_name()),
        }),
    }
}
