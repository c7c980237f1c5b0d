use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeDelta, Utc};

use datacat_api::{StageError, Timestamper, Value, time::parse_instant};

use crate::PipelineError;
use crate::config::TimestampConfig;

pub fn build(config: &TimestampConfig) -> Result<Box<dyn Timestamper>, PipelineError> {
    let stamper: Box<dyn Timestamper> = match config {
        TimestampConfig::Now { field, format } => {
            validate_format(format.as_deref())?;
            Box::new(NowTimestamper { field: field.clone(), format: format.clone() })
        }
        TimestampConfig::Synthetic { field, format, start, step_ms } => {
            validate_format(format.as_deref())?;
            let start = parse_instant(start, None)
                .map_err(|e| StageError::Config(format!("synthetic start {start:?}: {e}")))
                .map_err(PipelineError::stage("timestamper"))?;
            let step = i64::try_from(*step_ms)
                .ok()
                .and_then(TimeDelta::try_milliseconds)
                .ok_or_else(|| PipelineError::Config(format!("step_ms {step_ms} is out of range")))?;
            Box::new(SyntheticTimestamper::new(field.clone(), start, step).with_format(format.clone()))
        }
        TimestampConfig::Disabled => Box::new(DisabledTimestamper),
    };
    Ok(stamper)
}

/// strftime с `Item::Error` паникует при форматировании: отсекаем заранее.
fn validate_format(format: Option<&str>) -> Result<(), PipelineError> {
    match format {
        Some(fmt) if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) => {
            Err(PipelineError::Config(format!("invalid timestamp format {fmt:?}")))
        }
        _ => Ok(()),
    }
}

fn formatted(ts: DateTime<Utc>, format: Option<&str>) -> Value {
    match format {
        Some(fmt) => Value::String(ts.format(fmt).to_string()),
        None => Value::Timestamp(ts),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Variants
// ═══════════════════════════════════════════════════════════════

/// Метка = текущее время на момент отправки.
#[derive(Debug, Clone)]
pub struct NowTimestamper {
    field: String,
    format: Option<String>,
}

impl NowTimestamper {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into(), format: None }
    }
}

impl Timestamper for NowTimestamper {
    fn kind(&self) -> &'static str {
        "now"
    }

    fn field_name(&self) -> &str {
        &self.field
    }

    fn timestamp(&mut self) -> Option<DateTime<Utc>> {
        Some(datacat_api::time::now())
    }

    fn stamp_value(&self, ts: DateTime<Utc>) -> Value {
        formatted(ts, self.format.as_deref())
    }
}

/// Детерминированная последовательность: `start + k·step`.
#[derive(Debug, Clone)]
pub struct SyntheticTimestamper {
    field: String,
    format: Option<String>,
    next: DateTime<Utc>,
    step: TimeDelta,
}

impl SyntheticTimestamper {
    pub fn new(field: impl Into<String>, start: DateTime<Utc>, step: TimeDelta) -> Self {
        Self { field: field.into(), format: None, next: start, step }
    }

    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.format = format;
        self
    }
}

impl Timestamper for SyntheticTimestamper {
    fn kind(&self) -> &'static str {
        "synthetic"
    }

    fn field_name(&self) -> &str {
        &self.field
    }

    fn timestamp(&mut self) -> Option<DateTime<Utc>> {
        let current = self.next;
        // на границе диапазона chrono значение больше не растёт
        if let Some(next) = current.checked_add_signed(self.step) {
            self.next = next;
        }
        Some(current)
    }

    fn stamp_value(&self, ts: DateTime<Utc>) -> Value {
        formatted(ts, self.format.as_deref())
    }
}

/// Никогда не ставит метку.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTimestamper;

impl Timestamper for DisabledTimestamper {
    fn kind(&self) -> &'static str {
        "none"
    }

    fn field_name(&self) -> &str {
        ""
    }

    fn timestamp(&mut self) -> Option<DateTime<Utc>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn synthetic_steps_from_start() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut ts = SyntheticTimestamper::new("ts", start, TimeDelta::milliseconds(250));
        assert_eq!(ts.timestamp(), Some(start));
        assert_eq!(ts.timestamp(), Some(start + TimeDelta::milliseconds(250)));
        assert_eq!(ts.timestamp(), Some(start + TimeDelta::milliseconds(500)));
        assert_eq!(ts.field_name(), "ts");
    }

    #[test]
    fn format_turns_stamp_into_text() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap();
        let plain = SyntheticTimestamper::new("ts", start, TimeDelta::zero());
        assert_eq!(plain.stamp_value(start), Value::Timestamp(start));

        let text = plain.clone().with_format(Some("%Y%m%d-%H%M%S".into()));
        assert_eq!(text.stamp_value(start), Value::String("20240304-050607".into()));
    }

    #[test]
    fn now_is_close_to_wall_clock() {
        let mut now = NowTimestamper::new("timestamp");
        let before = Utc::now();
        let ts = now.timestamp().unwrap();
        assert!(ts >= before && ts <= Utc::now());
    }

    #[test]
    fn disabled_never_stamps() {
        assert_eq!(DisabledTimestamper.timestamp(), None);
    }

    #[test]
    fn build_validates_parameters() {
        let bad_format = TimestampConfig::Now { field: "ts".into(), format: Some("%Q".into()) };
        assert!(matches!(build(&bad_format), Err(PipelineError::Config(_))));

        let bad_start = TimestampConfig::Synthetic {
            field: "ts".into(),
            format: None,
            start: "soon".into(),
            step_ms: 10,
        };
        assert!(matches!(
            build(&bad_start),
            Err(PipelineError::Stage { stage: "timestamper", source: StageError::Config(_) })
        ));

        let ok = TimestampConfig::Synthetic {
            field: "ts".into(),
            format: None,
            start: "2024-01-01T00:00:00Z".into(),
            step_ms: 10,
        };
        assert_eq!(build(&ok).unwrap().kind(), "synthetic");
        assert_eq!(build(&TimestampConfig::Disabled).unwrap().kind(), "none");
    }
}
