use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use conductor::{Conductor, SliceExt, SliceSpec};
use datacat_api::{RecordSequence, Serializer, Sink, Source, Timestamper};

use crate::config::{Configuration, SourceConfig};
use crate::{PipelineError, serializer, sink, source, timestamper};

/// Итог одного run'а.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Записей загружено из source.
    pub loaded: usize,
    /// Записей подтверждено sink'ом.
    pub delivered: usize,
    /// Run остановлен токеном отмены (не ошибка).
    pub cancelled: bool,
    /// От начала pacing'а до конца последней доставки.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Фактическая скорость доставки, записей в секунду.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.delivered as f64 / secs } else { 0.0 }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Pipeline
// ═══════════════════════════════════════════════════════════════

/// Один end-to-end run: Source → Conductor → Limiter → Timestamper →
/// Serializer → Sink.
///
/// Все стадии разрешаются до начала I/O. Ошибка любой стадии прерывает
/// run без повторов; `Sink::teardown()` вызывается всегда после успешного
/// `init()`.
pub struct Pipeline {
    source: Box<dyn Source>,
    conductor: Box<dyn Conductor>,
    timestamper: Box<dyn Timestamper>,
    serializer: Box<dyn Serializer>,
    sink: Box<dyn Sink>,
    limit: Option<usize>,
    debug: bool,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn Source>,
        conductor: Box<dyn Conductor>,
        timestamper: Box<dyn Timestamper>,
        serializer: Box<dyn Serializer>,
        sink: Box<dyn Sink>,
    ) -> Self {
        Self { source, conductor, timestamper, serializer, sink, limit: None, debug: false }
    }

    /// Доставить не более `limit` записей.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Выбрать по одной реализации на стадию. `path_override`: путь к
    /// данным из командной строки.
    pub fn from_config(config: &Configuration, path_override: Option<&Path>) -> Result<Self, PipelineError> {
        let data_path = path_override.or_else(|| config.source.as_ref().and_then(SourceConfig::path));
        if let Some(path) = data_path {
            if !path.exists() {
                return Err(PipelineError::Config(format!("data path not found: {}", path.display())));
            }
        }

        let source = source::build(config.source.as_ref(), path_override)?;
        let conductor = conductor::build(&config.conductor, config.debug)?;
        let timestamper = timestamper::build(&config.timestamp)?;
        let serializer = serializer::build(&config.format)?;
        let sink = sink::build(&config.sink)?;

        Ok(Self::new(source, conductor, timestamper, serializer, sink)
            .with_limit(config.limit)
            .with_debug(config.debug))
    }

    pub async fn run(mut self, token: CancellationToken) -> Result<RunSummary, PipelineError> {
        tracing::info!(
            source = self.source.kind(),
            conductor = self.conductor.kind(),
            timestamp = self.timestamper.kind(),
            format = self.serializer.kind(),
            sink = self.sink.kind(),
            limit = ?self.limit,
            "run starting"
        );

        let data = self.source.load().map_err(PipelineError::stage("source"))?;
        let loaded = data.len();
        tracing::info!(records = loaded, "source loaded");

        self.sink.init().await.map_err(PipelineError::stage("sink"))?;
        tracing::debug!(sink = self.sink.kind(), "sink initialized");

        let started = Instant::now();
        let result = self.drive(data, &token).await;
        let elapsed = started.elapsed();

        let teardown = self.sink.teardown().await.map_err(PipelineError::stage("sink"));
        tracing::debug!(sink = self.sink.kind(), ok = teardown.is_ok(), "sink torn down");

        let (delivered, cancelled) = match (result, teardown) {
            (Ok(outcome), Ok(())) => outcome,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), Err(teardown_err)) => {
                tracing::warn!(error = %teardown_err, "teardown failed after run error");
                return Err(e);
            }
            (Err(e), Ok(())) => return Err(e),
        };

        let summary = RunSummary { loaded, delivered, cancelled, elapsed };
        tracing::debug!(
            loaded,
            delivered,
            cancelled,
            elapsed_s = elapsed.as_secs_f64(),
            rate = summary.rate(),
            "run finished"
        );
        Ok(summary)
    }

    /// Возвращает `(delivered, cancelled)`.
    async fn drive(&mut self, data: RecordSequence, token: &CancellationToken) -> Result<(usize, bool), PipelineError> {
        let spec = self.limit.map_or_else(SliceSpec::default, SliceSpec::take);
        let mut records = self.conductor.conduct(data).islice(spec);
        let mut delivered = 0usize;

        loop {
            // Отмена прерывает только ожидание следующей записи,
            // но не начатую запись в sink.
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!(delivered, "run cancelled");
                    return Ok((delivered, true));
                }
                next = records.next() => next,
            };
            let Some(record) = next else {
                return Ok((delivered, false));
            };
            let mut record = record?;

            if let Some(ts) = self.timestamper.timestamp() {
                let value = self.timestamper.stamp_value(ts);
                record.insert(self.timestamper.field_name(), value);
            }

            let payload = self.serializer.serialize(&record).map_err(PipelineError::stage("serializer"))?;
            self.sink.output(&payload).await.map_err(PipelineError::stage("sink"))?;

            if self.debug {
                tracing::info!(index = delivered, bytes = payload.len(), "record delivered");
            } else {
                tracing::trace!(index = delivered, bytes = payload.len(), "record delivered");
            }
            delivered += 1;
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("source", &self.source.kind())
            .field("conductor", &self.conductor.kind())
            .field("timestamp", &self.timestamper.kind())
            .field("format", &self.serializer.kind())
            .field("sink", &self.sink.kind())
            .field("limit", &self.limit)
            .field("debug", &self.debug)
            .finish()
    }
}
