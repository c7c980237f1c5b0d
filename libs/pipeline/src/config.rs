use std::path::{Path, PathBuf};

use serde::Deserialize;

use conductor::PacingPolicy;

use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Root Config
// ═══════════════════════════════════════════════════════════════

/// Конфигурация одного run'а: по одному варианту на каждую категорию
/// стадий, выбирается полем `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Максимум записей, доставляемых в sink (CLI `-n` перекрывает).
    #[serde(default)]
    pub limit: Option<usize>,
    /// Подробный лог pacing'а и доставки каждой записи.
    #[serde(default)]
    pub debug: bool,
    /// Без секции: тип определяется по расширению файла.
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub format: FormatConfig,
    pub conductor: PacingPolicy,
    #[serde(default)]
    pub timestamp: TimestampConfig,
}

impl Configuration {
    /// Загрузить конфигурацию из TOML-файла.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("cannot read config {}: {e}", path.display())))?;
        Self::parse(&content).map_err(|e| match e {
            PipelineError::Config(msg) => PipelineError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Разобрать конфигурацию из TOML-строки.
    pub fn parse(toml_str: &str) -> Result<Self, PipelineError> {
        toml::from_str(toml_str).map_err(|e| PipelineError::Config(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Source Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum SourceConfig {
    Csv {
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default = "default_delimiter")]
        delimiter: String,
        #[serde(default = "default_true")]
        quoting: bool,
        /// Числа, bool, даты → типизированные значения; иначе всё строки.
        #[serde(default = "default_true")]
        infer_types: bool,
    },
    /// Массив JSON-объектов.
    Json {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Один JSON-объект на строку.
    #[serde(alias = "jsonl")]
    Ndjson {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    Parquet {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl SourceConfig {
    pub fn path(&self) -> Option<&Path> {
        match self {
            SourceConfig::Csv { path, .. }
            | SourceConfig::Json { path }
            | SourceConfig::Ndjson { path }
            | SourceConfig::Parquet { path } => path.as_deref(),
        }
    }

    /// Вариант по умолчанию для файла данных, по расширению.
    pub fn infer(path: &Path) -> Result<Self, PipelineError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let path = Some(path.to_path_buf());
        match ext.as_str() {
            "csv" => Ok(SourceConfig::Csv {
                path,
                delimiter: default_delimiter(),
                quoting: true,
                infer_types: true,
            }),
            "tsv" => Ok(SourceConfig::Csv {
                path,
                delimiter: "\\t".into(),
                quoting: true,
                infer_types: true,
            }),
            "json" => Ok(SourceConfig::Json { path }),
            "ndjson" | "jsonl" => Ok(SourceConfig::Ndjson { path }),
            "parquet" | "pq" => Ok(SourceConfig::Parquet { path }),
            other => Err(PipelineError::Config(format!(
                "cannot infer source type from extension {other:?}; add a [source] section"
            ))),
        }
    }
}

fn default_delimiter() -> String {
    ",".into()
}
fn default_true() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════
//  Sink Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum SinkConfig {
    /// Одна запись на строку в stdout.
    #[default]
    Console,
    File {
        path: PathBuf,
        /// Дописывать в конец вместо перезаписи.
        #[serde(default)]
        append: bool,
    },
    /// TCP-клиент, одна запись на строку (`host:port`).
    Tcp { address: String },
    /// Kafka-топик, одно сообщение на запись (feature `kafka`).
    Kafka {
        /// `host:port[,host:port...]`
        bootstrap_servers: String,
        topic: String,
    },
}

// ═══════════════════════════════════════════════════════════════
//  Format (Serializer) Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum FormatConfig {
    #[default]
    Json,
    Csv {
        #[serde(default = "default_delimiter")]
        delimiter: String,
        #[serde(default = "default_true")]
        quoting: bool,
        /// Порядок колонок. Если пуст: порядок полей записи.
        #[serde(default)]
        columns: Vec<String>,
    },
}

// ═══════════════════════════════════════════════════════════════
//  Timestamp Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum TimestampConfig {
    /// Текущее время на момент отправки.
    Now {
        #[serde(default = "default_ts_field")]
        field: String,
        #[serde(default)]
        format: Option<String>,
    },
    /// `start`, `start + step`, `start + 2·step`, ...
    Synthetic {
        #[serde(default = "default_ts_field")]
        field: String,
        #[serde(default)]
        format: Option<String>,
        start: String,
        #[serde(default = "default_step_ms")]
        step_ms: u64,
    },
    /// Не ставить метку.
    #[serde(rename = "none")]
    Disabled,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        TimestampConfig::Now { field: default_ts_field(), format: None }
    }
}

fn default_ts_field() -> String {
    "timestamp".into()
}
fn default_step_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = Configuration::parse("[conductor]\ntype = \"rate\"\nrate = 2.0\n").unwrap();
        assert_eq!(cfg.limit, None);
        assert!(!cfg.debug);
        assert_eq!(cfg.source, None);
        assert_eq!(cfg.sink, SinkConfig::Console);
        assert_eq!(cfg.format, FormatConfig::Json);
        assert_eq!(cfg.conductor, PacingPolicy::Rate { rate: 2.0 });
        assert_eq!(cfg.timestamp, TimestampConfig::Now { field: "timestamp".into(), format: None });
    }

    #[test]
    fn full_config() {
        let cfg = Configuration::parse(
            r#"
            limit = 10
            debug = true

            [source]
            type = "csv"
            path = "data/trips.csv"
            delimiter = ";"

            [sink]
            type = "tcp"
            address = "127.0.0.1:9000"

            [format]
            type = "csv"
            columns = ["id", "timestamp"]

            [conductor]
            type = "original"
            field = "pickup_at"
            format = "%Y-%m-%d %H:%M:%S"

            [timestamp]
            type = "none"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.limit, Some(10));
        assert!(cfg.debug);
        assert_eq!(
            cfg.source,
            Some(SourceConfig::Csv {
                path: Some("data/trips.csv".into()),
                delimiter: ";".into(),
                quoting: true,
                infer_types: true,
            })
        );
        assert_eq!(cfg.sink, SinkConfig::Tcp { address: "127.0.0.1:9000".into() });
        assert_eq!(
            cfg.format,
            FormatConfig::Csv { delimiter: ",".into(), quoting: true, columns: vec!["id".into(), "timestamp".into()] }
        );
        assert_eq!(cfg.timestamp, TimestampConfig::Disabled);
    }

    #[test]
    fn unknown_variant_is_a_config_error() {
        let err = Configuration::parse(
            "[conductor]\ntype = \"rate\"\nrate = 1.0\n[sink]\ntype = \"s3\"\nbucket = \"x\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("s3"), "{err}");
    }

    #[test]
    fn kafka_sink_section() {
        let cfg = Configuration::parse(
            r#"
            [conductor]
            type = "rate"
            rate = 1.0

            [sink]
            type = "kafka"
            bootstrap_servers = "broker-1:9092,broker-2:9092"
            topic = "trips"
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.sink,
            SinkConfig::Kafka { bootstrap_servers: "broker-1:9092,broker-2:9092".into(), topic: "trips".into() }
        );

        let missing_topic = "[conductor]\ntype = \"rate\"\nrate = 1.0\n[sink]\ntype = \"kafka\"\nbootstrap_servers = \"b:9092\"\n";
        assert!(matches!(Configuration::parse(missing_topic), Err(PipelineError::Config(_))));
    }

    #[test]
    fn conductor_is_required() {
        assert!(matches!(Configuration::parse("debug = true\n"), Err(PipelineError::Config(_))));
    }

    #[test]
    fn source_inferred_from_extension() {
        assert!(matches!(SourceConfig::infer(Path::new("a/b.CSV")), Ok(SourceConfig::Csv { .. })));
        assert!(matches!(SourceConfig::infer(Path::new("x.jsonl")), Ok(SourceConfig::Ndjson { .. })));
        assert!(matches!(SourceConfig::infer(Path::new("x.json")), Ok(SourceConfig::Json { .. })));
        assert!(matches!(SourceConfig::infer(Path::new("x.parquet")), Ok(SourceConfig::Parquet { .. })));
        assert!(matches!(SourceConfig::infer(Path::new("x.xlsx")), Err(PipelineError::Config(_))));
        assert!(matches!(SourceConfig::infer(Path::new("noext")), Err(PipelineError::Config(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Configuration::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read config"), "{err}");
    }
}
