use std::path::{Path, PathBuf};

use datacat_api::time::{looks_like_instant, parse_instant};
use datacat_api::{Record, RecordSequence, Source, StageError, Value};

use crate::PipelineError;
use crate::config::SourceConfig;

/// Source для run'а. `path_override` (аргумент CLI) важнее пути из
/// конфига; без секции `[source]` вариант определяется по расширению.
pub fn build(config: Option<&SourceConfig>, path_override: Option<&Path>) -> Result<Box<dyn Source>, PipelineError> {
    let config = match (config, path_override) {
        (Some(cfg), _) => cfg.clone(),
        (None, Some(path)) => SourceConfig::infer(path)?,
        (None, None) => return Err(PipelineError::Config("no data path given and no [source] section".into())),
    };
    let path = path_override
        .or(config.path())
        .map(Path::to_path_buf)
        .ok_or_else(|| PipelineError::Config("source path is not set".into()))?;

    match config {
        SourceConfig::Csv { delimiter, quoting, infer_types, .. } => {
            let delimiter = parse_delimiter(&delimiter).map_err(PipelineError::stage("source"))?;
            Ok(Box::new(CsvSource { path, delimiter, quoting, infer_types }))
        }
        SourceConfig::Json { .. } => Ok(Box::new(JsonSource { path, lines: false })),
        SourceConfig::Ndjson { .. } => Ok(Box::new(JsonSource { path, lines: true })),
        #[cfg(feature = "parquet")]
        SourceConfig::Parquet { .. } => Ok(Box::new(parquet_source::ParquetSource { path })),
        #[cfg(not(feature = "parquet"))]
        SourceConfig::Parquet { .. } => Err(PipelineError::Config(
            "parquet support is not compiled in (enable the `parquet` feature)".into(),
        )),
    }
}

fn read_text(path: &Path) -> Result<String, StageError> {
    std::fs::read_to_string(path).map_err(StageError::io_at(path.display()))
}

// ═══════════════════════════════════════════════════════════════
//  CSV
// ═══════════════════════════════════════════════════════════════

/// CSV с заголовком. Первая строка: имена колонок.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    delimiter: char,
    quoting: bool,
    infer_types: bool,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), delimiter: ',', quoting: true, infer_types: true }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_infer_types(mut self, infer_types: bool) -> Self {
        self.infer_types = infer_types;
        self
    }

    /// Разобрать уже прочитанный текст.
    pub fn parse(&self, text: &str) -> Result<RecordSequence, StageError> {
        let rows = parse_rows(text, self.delimiter, self.quoting)?;
        let mut rows = rows.into_iter();
        let Some((_, header)) = rows.next() else {
            return Ok(Vec::new());
        };
        let columns = ColumnMap::from_header(&header);

        let mut records = Vec::new();
        for (line, fields) in rows {
            if fields.len() > columns.names.len() {
                tracing::debug!(line, fields = fields.len(), columns = columns.names.len(), "csv row wider than header");
            }
            let width = fields.len().max(columns.names.len());
            let mut fields = fields.into_iter();
            let mut record = Record::with_capacity(width);
            for i in 0..width {
                let value = match fields.next() {
                    Some(raw) if self.infer_types => infer_value(raw),
                    Some(raw) => Value::String(raw),
                    None => Value::Null,
                };
                record.insert(columns.name(i), value);
            }
            records.push(record);
        }
        Ok(records)
    }
}

impl Source for CsvSource {
    fn kind(&self) -> &'static str {
        "csv"
    }

    fn load(&mut self) -> Result<RecordSequence, StageError> {
        let text = read_text(&self.path)?;
        self.parse(&text).map_err(|e| e.at(self.path.display()))
    }
}

struct ColumnMap {
    names: Vec<String>,
}

impl ColumnMap {
    /// Имена колонок из строки заголовка. Пустое имя → `col{i}`.
    fn from_header(fields: &[String]) -> Self {
        let names = fields
            .iter()
            .enumerate()
            .map(|(i, f)| match f.trim() {
                "" => format!("col{i}"),
                name => name.to_string(),
            })
            .collect();
        Self { names }
    }

    /// Колонки сверх заголовка: col{i}.
    fn name(&self, i: usize) -> String {
        self.names.get(i).cloned().unwrap_or_else(|| format!("col{i}"))
    }
}

/// Пусто → Null, затем целое, конечное float, bool, дата-время, иначе текст.
fn infer_value(raw: String) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::Int64(n);
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        if n.is_finite() {
            return Value::Float64(n);
        }
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if looks_like_instant(trimmed) {
        if let Ok(ts) = parse_instant(trimmed, None) {
            return Value::Timestamp(ts);
        }
    }
    Value::String(raw)
}

/// RFC 4180: разбивает весь текст на строки и поля. Поле в кавычках
/// может содержать разделитель, `""` и перевод строки. Пустые строки
/// пропускаются. Возвращает номер строки (с 1) начала каждой записи.
fn parse_rows(text: &str, delimiter: char, quoting: bool) -> Result<Vec<(usize, Vec<String>)>, StageError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1usize;

    while chars.peek().is_some() {
        let start_line = line;
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut blank = true;

        loop {
            match chars.next() {
                None => {
                    fields.push(std::mem::take(&mut field));
                    break;
                }
                Some('\n') => {
                    line += 1;
                    fields.push(std::mem::take(&mut field));
                    break;
                }
                Some('\r') if chars.peek() == Some(&'\n') => {}
                Some('"') if quoting && field.is_empty() => {
                    blank = false;
                    loop {
                        match chars.next() {
                            Some('"') if chars.peek() == Some(&'"') => {
                                chars.next();
                                field.push('"');
                            }
                            Some('"') => break,
                            Some(c) => {
                                if c == '\n' {
                                    line += 1;
                                }
                                field.push(c);
                            }
                            None => {
                                return Err(StageError::Format(format!(
                                    "line {start_line}: unterminated quoted field"
                                )));
                            }
                        }
                    }
                    // мусор между закрывающей кавычкой и разделителем остаётся текстом
                }
                Some(c) if c == delimiter => {
                    blank = false;
                    fields.push(std::mem::take(&mut field));
                }
                Some(c) => {
                    blank = false;
                    field.push(c);
                }
            }
        }

        if !blank {
            rows.push((start_line, fields));
        }
    }
    Ok(rows)
}

pub(crate) fn parse_delimiter(s: &str) -> Result<char, StageError> {
    let mut chars = s.chars();
    match (s, chars.next(), chars.next()) {
        ("\\t", _, _) => Ok('\t'),
        (_, Some(c), None) if c != '"' && c != '\n' && c != '\r' => Ok(c),
        (other, _, _) => Err(StageError::Config(format!(
            "CSV: delimiter must be a single character other than quote or newline, got {other:?}"
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════
//  JSON / NDJSON
// ═══════════════════════════════════════════════════════════════

/// JSON-массив объектов или NDJSON (один объект на строку).
#[derive(Debug, Clone)]
pub struct JsonSource {
    path: PathBuf,
    lines: bool,
}

impl JsonSource {
    pub fn array(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lines: false }
    }

    pub fn lines(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lines: true }
    }

    pub fn parse(&self, text: &str) -> Result<RecordSequence, StageError> {
        if self.lines {
            let mut records = Vec::new();
            for (i, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let value: serde_json::Value =
                    serde_json::from_str(line).map_err(|e| StageError::from(e).at(format!("line {}", i + 1)))?;
                records.push(to_record(value, i)?);
            }
            Ok(records)
        } else {
            match serde_json::from_str::<serde_json::Value>(text)? {
                serde_json::Value::Array(items) => {
                    items.into_iter().enumerate().map(|(i, v)| to_record(v, i)).collect()
                }
                other => Err(StageError::Format(format!(
                    "expected a JSON array of objects, got {}",
                    json_type(&other)
                ))),
            }
        }
    }
}

impl Source for JsonSource {
    fn kind(&self) -> &'static str {
        if self.lines { "ndjson" } else { "json" }
    }

    fn load(&mut self) -> Result<RecordSequence, StageError> {
        let text = read_text(&self.path)?;
        self.parse(&text).map_err(|e| e.at(self.path.display()))
    }
}

fn to_record(value: serde_json::Value, index: usize) -> Result<Record, StageError> {
    match value {
        serde_json::Value::Object(map) => Ok(Record::from_json_map(map)),
        other => Err(StageError::Format(format!(
            "record {index}: expected an object, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ═══════════════════════════════════════════════════════════════
//  Parquet
// ═══════════════════════════════════════════════════════════════

#[cfg(feature = "parquet")]
mod parquet_source {
    use std::path::PathBuf;

    use chrono::{DateTime, NaiveDate, Utc};
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use parquet::record::Field;

    use datacat_api::{Record, RecordSequence, Source, StageError, Value};

    /// Parquet-файл, все row group'ы по порядку. Timestamp-колонки
    /// загружаются как уже разобранные instants.
    #[derive(Debug, Clone)]
    pub struct ParquetSource {
        pub(super) path: PathBuf,
    }

    impl Source for ParquetSource {
        fn kind(&self) -> &'static str {
            "parquet"
        }

        fn load(&mut self) -> Result<RecordSequence, StageError> {
            let ctx = self.path.display();
            let file = std::fs::File::open(&self.path).map_err(StageError::io_at(&ctx))?;
            let reader = SerializedFileReader::new(file).map_err(|e| parquet_err(e).at(&ctx))?;
            let rows = reader.get_row_iter(None).map_err(|e| parquet_err(e).at(&ctx))?;

            let mut records = Vec::new();
            for row in rows {
                let row = row.map_err(|e| parquet_err(e).at(&ctx))?;
                let record: Record =
                    row.get_column_iter().map(|(name, field)| (name.clone(), field_value(field))).collect();
                records.push(record);
            }
            Ok(records)
        }
    }

    fn parquet_err(e: parquet::errors::ParquetError) -> StageError {
        StageError::Format(e.to_string())
    }

    fn field_value(field: &Field) -> Value {
        match field {
            Field::Null => Value::Null,
            Field::Bool(b) => Value::Bool(*b),
            Field::Byte(n) => Value::Int64(i64::from(*n)),
            Field::Short(n) => Value::Int64(i64::from(*n)),
            Field::Int(n) => Value::Int64(i64::from(*n)),
            Field::Long(n) => Value::Int64(*n),
            Field::UByte(n) => Value::Int64(i64::from(*n)),
            Field::UShort(n) => Value::Int64(i64::from(*n)),
            Field::UInt(n) => Value::Int64(i64::from(*n)),
            Field::ULong(n) => i64::try_from(*n).map_or(Value::Float64(*n as f64), Value::Int64),
            Field::Float(n) => Value::Float64(f64::from(*n)),
            Field::Double(n) => Value::Float64(*n),
            Field::Str(s) => Value::String(s.clone()),
            Field::TimestampMillis(ms) => {
                DateTime::<Utc>::from_timestamp_millis(*ms).map_or(Value::Null, Value::Timestamp)
            }
            Field::TimestampMicros(us) => {
                DateTime::<Utc>::from_timestamp_micros(*us).map_or(Value::Null, Value::Timestamp)
            }
            Field::Date(days) => NaiveDate::from_num_days_from_ce_opt(719_163 + *days)
                .map_or(Value::Null, |d| Value::Timestamp(d.and_time(chrono::NaiveTime::MIN).and_utc())),
            Field::Group(row) => {
                Value::Map(row.get_column_iter().map(|(name, f)| (name.clone(), field_value(f))).collect())
            }
            Field::ListInternal(list) => Value::List(list.elements().iter().map(field_value).collect()),
            // decimal, байты, map
            other => Value::String(other.to_string()),
        }
    }
}
