use datacat_api::{Payload, Record, Serializer, StageError, Value};

use crate::PipelineError;
use crate::config::FormatConfig;
use crate::source::parse_delimiter;

pub fn build(config: &FormatConfig) -> Result<Box<dyn Serializer>, PipelineError> {
    match config {
        FormatConfig::Json => Ok(Box::new(JsonSerializer)),
        FormatConfig::Csv { delimiter, quoting, columns } => {
            let delimiter = parse_delimiter(delimiter).map_err(PipelineError::stage("serializer"))?;
            Ok(Box::new(CsvSerializer { delimiter, quoting: *quoting, columns: columns.clone() }))
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  JsonSerializer
// ═══════════════════════════════════════════════════════════════

/// Компактный JSON-объект, поля в порядке записи.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn kind(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, record: &Record) -> Result<Payload, StageError> {
        Ok(serde_json::to_vec(record)?)
    }
}

// ═══════════════════════════════════════════════════════════════
//  CsvSerializer
// ═══════════════════════════════════════════════════════════════

/// Одна CSV-строка на запись, без заголовка.
#[derive(Debug, Clone)]
pub struct CsvSerializer {
    delimiter: char,
    quoting: bool,
    /// Порядок колонок. Если пуст: порядок полей записи.
    columns: Vec<String>,
}

impl CsvSerializer {
    pub fn new(columns: Vec<String>) -> Self {
        Self { delimiter: ',', quoting: true, columns }
    }

    /// Без кавычек перевод строки разорвал бы запись на две строки sink'а.
    fn push_text(&self, out: &mut String, field: &str, s: &str) -> Result<(), StageError> {
        let breaks_line = s.contains(['\n', '\r']);
        if !self.quoting {
            if breaks_line {
                return Err(StageError::Format(format!(
                    "field {field:?}: line break in an unquoted CSV value"
                )));
            }
            out.push_str(s);
        } else if breaks_line || s.contains(self.delimiter) || s.contains('"') {
            out.push('"');
            out.push_str(&s.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(s);
        }
        Ok(())
    }

    fn push_value(&self, out: &mut String, field: &str, value: &Value) -> Result<(), StageError> {
        match value {
            Value::Null => {}
            Value::String(s) => self.push_text(out, field, s)?,
            Value::Float64(n) if !n.is_finite() => {
                return Err(StageError::Format(format!("field {field:?}: non-finite float {n}")));
            }
            Value::List(_) | Value::Map(_) => {
                let json = serde_json::to_string(value)
                    .map_err(|e| StageError::from(e).at(format!("field {field:?}")))?;
                self.push_text(out, field, &json)?;
            }
            other => self.push_text(out, field, &other.to_string())?,
        }
        Ok(())
    }
}

impl Serializer for CsvSerializer {
    fn kind(&self) -> &'static str {
        "csv"
    }

    fn serialize(&self, record: &Record) -> Result<Payload, StageError> {
        let mut out = String::new();
        if self.columns.is_empty() {
            for (i, (field, value)) in record.iter().enumerate() {
                if i > 0 {
                    out.push(self.delimiter);
                }
                self.push_value(&mut out, field, value)?;
            }
        } else {
            for (i, field) in self.columns.iter().enumerate() {
                if i > 0 {
                    out.push(self.delimiter);
                }
                if let Some(value) = record.get(field) {
                    self.push_value(&mut out, field, value)?;
                }
            }
        }
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn sample() -> Record {
        let mut record = Record::new();
        record.insert("id", 7i64);
        record.insert("name", "a,b \"q\"");
        record.insert("score", 1.5);
        record.insert("missing", Value::Null);
        record.insert("at", Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap());
        record
    }

    #[test]
    fn json_keeps_field_order_and_formats_instants() {
        let bytes = JsonSerializer.serialize(&sample()).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"id":7,"name":"a,b \"q\"","score":1.5,"missing":null,"at":"2024-05-06T07:08:09.000000Z"}"#
        );
    }

    #[test]
    fn json_rejects_non_finite_floats() {
        let record: Record = [("x", f64::NAN)].into_iter().collect();
        let err = JsonSerializer.serialize(&record).unwrap_err();
        assert!(matches!(err, StageError::Format(_)), "{err:?}");
    }

    #[test]
    fn csv_record_order_with_quoting() {
        let bytes = CsvSerializer::new(Vec::new()).serialize(&sample()).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "7,\"a,b \"\"q\"\"\",1.5,,2024-05-06T07:08:09.000000Z"
        );
    }

    #[test]
    fn csv_explicit_columns() {
        let ser = CsvSerializer::new(vec!["at".into(), "nope".into(), "id".into()]);
        let bytes = ser.serialize(&sample()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "2024-05-06T07:08:09.000000Z,,7");
    }

    #[test]
    fn csv_nested_values_as_json() {
        let record: Record = [("tags", Value::List(vec!["a".into(), "b".into()]))].into_iter().collect();
        let bytes = CsvSerializer::new(Vec::new()).serialize(&record).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "\"[\"\"a\"\",\"\"b\"\"]\"");
    }

    #[test]
    fn csv_rejects_non_finite_floats() {
        let record: Record = [("x", f64::INFINITY)].into_iter().collect();
        assert!(CsvSerializer::new(Vec::new()).serialize(&record).is_err());
    }

    #[test]
    fn unquoted_line_break_is_rejected() {
        let record: Record = [("id", Value::from(1i64)), ("note", Value::from("x\ny"))].into_iter().collect();
        let plain = CsvSerializer { delimiter: ',', quoting: false, columns: Vec::new() };
        let err = plain.serialize(&record).unwrap_err();
        assert!(matches!(err, StageError::Format(_)), "{err:?}");
        assert!(err.to_string().contains("\"note\""), "{err}");

        let quoted = CsvSerializer::new(Vec::new()).serialize(&record).unwrap();
        assert_eq!(String::from_utf8(quoted).unwrap(), "1,\"x\ny\"");
    }

    #[test]
    fn unquoted_keeps_plain_text() {
        let record: Record = [("a", "p\"q"), ("b", "r")].into_iter().collect();
        let plain = CsvSerializer { delimiter: ';', quoting: false, columns: Vec::new() };
        assert_eq!(String::from_utf8(plain.serialize(&record).unwrap()).unwrap(), "p\"q;r");
    }

    #[test]
    fn build_validates_delimiter() {
        let bad = FormatConfig::Csv { delimiter: "ab".into(), quoting: true, columns: Vec::new() };
        assert!(matches!(build(&bad), Err(PipelineError::Stage { source: StageError::Config(_), .. })));
        assert_eq!(build(&FormatConfig::Json).unwrap().kind(), "json");
    }
}
