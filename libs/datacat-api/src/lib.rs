use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

pub mod error;
pub mod record;
pub mod time;
pub mod value;

pub use error::StageError;
pub use record::{Record, RecordSequence};
pub use value::Value;

/// Транспортное представление одной записи (без разделителя строк).
pub type Payload = Vec<u8>;

// ════════════════════════════════════════════════════════════════
//  Stage Traits
// ════════════════════════════════════════════════════════════════

/// Source: загружает весь набор записей в память.
///
/// Вызывается один раз, синхронно, до начала pacing'а.
pub trait Source: Send {
    /// Короткое имя варианта (для логов).
    fn kind(&self) -> &'static str;

    /// Загрузить все записи. Ошибка I/O или формата: фатальна для run'а.
    fn load(&mut self) -> Result<RecordSequence, StageError>;
}

/// Serializer: Record → транспортное представление.
///
/// Не приостанавливается. Несериализуемое значение: фатальная ошибка.
pub trait Serializer: Send {
    fn kind(&self) -> &'static str;

    fn serialize(&self, record: &Record) -> Result<Payload, StageError>;
}

/// Timestamper: источник метки времени для каждой отправляемой записи.
///
/// Вызывается один раз на запись, не приостанавливается и не падает.
/// `None`: «не ставить метку», это не ошибка.
pub trait Timestamper: Send {
    fn kind(&self) -> &'static str;

    /// Поле, в которое записывается метка (перезаписывает существующее).
    fn field_name(&self) -> &str;

    fn timestamp(&mut self) -> Option<DateTime<Utc>>;

    /// Значение, которое попадёт в запись. По умолчанию: сам instant.
    fn stamp_value(&self, ts: DateTime<Utc>) -> Value {
        Value::Timestamp(ts)
    }
}

/// Sink: получатель сериализованных записей (console, file, TCP, ...).
///
/// `output()` может приостанавливаться (сетевой I/O). `init()` / `teardown()`
/// вызываются оркестратором ровно один раз до и после run'а; `teardown()`
/// вызывается даже если run завершился ошибкой.
pub trait Sink: Send {
    fn kind(&self) -> &'static str;

    fn init(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    /// Доставить одну запись. Возврат = подтверждение доставки.
    fn output<'a>(
        &'a mut self,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>>;

    fn teardown(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
