use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use datacat_api::{Sink, StageError};

use crate::PipelineError;
use crate::config::SinkConfig;

type StageFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>>;

pub fn build(config: &SinkConfig) -> Result<Box<dyn Sink>, PipelineError> {
    match config {
        SinkConfig::Console => Ok(Box::new(ConsoleSink::new())),
        SinkConfig::File { path, append } => Ok(Box::new(FileSink::new(path.clone(), *append))),
        SinkConfig::Tcp { address } => {
            if address.trim().is_empty() {
                return Err(PipelineError::Config("tcp sink: address is empty".into()));
            }
            Ok(Box::new(TcpSink::new(address.clone())))
        }
        SinkConfig::Kafka { bootstrap_servers, topic } => {
            if bootstrap_servers.trim().is_empty() || topic.trim().is_empty() {
                return Err(PipelineError::Config("kafka sink: bootstrap_servers and topic are required".into()));
            }
            kafka(bootstrap_servers, topic)
        }
    }
}

#[cfg(feature = "kafka")]
fn kafka(bootstrap_servers: &str, topic: &str) -> Result<Box<dyn Sink>, PipelineError> {
    Ok(Box::new(kafka_sink::KafkaSink::new(bootstrap_servers, topic)))
}

#[cfg(not(feature = "kafka"))]
fn kafka(_bootstrap_servers: &str, _topic: &str) -> Result<Box<dyn Sink>, PipelineError> {
    Err(PipelineError::Config("kafka support is not compiled in (enable the `kafka` feature)".into()))
}

// ═══════════════════════════════════════════════════════════════
//  Line framing
// ═══════════════════════════════════════════════════════════════

/// Одна запись = одна строка: payload + `\n`. Буфер переиспользуется.
#[derive(Debug, Default)]
struct LineWriter {
    buf: Vec<u8>,
}

impl LineWriter {
    async fn write<W: AsyncWrite + Unpin>(&mut self, out: &mut W, payload: &[u8]) -> std::io::Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(payload);
        self.buf.push(b'\n');
        out.write_all(&self.buf).await
    }
}

// ═══════════════════════════════════════════════════════════════
//  ConsoleSink
// ═══════════════════════════════════════════════════════════════

/// stdout, flush после каждой записи (иначе pacing не виден в pipe).
#[derive(Debug)]
pub struct ConsoleSink {
    out: tokio::io::Stdout,
    lines: LineWriter,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { out: tokio::io::stdout(), lines: LineWriter::default() }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    fn kind(&self) -> &'static str {
        "console"
    }

    fn output<'a>(&'a mut self, payload: &'a [u8]) -> StageFuture<'a> {
        Box::pin(async move {
            self.lines.write(&mut self.out, payload).await.map_err(StageError::io_at("stdout"))?;
            self.out.flush().await.map_err(StageError::io_at("stdout"))?;
            Ok(())
        })
    }

    fn teardown(&mut self) -> StageFuture<'_> {
        Box::pin(async move { self.out.flush().await.map_err(StageError::io_at("stdout")) })
    }
}

// ═══════════════════════════════════════════════════════════════
//  FileSink
// ═══════════════════════════════════════════════════════════════

/// Файл: create/truncate или append. Буферизуется, flush: в teardown.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    append: bool,
    file: Option<BufWriter<tokio::fs::File>>,
    lines: LineWriter,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, append: bool) -> Self {
        Self { path: path.into(), append, file: None, lines: LineWriter::default() }
    }
}

impl Sink for FileSink {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn init(&mut self) -> StageFuture<'_> {
        Box::pin(async move {
            let mut options = tokio::fs::OpenOptions::new();
            options.create(true);
            if self.append {
                options.append(true);
            } else {
                options.write(true).truncate(true);
            }
            let file = options.open(&self.path).await.map_err(StageError::io_at(self.path.display()))?;
            tracing::debug!(path = %self.path.display(), append = self.append, "file sink opened");
            self.file = Some(BufWriter::new(file));
            Ok(())
        })
    }

    fn output<'a>(&'a mut self, payload: &'a [u8]) -> StageFuture<'a> {
        Box::pin(async move {
            let file = self.file.as_mut().ok_or(StageError::NotReady("file"))?;
            self.lines.write(file, payload).await.map_err(StageError::io_at(self.path.display()))
        })
    }

    fn teardown(&mut self) -> StageFuture<'_> {
        Box::pin(async move {
            if let Some(mut file) = self.file.take() {
                file.flush().await.map_err(StageError::io_at(self.path.display()))?;
            }
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  TcpSink
// ═══════════════════════════════════════════════════════════════

/// TCP-клиент: connect в init, одна запись на строку, shutdown в teardown.
#[derive(Debug)]
pub struct TcpSink {
    address: String,
    stream: Option<TcpStream>,
    lines: LineWriter,
}

impl TcpSink {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), stream: None, lines: LineWriter::default() }
    }
}

impl Sink for TcpSink {
    fn kind(&self) -> &'static str {
        "tcp"
    }

    fn init(&mut self) -> StageFuture<'_> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.address)
                .await
                .map_err(StageError::io_at(format!("connect {}", self.address)))?;
            stream.set_nodelay(true)?;
            tracing::info!(address = %self.address, "tcp sink connected");
            self.stream = Some(stream);
            Ok(())
        })
    }

    fn output<'a>(&'a mut self, payload: &'a [u8]) -> StageFuture<'a> {
        Box::pin(async move {
            let stream = self.stream.as_mut().ok_or(StageError::NotReady("tcp"))?;
            self.lines.write(stream, payload).await.map_err(StageError::io_at(&self.address))
        })
    }

    fn teardown(&mut self) -> StageFuture<'_> {
        Box::pin(async move {
            if let Some(mut stream) = self.stream.take() {
                stream.shutdown().await?;
                tracing::debug!(address = %self.address, "tcp sink closed");
            }
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaSink
// ═══════════════════════════════════════════════════════════════

#[cfg(feature = "kafka")]
mod kafka_sink {
    use std::time::Duration;

    use rdkafka::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

    use datacat_api::{Sink, StageError};

    use super::StageFuture;

    /// Ожидание брокера: метаданные в init, подтверждение записи, flush.
    const BROKER_TIMEOUT: Duration = Duration::from_secs(30);

    /// Kafka-продюсер: клиент создаётся в init, каждая запись ждёт
    /// подтверждения брокера, в teardown: flush и закрытие.
    pub struct KafkaSink {
        bootstrap_servers: String,
        topic: String,
        producer: Option<FutureProducer>,
    }

    impl KafkaSink {
        pub fn new(bootstrap_servers: impl Into<String>, topic: impl Into<String>) -> Self {
            Self { bootstrap_servers: bootstrap_servers.into(), topic: topic.into(), producer: None }
        }
    }

    impl Sink for KafkaSink {
        fn kind(&self) -> &'static str {
            "kafka"
        }

        fn init(&mut self) -> StageFuture<'_> {
            Box::pin(async move {
                let producer: FutureProducer = ClientConfig::new()
                    .set("bootstrap.servers", self.bootstrap_servers.as_str())
                    .set("enable.idempotence", "true")
                    .set("message.timeout.ms", BROKER_TIMEOUT.as_millis().to_string())
                    .create()
                    .map_err(|e| StageError::Config(format!("kafka producer: {e}")))?;

                // брокер и топик должны отвечать до первой записи
                let client = producer.clone();
                let topic = self.topic.clone();
                tokio::task::spawn_blocking(move || {
                    client.client().fetch_metadata(Some(&topic), BROKER_TIMEOUT).map(|_| ()).map_err(|e| e.to_string())
                })
                .await
                .map_err(|e| StageError::Delivery(e.to_string()))?
                .map_err(|e| StageError::Delivery(format!("{}: {e}", self.bootstrap_servers)))?;

                tracing::info!(servers = %self.bootstrap_servers, topic = %self.topic, "kafka sink connected");
                self.producer = Some(producer);
                Ok(())
            })
        }

        fn output<'a>(&'a mut self, payload: &'a [u8]) -> StageFuture<'a> {
            Box::pin(async move {
                let producer = self.producer.as_ref().ok_or(StageError::NotReady("kafka"))?;
                let record = FutureRecord::<(), [u8]>::to(&self.topic).payload(payload);
                producer
                    .send(record, BROKER_TIMEOUT)
                    .await
                    .map_err(|(e, _)| StageError::Delivery(format!("topic {}: {e}", self.topic)))?;
                Ok(())
            })
        }

        fn teardown(&mut self) -> StageFuture<'_> {
            Box::pin(async move {
                if let Some(producer) = self.producer.take() {
                    tokio::task::spawn_blocking(move || producer.flush(BROKER_TIMEOUT).map_err(|e| e.to_string()))
                        .await
                        .map_err(|e| StageError::Delivery(e.to_string()))?
                        .map_err(|e| StageError::Delivery(format!("flush: {e}")))?;
                    tracing::debug!(topic = %self.topic, "kafka sink closed");
                }
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn file_sink_truncates_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "stale\n").unwrap();

        let mut sink = FileSink::new(&path, false);
        sink.init().await.unwrap();
        sink.output(b"one").await.unwrap();
        sink.output(b"two").await.unwrap();
        sink.teardown().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");

        let mut sink = FileSink::new(&path, true);
        sink.init().await.unwrap();
        sink.output(b"three").await.unwrap();
        sink.teardown().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn file_sink_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("missing/dir/out.txt"), false);
        let err = sink.init().await.unwrap_err();
        assert!(matches!(err, StageError::Io(_)), "{err:?}");
    }

    #[tokio::test]
    async fn output_before_init_is_an_error() {
        let mut sink = FileSink::new("never-opened.txt", false);
        let err = sink.output(b"x").await.unwrap_err();
        assert!(matches!(err, StageError::NotReady("file")), "{err:?}");
    }

    #[tokio::test]
    async fn tcp_sink_writes_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            conn.read_to_string(&mut received).await.unwrap();
            received
        });

        let mut sink = TcpSink::new(address);
        sink.init().await.unwrap();
        sink.output(br#"{"id":1}"#).await.unwrap();
        sink.output(br#"{"id":2}"#).await.unwrap();
        sink.teardown().await.unwrap();

        assert_eq!(server.await.unwrap(), "{\"id\":1}\n{\"id\":2}\n");
    }

    #[tokio::test]
    async fn tcp_connect_failure_is_io() {
        // bind + drop: порт, который никто не слушает
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut sink = TcpSink::new(address);
        let err = sink.init().await.unwrap_err();
        assert!(matches!(err, StageError::Io(_)), "{err:?}");
        assert!(err.to_string().starts_with("connect "), "{err}");
    }

    #[test]
    fn build_rejects_empty_address() {
        let err = build(&SinkConfig::Tcp { address: " ".into() }).err().unwrap();
        assert!(matches!(err, PipelineError::Config(_)), "{err:?}");
        assert_eq!(build(&SinkConfig::Console).unwrap().kind(), "console");
    }

    #[test]
    fn build_kafka_sink() {
        let missing_topic = SinkConfig::Kafka { bootstrap_servers: "localhost:9092".into(), topic: "".into() };
        assert!(matches!(build(&missing_topic), Err(PipelineError::Config(_))));

        let cfg = SinkConfig::Kafka { bootstrap_servers: "localhost:9092".into(), topic: "trips".into() };
        #[cfg(feature = "kafka")]
        assert_eq!(build(&cfg).unwrap().kind(), "kafka");
        #[cfg(not(feature = "kafka"))]
        {
            let err = build(&cfg).err().unwrap();
            assert!(err.to_string().contains("`kafka` feature"), "{err}");
        }
    }

    #[cfg(feature = "kafka")]
    #[tokio::test]
    async fn kafka_output_before_init_is_an_error() {
        let mut sink = kafka_sink::KafkaSink::new("localhost:9092", "trips");
        let err = sink.output(b"x").await.unwrap_err();
        assert!(matches!(err, StageError::NotReady("kafka")), "{err:?}");
    }
}
