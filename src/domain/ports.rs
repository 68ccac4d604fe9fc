use crate::domain::model::{LookupOutcome, PostalCode};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// File access for postcode input and downloaded artifacts.
/// `write_file` returns the location written.
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn api_endpoint(&self) -> &str;
    fn output_path(&self) -> &str;
    fn batch_size(&self) -> usize;
    fn max_attempts(&self) -> u32;
    fn backoff_ms(&self) -> u64;
    fn batch_pause_ms(&self) -> u64;
    fn preview_rows(&self) -> usize;
}

/// Bulk postcode lookup. One call per batch; an `Err` means the whole batch failed.
#[async_trait]
pub trait LookupClient: Send + Sync {
    async fn lookup_batch(&self, codes: &[PostalCode]) -> Result<Vec<LookupOutcome>>;
}

#[async_trait]
impl<T: LookupClient + ?Sized> LookupClient for std::sync::Arc<T> {
    async fn lookup_batch(&self, codes: &[PostalCode]) -> Result<Vec<LookupOutcome>> {
        (**self).lookup_batch(codes).await
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Receives the human-readable status line.
pub trait StatusSink: Send + Sync {
    fn emit(&self, message: &str);
}

impl StatusSink for tokio::sync::mpsc::UnboundedSender<String> {
    fn emit(&self, message: &str) {
        // 接收端關閉時直接忽略
        let _ = self.send(message.to_string());
    }
}

/// Keeps every message in order. Handy for tests and for replaying a run.
#[derive(Debug, Default)]
pub struct StatusLog {
    messages: Mutex<Vec<String>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<String> {
        self.messages.lock().ok().and_then(|m| m.last().cloned())
    }
}

impl StatusSink for StatusLog {
    fn emit(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

impl<T: StatusSink + ?Sized> StatusSink for std::sync::Arc<T> {
    fn emit(&self, message: &str) {
        (**self).emit(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_status_log_keeps_order() {
        let log = StatusLog::new();
        assert!(log.last().is_none());

        log.emit("Fetching 1-100 of 250…");
        log.emit("Done. 250 rows.");

        assert_eq!(log.messages(), vec!["Fetching 1-100 of 250…", "Done. 250 rows."]);
        assert_eq!(log.last().as_deref(), Some("Done. 250 rows."));
    }

    #[test]
    fn test_channel_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let sink: Arc<dyn StatusSink> = Arc::new(tx);

        sink.emit("Fetching 1-1 of 1…");
        sink.emit("Done. 1 rows.");

        assert_eq!(rx.try_recv().unwrap(), "Fetching 1-1 of 1…");
        assert_eq!(rx.try_recv().unwrap(), "Done. 1 rows.");

        drop(rx);
        // closed receiver must not panic
        sink.emit("ignored");
    }

    #[test]
    fn test_tokio_sleeper_waits() {
        let started = std::time::Instant::now();
        tokio_test::block_on(TokioSleeper.sleep(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
