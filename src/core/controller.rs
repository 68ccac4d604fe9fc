use crate::core::csv_export::{artifact_file_name, to_csv, CSV_CONTENT_TYPE};
use crate::core::enricher::BatchEnricher;
use crate::core::normalizer;
use crate::core::table::{self, TableView, DEFAULT_PREVIEW_ROWS};
use crate::domain::artifact::{ArtifactStore, DownloadArtifact, MemoryArtifactStore};
use crate::domain::model::{header, EnrichedRow};
use crate::domain::ports::{LookupClient, Sleeper, StatusSink, Storage, TokioSleeper};
use crate::utils::error::Result;
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};

pub const NO_VALID_POSTCODES: &str = "No valid postcodes found.";
pub const GENERIC_FAILURE: &str = "Something went wrong while looking up postcodes. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Done,
    Failed,
}

/// Everything the surface needs to draw itself.
#[derive(Debug, Clone)]
pub struct AppState {
    pub phase: Phase,
    pub status: String,
    pub rows: Vec<EnrichedRow>,
    pub view: Option<TableView>,
    pub artifact: Option<DownloadArtifact>,
}

impl AppState {
    pub fn can_run(&self) -> bool {
        self.phase != Phase::Running
    }

    pub fn can_download(&self) -> bool {
        self.phase == Phase::Done && self.artifact.is_some()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            status: String::new(),
            rows: Vec::new(),
            view: None,
            artifact: None,
        }
    }
}

/// Forwards status lines and remembers the latest one.
struct StatusLine {
    current: Mutex<String>,
    inner: Arc<dyn StatusSink>,
}

impl StatusLine {
    fn current(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatusSink for StatusLine {
    fn emit(&self, message: &str) {
        tracing::info!("📣 {}", message);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = message.to_string();
        self.inner.emit(message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing survived normalization.
    NothingToDo,
    Completed { rows: usize, file_name: String },
    Failed,
}

/// Drives one run at a time: normalize, enrich, render, export.
pub struct Controller<L: LookupClient, S: Sleeper = TokioSleeper, A: ArtifactStore = MemoryArtifactStore> {
    enricher: BatchEnricher<L, S>,
    artifacts: A,
    status: StatusLine,
    preview_rows: usize,
    state: AppState,
}

impl<L: LookupClient, S: Sleeper> Controller<L, S, MemoryArtifactStore> {
    pub fn new(enricher: BatchEnricher<L, S>, status: Arc<dyn StatusSink>) -> Self {
        Self::with_store(enricher, MemoryArtifactStore::new(), status)
    }
}

impl<L: LookupClient, S: Sleeper, A: ArtifactStore> Controller<L, S, A> {
    pub fn with_store(enricher: BatchEnricher<L, S>, artifacts: A, status: Arc<dyn StatusSink>) -> Self {
        Self {
            enricher,
            artifacts,
            status: StatusLine {
                current: Mutex::new(String::new()),
                inner: status,
            },
            preview_rows: DEFAULT_PREVIEW_ROWS,
            state: AppState::default(),
        }
    }

    pub fn with_preview_rows(mut self, preview_rows: usize) -> Self {
        self.preview_rows = preview_rows;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Runs the whole pipeline for one block of raw input.
    ///
    /// Lookup failures do not surface as `Err`; they leave the controller in
    /// [`Phase::Failed`] with a generic status line. The detailed error is logged.
    pub async fn run(&mut self, raw_text: &str) -> RunOutcome {
        // 先釋放上一輪的檔案，再開始新的一輪
        self.discard_results();
        self.state.phase = Phase::Running;

        let codes = normalizer::parse(raw_text);
        if codes.is_empty() {
            tracing::info!("📭 No valid postcodes in input");
            self.set_status(NO_VALID_POSTCODES);
            self.state.phase = Phase::Idle;
            return RunOutcome::NothingToDo;
        }

        tracing::info!("🚀 Starting run for {} postcodes", codes.len());

        match self.enricher.enrich(&codes, &self.status).await {
            Ok(rows) => {
                let outcome = self.complete(rows);
                self.state.status = self.status.current();
                outcome
            }
            Err(e) => {
                tracing::error!("❌ Run failed: {}", e);
                tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
                self.set_status(GENERIC_FAILURE);
                self.state.phase = Phase::Failed;
                RunOutcome::Failed
            }
        }
    }

    /// Writes the current artifact through `storage`. `Ok(None)` when there is nothing to download.
    pub async fn download<St: Storage>(&self, storage: &St) -> Result<Option<String>> {
        let Some(artifact) = &self.state.artifact else {
            tracing::debug!("Download requested with no artifact; ignoring");
            return Ok(None);
        };

        let bytes = self.artifacts.fetch(&artifact.handle)?;
        let location = storage.write_file(&artifact.file_name, &bytes).await?;
        tracing::info!("📁 Saved {} rows to {}", artifact.row_count, location);
        Ok(Some(location))
    }

    fn complete(&mut self, rows: Vec<EnrichedRow>) -> RunOutcome {
        let header = header();
        let csv = to_csv(&rows, &header);
        let file_name = artifact_file_name(Utc::now());
        let handle = self.artifacts.acquire(CSV_CONTENT_TYPE, csv.into_bytes());

        self.state.view = table::render(&rows, &header, self.preview_rows);
        self.state.artifact = Some(DownloadArtifact {
            file_name: file_name.clone(),
            handle,
            row_count: rows.len(),
        });
        let count = rows.len();
        self.state.rows = rows;
        self.state.phase = Phase::Done;

        tracing::info!("✅ Run complete: {} rows, artifact {}", count, file_name);
        RunOutcome::Completed {
            rows: count,
            file_name,
        }
    }

    fn discard_results(&mut self) {
        if let Some(previous) = self.state.artifact.take() {
            self.artifacts.release(&previous.handle);
        }
        self.state.rows.clear();
        self.state.view = None;
    }

    fn set_status(&mut self, message: &str) {
        self.status.emit(message);
        self.state.status = message.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{LookupOutcome, PostalCode};
    use crate::domain::ports::StatusLog;
    use crate::utils::error::EnrichError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    #[derive(Default)]
    struct ToggleClient {
        failing: AtomicBool,
    }

    #[async_trait]
    impl LookupClient for ToggleClient {
        async fn lookup_batch(&self, codes: &[PostalCode]) -> Result<Vec<LookupOutcome>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(EnrichError::HttpStatus { status: 503 });
            }
            Ok(codes
                .iter()
                .map(|c| {
                    if c.as_str().starts_with("ZZ") {
                        LookupOutcome::Unmatched {
                            query: c.to_string(),
                        }
                    } else {
                        LookupOutcome::Matched {
                            query: c.to_string(),
                            fields: json!({"postcode": c.as_str(), "country": "England, GB"})
                                .as_object()
                                .cloned()
                                .unwrap(),
                        }
                    }
                })
                .collect())
        }
    }

    #[derive(Clone, Default)]
    struct MemoryStorage {
        files: Arc<AsyncMutex<HashMap<String, Vec<u8>>>>,
    }

    impl Storage for MemoryStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.files.lock().await.get(path).cloned().ok_or_else(|| {
                EnrichError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<String> {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
            Ok(format!("memory/{}", path))
        }
    }

    fn controller(
        client: Arc<ToggleClient>,
    ) -> (Controller<Arc<ToggleClient>, NoSleep, Arc<MemoryArtifactStore>>, Arc<StatusLog>, Arc<MemoryArtifactStore>) {
        let status = Arc::new(StatusLog::new());
        let store = Arc::new(MemoryArtifactStore::new());
        let enricher = BatchEnricher::with_sleeper(client, NoSleep);
        let controller = Controller::with_store(enricher, store.clone(), status.clone());
        (controller, status, store)
    }

    #[tokio::test]
    async fn test_successful_run() {
        let (mut controller, status, store) = controller(Arc::new(ToggleClient::default()));
        assert_eq!(controller.state().phase, Phase::Idle);
        assert!(!controller.state().can_download());

        let outcome = controller.run("sw1a1aa, ZZ9 9ZZ\nsw1a 1aa").await;

        match outcome {
            RunOutcome::Completed { rows, file_name } => {
                assert_eq!(rows, 2);
                assert!(file_name.starts_with("postcodes_enriched_"));
                assert!(file_name.ends_with(".csv"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let state = controller.state();
        assert_eq!(state.phase, Phase::Done);
        assert!(state.can_download());
        assert_eq!(state.status, "Done. 2 rows.");
        assert_eq!(state.rows[1].postcode(), "ZZ9 9ZZ");
        assert_eq!(state.view.as_ref().unwrap().rows.len(), 2);
        assert_eq!(store.live_count(), 1);
        assert_eq!(status.messages().first().unwrap(), "Fetching 1-2 of 2…");

        let handle = &state.artifact.as_ref().unwrap().handle;
        let csv = String::from_utf8(store.fetch(handle).unwrap()).unwrap();
        let lines: Vec<&str> = csv.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("postcode,country,region,"));
        assert!(lines[1].starts_with("SW1A 1AA,\"England, GB\","));
        assert_eq!(lines[2], format!("ZZ9 9ZZ{}", ",".repeat(12)));
    }

    #[tokio::test]
    async fn test_new_run_releases_previous_artifact() {
        let (mut controller, _status, store) = controller(Arc::new(ToggleClient::default()));

        controller.run("M1 1AE").await;
        let first = controller.state().artifact.clone().unwrap();
        assert!(store.fetch(&first.handle).is_ok());

        controller.run("B33 8TH").await;
        let second = controller.state().artifact.clone().unwrap();

        assert!(matches!(
            store.fetch(&first.handle),
            Err(EnrichError::ArtifactReleased { .. })
        ));
        assert!(store.fetch(&second.handle).is_ok());
        assert_eq!(store.live_count(), 1);
        assert_eq!(controller.state().rows.len(), 1);
        assert_eq!(controller.state().rows[0].postcode(), "B33 8TH");
    }

    #[tokio::test]
    async fn test_failed_run_hides_results() {
        let client = Arc::new(ToggleClient::default());
        let (mut controller, status, store) = controller(client.clone());

        controller.run("M1 1AE").await;
        assert_eq!(store.live_count(), 1);

        client.failing.store(true, Ordering::SeqCst);
        let outcome = controller.run("B33 8TH").await;

        assert_eq!(outcome, RunOutcome::Failed);
        let state = controller.state();
        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(state.status, GENERIC_FAILURE);
        assert!(state.rows.is_empty());
        assert!(state.view.is_none());
        assert!(state.artifact.is_none());
        assert!(!state.can_download());
        assert_eq!(store.live_count(), 0);
        assert!(status
            .messages()
            .contains(&"Rate limited / error, retrying… (3)".to_string()));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_status_lines_logged_at_info() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (mut controller, _status, _store) = controller(Arc::new(ToggleClient::default()));
        controller.run("M1 1AE").await;
        controller.run("12, AB").await;

        let lines = logs.lines();
        for status in ["Fetching 1-1 of 1…", "Done. 1 rows.", NO_VALID_POSTCODES] {
            assert!(
                lines.iter().any(|l| l.contains("INFO") && l.contains(status)),
                "missing info line for {:?} in {:?}",
                status,
                lines
            );
        }
    }

    #[tokio::test]
    async fn test_empty_input_is_nothing_to_do() {
        let (mut controller, status, _store) = controller(Arc::new(ToggleClient::default()));

        let outcome = controller.run("AB, 12\n").await;

        assert_eq!(outcome, RunOutcome::NothingToDo);
        assert_eq!(controller.state().phase, Phase::Idle);
        assert_eq!(status.last().as_deref(), Some(NO_VALID_POSTCODES));
        assert!(controller.state().can_run());
    }

    #[tokio::test]
    async fn test_download_without_artifact_is_noop() {
        let (controller, _status, _store) = controller(Arc::new(ToggleClient::default()));
        let storage = MemoryStorage::default();

        let written = controller.download(&storage).await.unwrap();

        assert!(written.is_none());
        assert!(storage.files.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_download_writes_csv() {
        let (mut controller, _status, _store) = controller(Arc::new(ToggleClient::default()));
        let storage = MemoryStorage::default();

        controller.run("EC1A 1BB").await;
        let file_name = controller.state().artifact.as_ref().unwrap().file_name.clone();
        let written = controller.download(&storage).await.unwrap();

        assert_eq!(written, Some(format!("memory/{}", file_name)));
        let files = storage.files.lock().await;
        let csv = String::from_utf8(files.get(&file_name).unwrap().clone()).unwrap();
        assert!(csv.contains("EC1A 1BB,\"England, GB\""));
    }

    #[tokio::test]
    async fn test_preview_capped_but_csv_complete() {
        let (controller, _status, store) = controller(Arc::new(ToggleClient::default()));
        let mut controller = controller.with_preview_rows(3);

        let raw: Vec<String> = (1..=9).map(|i| format!("M{} 1AE", i)).collect();
        controller.run(&raw.join(",")).await;

        let state = controller.state();
        let view = state.view.as_ref().unwrap();
        assert_eq!(view.rows.len(), 3);
        assert_eq!(view.total_rows, 9);

        let csv = store.fetch(&state.artifact.as_ref().unwrap().handle).unwrap();
        assert_eq!(String::from_utf8(csv).unwrap().lines().count(), 10);
    }
}
