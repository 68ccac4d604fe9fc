use crate::core::retry::RetryPolicy;
use crate::domain::model::{EnrichedRow, LookupOutcome, PostalCode};
use crate::domain::ports::{LookupClient, Sleeper, StatusSink, TokioSleeper};
use crate::utils::error::{EnrichError, Result};
use std::time::Duration;

/// The lookup API accepts at most this many postcodes per request.
pub const MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_PAUSE_MS: u64 = 80;

/// Looks postcodes up batch by batch, strictly one request at a time.
pub struct BatchEnricher<L: LookupClient, S: Sleeper = TokioSleeper> {
    client: L,
    sleeper: S,
    policy: RetryPolicy,
    batch_size: usize,
    batch_pause: Duration,
}

impl<L: LookupClient> BatchEnricher<L, TokioSleeper> {
    pub fn new(client: L) -> Self {
        Self::with_sleeper(client, TokioSleeper)
    }
}

impl<L: LookupClient, S: Sleeper> BatchEnricher<L, S> {
    pub fn with_sleeper(client: L, sleeper: S) -> Self {
        Self {
            client,
            sleeper,
            policy: RetryPolicy::default(),
            batch_size: MAX_BATCH_SIZE,
            batch_pause: Duration::from_millis(DEFAULT_BATCH_PAUSE_MS),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Clamped to `1..=MAX_BATCH_SIZE`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub async fn enrich(
        &self,
        codes: &[PostalCode],
        status: &dyn StatusSink,
    ) -> Result<Vec<EnrichedRow>> {
        let total = codes.len();
        let mut rows = Vec::with_capacity(total);
        let batch_count = total.div_ceil(self.batch_size);

        for (index, chunk) in codes.chunks(self.batch_size).enumerate() {
            let first = index * self.batch_size + 1;
            let last = first + chunk.len() - 1;

            status.emit(&format!("Fetching {}-{} of {}…", first, last, total));
            let outcomes = self.fetch_with_retry(chunk, first, last, status).await?;

            rows.extend(outcomes.iter().map(EnrichedRow::from_outcome));

            if index + 1 < batch_count {
                self.sleeper.sleep(self.batch_pause).await;
            }
        }

        tracing::info!("✅ Enriched {} postcodes in {} batches", rows.len(), batch_count);
        status.emit(&format!("Done. {} rows.", rows.len()));
        Ok(rows)
    }

    async fn fetch_with_retry(
        &self,
        chunk: &[PostalCode],
        first: usize,
        last: usize,
        status: &dyn StatusSink,
    ) -> Result<Vec<LookupOutcome>> {
        let mut attempt = 1;
        loop {
            tracing::debug!(
                "Batch {}-{} attempt {}/{}",
                first,
                last,
                attempt,
                self.policy.max_attempts
            );

            let error = match self.client.lookup_batch(chunk).await {
                Ok(outcomes) => return Ok(pad_outcomes(chunk, outcomes)),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            if !self.policy.should_retry(attempt) {
                tracing::error!(
                    "❌ Batch {}-{} failed after {} attempts: {}",
                    first,
                    last,
                    attempt,
                    error
                );
                return Err(EnrichError::BatchExhausted {
                    first,
                    last,
                    attempts: attempt,
                    last_error: error.to_string(),
                });
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                "Batch {}-{} attempt {} failed: {}. Retrying in {:?}...",
                first,
                last,
                attempt,
                error,
                delay
            );
            attempt += 1;
            status.emit(&format!("Rate limited / error, retrying… ({})", attempt));
            self.sleeper.sleep(delay).await;
        }
    }
}

/// Exactly one outcome per queried code, whatever length the API returned.
fn pad_outcomes(
    chunk: &[PostalCode],
    mut outcomes: Vec<LookupOutcome>,
) -> Vec<LookupOutcome> {
    if outcomes.len() > chunk.len() {
        tracing::warn!(
            "Lookup returned {} results for {} postcodes; extra results ignored",
            outcomes.len(),
            chunk.len()
        );
        outcomes.truncate(chunk.len());
    } else if outcomes.len() < chunk.len() {
        tracing::warn!(
            "Lookup returned {} results for {} postcodes",
            outcomes.len(),
            chunk.len()
        );
        outcomes.extend(chunk[outcomes.len()..].iter().map(|code| {
            LookupOutcome::Unmatched {
                query: code.to_string(),
            }
        }));
    }
    outcomes
}
