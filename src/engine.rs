//! Paginated ingestion engine
//!
//! Drives a [`PageFetcher`] page by page for one target, applies the
//! termination rules, waits the rate-limit interval between pages and
//! reports progress through a [`ProgressSink`].
//!
//! # Termination
//!
//! Each iteration ends the run with exactly one reason:
//!
//! - `Cancelled` - the token was cancelled before the next fetch
//! - `FetchFailed` - the fetch returned an error (no retry)
//! - `NoMoreRecords` - the page came back empty
//! - `PageLimitReached` - the page just appended was `max_pages`
//! - `SourceExhausted` - the source reported no further pages
//!
//! Records gathered before the run stopped are always returned.
//!
//! Every page that answers, including the empty last one, produces a
//! `PageFetched` event. A failed fetch produces none; its error is carried
//! by the final `RunCompleted` event.

use crate::{
    config::IngestConfig,
    constants::FIRST_PAGE,
    error::{FetchError, IngestError},
    fetcher::PageFetcher,
    fetchers::NaverLandFetcher,
    metrics::MetricsSink,
    progress::ProgressSink,
    projector::{project_with_metrics, NormalizedRow},
    types::{
        AuthContext, FilterParams, IngestEvent, IngestionRun, IngestionTarget, PageRequest,
        RawRecord, RunState, RunStatus, TerminationReason,
    },
};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Parameters of one ingestion run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub target: IngestionTarget,
    /// Highest page index to fetch (inclusive)
    pub max_pages: u32,
    /// First page index, 1-based
    pub start_page: u32,
    pub filters: FilterParams,
    pub auth: AuthContext,
}

impl RunRequest {
    /// Run from the first page up to `max_pages`
    pub fn new(target: IngestionTarget, max_pages: u32) -> Self {
        Self {
            target,
            max_pages,
            start_page: FIRST_PAGE,
            filters: FilterParams::new(),
            auth: AuthContext::default(),
        }
    }

    pub fn with_start_page(mut self, start_page: u32) -> Self {
        self.start_page = start_page;
        self
    }

    pub fn with_filters(mut self, filters: FilterParams) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = auth;
        self
    }

    fn validate(&self) -> Result<(), IngestError> {
        IngestionTarget::parse(self.target.as_str())?;
        if self.max_pages == 0 {
            return Err(IngestError::invalid_input("max_pages must be positive"));
        }
        if self.start_page == 0 {
            return Err(IngestError::invalid_input("start_page is 1-based"));
        }
        if self.start_page > self.max_pages {
            return Err(IngestError::invalid_input(format!(
                "start_page {} is beyond max_pages {}",
                self.start_page, self.max_pages
            )));
        }
        Ok(())
    }
}

/// Result of a finished run, successful or not
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    /// Final, read-only run bookkeeping
    pub run: IngestionRun,
    /// Every record gathered, in page order
    pub records: Vec<RawRecord>,
    /// The fetch error that stopped the run, if any
    pub error: Option<FetchError>,
}

impl IngestionOutcome {
    pub fn termination_reason(&self) -> TerminationReason {
        self.run
            .termination_reason()
            .unwrap_or(TerminationReason::FetchFailed)
    }

    /// Terminal state of the run
    pub fn state(&self) -> RunState {
        RunState::Done {
            reason: self.termination_reason(),
        }
    }

    /// Operator-facing summary of the run
    pub fn status(&self) -> RunStatus {
        RunStatus {
            pages_fetched: self.run.pages_fetched(),
            total_records: self.run.total_records(),
            termination_reason: self.termination_reason(),
        }
    }
}

/// Handle to a run executing on its own task
pub struct RunHandle {
    cancel: CancellationToken,
    handle: JoinHandle<Result<IngestionOutcome, IngestError>>,
}

impl RunHandle {
    /// Requests cancellation; the run stops before its next fetch
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the run to finish
    pub async fn join(self) -> Result<IngestionOutcome, IngestError> {
        self.handle
            .await
            .map_err(|e| IngestError::internal(format!("ingestion task failed: {}", e)))?
    }
}

/// Paginated ingestion engine
///
/// One engine can serve many concurrent runs; they share only the fetcher
/// and the metrics sink. Pages of a single run are always fetched
/// sequentially.
///
/// # Example
/// ```no_run
/// use naver_land_ingest::{IngestConfig, IngestionEngine, IngestionTarget, MetricsSink, RunRequest};
/// use naver_land_ingest::progress::LogProgress;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let metrics = Arc::new(MetricsSink::new());
/// let engine = IngestionEngine::new(IngestConfig::from_env(), metrics)?;
/// let request = RunRequest::new(IngestionTarget::parse("131345")?, 5);
/// let outcome = engine.run(request, &CancellationToken::new(), &LogProgress).await?;
/// println!("{}", outcome.status());
/// # Ok(())
/// # }
/// ```
pub struct IngestionEngine {
    fetcher: Arc<dyn PageFetcher>,
    metrics: Arc<MetricsSink>,
    config: IngestConfig,
}

impl IngestionEngine {
    /// Creates an engine backed by the HTTP listing fetcher
    pub fn new(config: IngestConfig, metrics: Arc<MetricsSink>) -> Result<Self, FetchError> {
        let fetcher = Arc::new(NaverLandFetcher::new(&config, metrics.clone())?);
        Ok(Self::with_fetcher(fetcher, metrics, config))
    }

    /// Creates an engine with a custom fetcher
    ///
    /// This is primarily for testing with mock fetchers.
    pub fn with_fetcher(
        fetcher: Arc<dyn PageFetcher>,
        metrics: Arc<MetricsSink>,
        config: IngestConfig,
    ) -> Self {
        Self {
            fetcher,
            metrics,
            config,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsSink> {
        &self.metrics
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Returns the name of the current fetcher
    pub fn fetcher_name(&self) -> &str {
        self.fetcher.fetcher_name()
    }

    /// Runs one ingestion to completion
    ///
    /// Only invalid input is returned as `Err`; fetch failures end the run
    /// with `FetchFailed` and are reported in [`IngestionOutcome::error`]
    /// together with the records gathered so far.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<IngestionOutcome, IngestError> {
        let label = request.target.as_str();

        if let Err(e) = request.validate() {
            tracing::warn!(complex_no = label, error = %e, "Rejected ingestion run");
            self.metrics.record_error(label, e.kind());
            return Err(e);
        }

        let _worker = self.metrics.worker_started();
        self.metrics.record_user_action("data_fetch");

        let mut run = IngestionRun::start(request.target.clone(), request.max_pages);
        let mut records: Vec<RawRecord> = Vec::new();
        let mut failure: Option<FetchError> = None;
        let mut page = request.start_page;

        tracing::info!(
            run_id = %run.id(),
            complex_no = label,
            start_page = request.start_page,
            max_pages = request.max_pages,
            fetcher = self.fetcher_name(),
            "Starting ingestion run"
        );

        let reason = loop {
            if cancel.is_cancelled() {
                tracing::info!(complex_no = label, page, "Ingestion run cancelled");
                break TerminationReason::Cancelled;
            }

            let page_request = PageRequest {
                target: request.target.clone(),
                page_index: page,
                filters: request.filters.clone(),
            };

            self.metrics.record_request_issued(label);
            let result = match self.fetcher.fetch(&page_request, &request.auth).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(
                        complex_no = label,
                        page,
                        error_type = e.kind(),
                        error = %e,
                        "Page fetch failed"
                    );
                    self.metrics.record_request_failure(label, e.kind());
                    failure = Some(e);
                    break TerminationReason::FetchFailed;
                }
            };
            self.metrics.record_request_success(label);

            if result.records.is_empty() {
                tracing::info!(complex_no = label, page, "No more listings");
                let reason = TerminationReason::NoMoreRecords;
                progress.emit(IngestEvent::PageFetched {
                    run_id: run.id(),
                    target: request.target.clone(),
                    page_index: page,
                    max_pages: request.max_pages,
                    records_this_page: 0,
                    total_records: run.total_records(),
                    state: RunState::Draining { reason },
                    timestamp: Utc::now(),
                });
                break reason;
            }

            let count = result.records.len();
            records.extend(result.records);
            run.record_page(count);
            self.metrics.record_records_ingested(label, count);
            self.metrics.mark_success(label);
            self.metrics.set_data_size(label, records.len());

            let stop = if page >= request.max_pages {
                Some(TerminationReason::PageLimitReached)
            } else if !result.has_more {
                Some(TerminationReason::SourceExhausted)
            } else {
                None
            };

            let state = match stop {
                Some(reason) => RunState::Draining { reason },
                None => RunState::Fetching { page: page + 1 },
            };

            tracing::debug!(complex_no = label, page, records = count, "Fetched page");
            progress.emit(IngestEvent::PageFetched {
                run_id: run.id(),
                target: request.target.clone(),
                page_index: page,
                max_pages: request.max_pages,
                records_this_page: count,
                total_records: run.total_records(),
                state,
                timestamp: Utc::now(),
            });

            if let Some(reason) = stop {
                break reason;
            }

            // the next iteration notices a cancellation that cut the wait short
            tokio::select! {
                _ = sleep(self.config.rate_limit_interval) => {}
                _ = cancel.cancelled() => {}
            }
            page += 1;
        };

        run.finish(reason);

        tracing::info!(
            run_id = %run.id(),
            complex_no = label,
            pages_fetched = run.pages_fetched(),
            total_records = run.total_records(),
            reason = %reason,
            "Ingestion run finished"
        );

        progress.emit(IngestEvent::RunCompleted {
            run_id: run.id(),
            target: request.target.clone(),
            pages_fetched: run.pages_fetched(),
            total_records: run.total_records(),
            termination_reason: reason,
            error: failure.as_ref().map(|e| e.to_string()),
            records: Arc::new(records.clone()),
            timestamp: Utc::now(),
        });

        Ok(IngestionOutcome {
            run,
            records,
            error: failure,
        })
    }

    /// Starts a run on its own task
    pub fn spawn(self: &Arc<Self>, request: RunRequest, progress: Arc<dyn ProgressSink>) -> RunHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let engine = Arc::clone(self);

        let handle = tokio::spawn(async move { engine.run(request, &token, progress.as_ref()).await });

        RunHandle { cancel, handle }
    }

    /// Runs several independent targets concurrently
    ///
    /// Results come back in request order. Cancelling the token stops every run.
    pub async fn run_many(
        &self,
        requests: Vec<RunRequest>,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Vec<Result<IngestionOutcome, IngestError>> {
        join_all(
            requests
                .into_iter()
                .map(|request| self.run(request, cancel, progress)),
        )
        .await
    }

    /// Projects an outcome's records and publishes its price statistics
    pub fn project(&self, outcome: &IngestionOutcome) -> Vec<NormalizedRow> {
        project_with_metrics(&outcome.records, outcome.run.target().as_str(), &self.metrics)
    }
}
