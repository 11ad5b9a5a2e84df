//! # Naver Land Listing Ingestion
//!
//! Pulls paginated real-estate listings for one apartment complex from the
//! Naver Land listing endpoint, normalizes Korean price text into billions
//! of KRW and summarizes the result.
//!
//! ## Pipeline
//!
//! 1. [`IngestionEngine`] fetches pages sequentially through a [`PageFetcher`],
//!    waiting the configured rate-limit interval between requests, until the
//!    source runs dry, the page limit is hit, a fetch fails or the caller cancels.
//! 2. [`projector`] turns the raw records into [`NormalizedRow`]s.
//! 3. [`summary`] computes price statistics overall, per trade type and per
//!    area bin.
//!
//! Every request, failure and run outcome is counted in a shared
//! [`MetricsSink`] that renders Prometheus text exposition.
//!
//! ## Usage
//!
//! ```no_run
//! use naver_land_ingest::{
//!     progress::LogProgress, summary, IngestConfig, IngestionEngine, IngestionTarget,
//!     MetricsSink, RunRequest,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(MetricsSink::new());
//! let engine = IngestionEngine::new(IngestConfig::from_env(), metrics.clone())?;
//!
//! let request = RunRequest::new(IngestionTarget::parse("131345")?, 5);
//! let outcome = engine.run(request, &CancellationToken::new(), &LogProgress).await?;
//! println!("{}", outcome.status());
//!
//! let rows = engine.project(&outcome);
//! let report = summary::summarize(&rows);
//! println!("mean price: {:?}", report.overall.mean);
//!
//! println!("{}", metrics.render());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod fetchers;
pub mod metrics;
pub mod price;
pub mod progress;
pub mod projector;
pub mod summary;
pub mod types;

// Re-export commonly used types
pub use config::IngestConfig;
pub use engine::{IngestionEngine, IngestionOutcome, RunHandle, RunRequest};
pub use error::{FetchError, IngestError};
pub use fetcher::PageFetcher;
pub use fetchers::NaverLandFetcher;
pub use metrics::MetricsSink;
pub use price::{normalize, NormalizedPrice};
pub use progress::ProgressSink;
pub use projector::NormalizedRow;
pub use types::{
    AuthContext, FilterParams, IngestEvent, IngestionRun, IngestionTarget, PageRequest,
    PageResult, RawRecord, RunState, RunStatus, TerminationReason,
};
