//! pricecast runner: orchestration around `pricecast-core`.
//!
//! - TOML pipeline configuration and JSON forecast requests
//! - Price and forecast stores (JSONL directory, in-memory, CSV input)
//! - Destination row types and mapping
//! - Backfill ingestion of raw hourly prices
//! - The per-(ticker, horizon) forecast pipeline

pub mod config;
pub mod ingest;
pub mod request;
pub mod retry;
pub mod runner;
pub mod schema;
pub mod store;

pub use config::{ConfigError, DailySource, HorizonConfig, PipelineConfig};
pub use ingest::{backfill, IngestError, IngestReport};
pub use request::ForecastRequest;
pub use retry::read_with_retry;
pub use runner::{unit_seed, Pipeline, PipelineError, RunSummary, UnitError, UnitReport, UnitStatus};
pub use store::{
    CsvPriceFile, ForecastStore, JsonlStore, MemoryStore, PriceStore, StoreError, Table, WriteError,
};
