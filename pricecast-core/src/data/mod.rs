//! Price series shaping: dedupe, grid normalization, daily roll-up

pub mod aggregate;
pub mod normalize;
pub mod series;

pub use aggregate::{aggregate_daily, rollup_daily};
pub use normalize::{dedup, normalize};
pub use series::{NormalizedSeries, SeriesError};
