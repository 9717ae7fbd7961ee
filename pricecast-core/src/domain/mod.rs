//! Domain types for pricecast

pub mod forecast;
pub mod grain;
pub mod price;

pub use forecast::{ForecastPoint, ForecastResult, Horizon};
pub use grain::Grain;
pub use price::PriceRow;
