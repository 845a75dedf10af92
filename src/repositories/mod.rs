pub mod forecast_repository;

pub use forecast_repository::{ForecastStore, MetricRecord, SeaOrmForecastStore};
