pub mod aggregation;
pub mod characteristics;
pub mod classification;
pub mod forecast_service;
pub mod forecasting;
pub mod metrics;
pub mod redirect;
pub mod transformer;
pub mod validation;

pub use forecast_service::{ForecastDefaults, ForecastService};
