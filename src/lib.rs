//! Demandcast
//!
//! Demand forecasting engine for manufacturing SKU catalogs. The pipeline
//! takes a prepared tabular dataset, cleans it with outlier-robust
//! preprocessing, segments SKUs into ABC classes, aggregates on demand,
//! routes each request to a model adapter, and scores accuracy with
//! rolling-origin cross-validation. Persistence goes through a narrow async
//! store trait; HTTP and auth concerns live outside this crate.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod dto;
pub mod errors;
pub mod migrator;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;
pub mod stats;
pub mod timeseries;

pub use errors::ServiceError;

pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::db::{establish_connection, DbPool};
    pub use crate::dto::forecasting::{ForecastRequest, ForecastResponse, ValidationResponse};
    pub use crate::errors::ServiceError;
    pub use crate::repositories::{ForecastStore, SeaOrmForecastStore};
    pub use crate::services::forecast_service::{ForecastDefaults, ForecastService};
    pub use crate::services::transformer::{DataTransformer, OutlierMethod, RawObservation};
}
