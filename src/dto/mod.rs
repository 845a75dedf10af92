pub mod forecasting;

pub use forecasting::{
    BatchForecastSummary, ForecastPointDto, ForecastRequest, ForecastResponse, SkuFailure,
    ValidationRequest, ValidationResponse,
};
