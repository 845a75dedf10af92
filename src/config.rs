use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

use crate::services::validation::CvParams;

const DEFAULT_LOG_LEVEL: &str = "info";
const CONFIG_FILE: &str = "config/default";
const ENV_PREFIX: &str = "DEMANDCAST";

/// Forecasting defaults applied when a request does not override them.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ForecastConfig {
    /// Months to forecast ahead.
    #[serde(default = "default_periods")]
    #[validate(range(min = 1, max = 60))]
    pub periods: u32,

    /// Outlier treatment method: iqr, mad, percentile, zscore, winsorize or
    /// none.
    #[serde(default = "default_outlier_method")]
    pub outlier_method: String,

    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,

    /// Rolling-origin validation window, in months.
    #[serde(default = "default_cv_initial")]
    pub cv_initial_window: usize,

    #[serde(default = "default_cv_horizon")]
    pub cv_horizon: usize,

    #[serde(default = "default_cv_step")]
    pub cv_step: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            periods: default_periods(),
            outlier_method: default_outlier_method(),
            outlier_threshold: default_outlier_threshold(),
            cv_initial_window: default_cv_initial(),
            cv_horizon: default_cv_horizon(),
            cv_step: default_cv_step(),
        }
    }
}

impl ForecastConfig {
    pub fn cv_params(&self) -> CvParams {
        CvParams {
            initial_window: self.cv_initial_window,
            horizon: self.cv_horizon,
            step: self.cv_step,
        }
    }
}

/// Application configuration, layered from `config/default.toml` and
/// `DEMANDCAST_*` environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL.
    pub database_url: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    #[validate]
    pub forecast: ForecastConfig,
}

impl AppConfig {
    /// Loads configuration: the optional file first, environment overrides on
    /// top (e.g. `DEMANDCAST_DATABASE_URL`, `DEMANDCAST_FORECAST__PERIODS`).
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let app: AppConfig = config.try_deserialize()?;
        app.validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(app)
    }
}

fn default_periods() -> u32 {
    12
}
fn default_outlier_method() -> String {
    "iqr".to_string()
}
fn default_outlier_threshold() -> f64 {
    1.5
}
fn default_cv_initial() -> usize {
    24
}
fn default_cv_horizon() -> usize {
    12
}
fn default_cv_step() -> usize {
    3
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forecast_defaults_match_the_documented_windows() {
        let forecast = ForecastConfig::default();
        assert_eq!(forecast.periods, 12);
        assert_eq!(forecast.outlier_method, "iqr");
        let cv = forecast.cv_params();
        assert_eq!(cv.initial_window, 24);
        assert_eq!(cv.horizon, 12);
        assert_eq!(cv.step, 3);
    }

    #[test]
    fn config_deserializes_from_toml_fragment() {
        let config: AppConfig = Config::builder()
            .add_source(config::File::from_str(
                r#"
                database_url = "postgres://localhost/forecast"
                [forecast]
                periods = 6
                outlier_method = "winsorize"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.forecast.periods, 6);
        assert_eq!(config.forecast.outlier_method, "winsorize");
        assert_eq!(config.log_level, "info");
    }
}
