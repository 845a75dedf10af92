use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One predicted month, owned by its forecast run and never mutated after
/// insertion.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "forecast_points")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub run_id: Uuid,
    /// SKU code or aggregation descriptor this point belongs to.
    pub target_code: String,
    pub forecast_date: NaiveDate,
    /// 1-based position within the forecast horizon.
    pub horizon_index: i32,
    pub point_estimate: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub model_name: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::forecast_run::Entity",
        from = "Column::RunId",
        to = "super::forecast_run::Column::Id"
    )]
    ForecastRun,
}

impl Related<super::forecast_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ForecastRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
