use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One forecast invocation. Append-only: rows are never updated after
/// creation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "forecast_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub model_name: String,
    /// SKU code or aggregation descriptor the run targeted.
    pub identifier: Option<String>,
    pub total_series: i32,
    pub summary_wmape: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::forecast_point::Entity")]
    ForecastPoint,
}

impl Related<super::forecast_point::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ForecastPoint.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
