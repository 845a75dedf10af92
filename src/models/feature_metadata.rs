use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Registry of external regressor tables available to the model adapters
/// (construction-cost index, interest rate, user-imported features).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "feature_metadata")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub feature_name: String,
    /// Physical table holding the rows, with a `date` column plus the value
    /// columns listed below.
    pub table_name: String,
    #[sea_orm(column_type = "Json")]
    pub columns: JsonValue,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
