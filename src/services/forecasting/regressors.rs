use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::timeseries::month_floor;

/// One dated row of an external feature table (construction-cost index,
/// benchmark interest rate, or a user-imported table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub values: HashMap<String, f64>,
}

/// An external feature table as handed over by the store collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTable {
    pub name: String,
    pub rows: Vec<FeatureRow>,
}

/// One regressor column resampled to monthly frequency: rows truncated to
/// the month and averaged within it.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyRegressor {
    pub name: String,
    values: BTreeMap<NaiveDate, f64>,
}

impl MonthlyRegressor {
    pub fn new(name: impl Into<String>, values: BTreeMap<NaiveDate, f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Value for a month, forward-filling from the most recent known month.
    /// Future months past the table's end carry the last value; months before
    /// the first known one have no value.
    pub fn value_on(&self, month: NaiveDate) -> Option<f64> {
        let month = month_floor(month);
        self.values.range(..=month).next_back().map(|(_, v)| *v)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.values().sum::<f64>() / self.values.len() as f64
    }
}

/// Turns raw feature tables into monthly regressors, one per (table, column),
/// named `{table}_{column}`.
pub fn monthly_regressors(tables: &[FeatureTable]) -> Vec<MonthlyRegressor> {
    let mut regressors = Vec::new();
    for table in tables {
        let mut columns: BTreeMap<String, BTreeMap<NaiveDate, (f64, usize)>> = BTreeMap::new();
        for row in &table.rows {
            let month = month_floor(row.date);
            for (column, value) in &row.values {
                if !value.is_finite() {
                    continue;
                }
                let entry = columns
                    .entry(column.clone())
                    .or_default()
                    .entry(month)
                    .or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
        for (column, sums) in columns {
            let values: BTreeMap<NaiveDate, f64> = sums
                .into_iter()
                .map(|(month, (total, count))| (month, total / count as f64))
                .collect();
            debug!(
                table = %table.name,
                column = %column,
                months = values.len(),
                "monthly regressor built"
            );
            regressors.push(MonthlyRegressor::new(
                format!("{}_{}", table.name, column),
                values,
            ));
        }
    }
    regressors
}
