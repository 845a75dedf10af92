use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::ServiceError;
use crate::services::classification::{AbcClass, AbcRecord};
use crate::timeseries::{Observation, SeriesPoint};

/// How a forecast target is selected: one SKU or one of the aggregate modes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AggregationType {
    #[default]
    Sku,
    Familia,
    Processo,
    Abc,
    All,
    Combined,
}

impl AggregationType {
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        match value.trim().to_lowercase().as_str() {
            "sku" => Ok(AggregationType::Sku),
            "familia" => Ok(AggregationType::Familia),
            "processo" => Ok(AggregationType::Processo),
            "abc" => Ok(AggregationType::Abc),
            "all" => Ok(AggregationType::All),
            "combined" => Ok(AggregationType::Combined),
            other => Err(ServiceError::invalid(format!(
                "invalid aggregation type '{other}'; use sku, familia, processo, abc, all or combined"
            ))),
        }
    }
}

/// Summary of what an aggregation touched: filters applied, scope of the
/// remaining data, and its date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationInfo {
    pub kind: AggregationType,
    pub filters: Vec<String>,
    pub sku_count: usize,
    pub familias: Vec<String>,
    pub processos: Vec<String>,
    /// First few SKUs in scope, for display; capped at 10.
    pub sample_skus: Vec<String>,
    pub abc_class: Option<Vec<AbcClass>>,
    pub total_quantity: f64,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
}

const SAMPLE_SKU_LIMIT: usize = 10;

/// Collapses duplicate (SKU, period) rows by summing their quantities.
/// Output is sorted by (SKU, period) so the result does not depend on input
/// row order.
pub fn prepare(observations: &[Observation]) -> Vec<Observation> {
    let mut merged: BTreeMap<(String, NaiveDate, String, String), f64> = BTreeMap::new();
    for obs in observations {
        *merged
            .entry((
                obs.sku.clone(),
                obs.period,
                obs.family.clone(),
                obs.process.clone(),
            ))
            .or_insert(0.0) += obs.quantity;
    }
    merged
        .into_iter()
        .map(|((sku, period, family, process), quantity)| Observation {
            sku,
            period,
            quantity,
            family,
            process,
        })
        .collect()
}

/// Sums quantities per month across whatever rows are in scope.
fn sum_by_period(observations: &[Observation]) -> Vec<SeriesPoint> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for obs in observations {
        *totals.entry(obs.period).or_insert(0.0) += obs.quantity;
    }
    totals
        .into_iter()
        .map(|(period, quantity)| SeriesPoint { period, quantity })
        .collect()
}

fn build_info(
    kind: AggregationType,
    filters: Vec<String>,
    abc_class: Option<Vec<AbcClass>>,
    observations: &[Observation],
) -> AggregationInfo {
    let mut skus: BTreeSet<&str> = BTreeSet::new();
    let mut familias: BTreeSet<&str> = BTreeSet::new();
    let mut processos: BTreeSet<&str> = BTreeSet::new();
    let mut total_quantity = 0.0;
    let mut date_start: Option<NaiveDate> = None;
    let mut date_end: Option<NaiveDate> = None;
    for obs in observations {
        skus.insert(&obs.sku);
        familias.insert(&obs.family);
        processos.insert(&obs.process);
        total_quantity += obs.quantity;
        date_start = Some(date_start.map_or(obs.period, |d| d.min(obs.period)));
        date_end = Some(date_end.map_or(obs.period, |d| d.max(obs.period)));
    }
    AggregationInfo {
        kind,
        filters,
        sku_count: skus.len(),
        familias: familias.iter().map(|s| s.to_string()).collect(),
        processos: processos.iter().map(|s| s.to_string()).collect(),
        sample_skus: skus
            .iter()
            .take(SAMPLE_SKU_LIMIT)
            .map(|s| s.to_string())
            .collect(),
        abc_class,
        total_quantity,
        date_start,
        date_end,
    }
}

/// Sums every SKU into one series per period.
#[instrument(skip(observations), fields(rows = observations.len()))]
pub fn aggregate_all(
    observations: &[Observation],
) -> Result<(Vec<SeriesPoint>, AggregationInfo), ServiceError> {
    let clean = prepare(observations);
    if clean.is_empty() {
        return Err(ServiceError::not_found("no data available to aggregate"));
    }
    let info = build_info(AggregationType::All, Vec::new(), None, &clean);
    Ok((sum_by_period(&clean), info))
}

/// Filters to the given families (OR semantics) and sums per period.
#[instrument(skip(observations))]
pub fn aggregate_familia(
    observations: &[Observation],
    familias: &[String],
) -> Result<(Vec<SeriesPoint>, AggregationInfo), ServiceError> {
    if familias.is_empty() {
        return Err(ServiceError::invalid(
            "at least one familia value is required for familia aggregation",
        ));
    }
    let clean = prepare(observations);
    let filtered: Vec<Observation> = clean
        .into_iter()
        .filter(|obs| familias.iter().any(|f| f == &obs.family))
        .collect();
    if filtered.is_empty() {
        return Err(ServiceError::not_found(format!(
            "familia(s) '{}' not present in the dataset",
            familias.join(", ")
        )));
    }
    let filters = vec![format!("familia={}", familias.join(", "))];
    let info = build_info(AggregationType::Familia, filters, None, &filtered);
    Ok((sum_by_period(&filtered), info))
}

/// Filters to the given processes (OR semantics) and sums per period.
#[instrument(skip(observations))]
pub fn aggregate_processo(
    observations: &[Observation],
    processos: &[String],
) -> Result<(Vec<SeriesPoint>, AggregationInfo), ServiceError> {
    if processos.is_empty() {
        return Err(ServiceError::invalid(
            "at least one processo value is required for processo aggregation",
        ));
    }
    let clean = prepare(observations);
    let filtered: Vec<Observation> = clean
        .into_iter()
        .filter(|obs| processos.iter().any(|p| p == &obs.process))
        .collect();
    if filtered.is_empty() {
        return Err(ServiceError::not_found(format!(
            "processo(s) '{}' not present in the dataset",
            processos.join(", ")
        )));
    }
    let filters = vec![format!("processo={}", processos.join(", "))];
    let info = build_info(AggregationType::Processo, filters, None, &filtered);
    Ok((sum_by_period(&filtered), info))
}

fn parse_classes(raw: &[String]) -> Result<Vec<AbcClass>, ServiceError> {
    let mut classes = Vec::with_capacity(raw.len());
    for value in raw {
        classes.push(AbcClass::parse(value)?);
    }
    Ok(classes)
}

fn skus_in_classes(classified: &[AbcRecord], classes: &[AbcClass]) -> Vec<String> {
    let mut skus: BTreeSet<String> = BTreeSet::new();
    for record in classified {
        if classes.contains(&record.class) {
            skus.insert(record.sku.clone());
        }
    }
    skus.into_iter().collect()
}

/// Filters to SKUs of the requested ABC class(es) and sums per period.
/// Requires a classification table computed from the same dataset.
#[instrument(skip(observations, classified))]
pub fn aggregate_abc(
    observations: &[Observation],
    classified: &[AbcRecord],
    raw_classes: &[String],
) -> Result<(Vec<SeriesPoint>, AggregationInfo), ServiceError> {
    if raw_classes.is_empty() {
        return Err(ServiceError::invalid(
            "at least one ABC class is required for abc aggregation",
        ));
    }
    let classes = parse_classes(raw_classes)?;
    let clean = prepare(observations);
    let skus = skus_in_classes(classified, &classes);
    if skus.is_empty() {
        return Err(ServiceError::not_found(format!(
            "no SKU classified as '{}'",
            join_classes(&classes)
        )));
    }
    let filtered: Vec<Observation> = clean
        .into_iter()
        .filter(|obs| skus.binary_search(&obs.sku).is_ok())
        .collect();
    if filtered.is_empty() {
        return Err(ServiceError::not_found(format!(
            "no data found for ABC class(es) '{}'",
            join_classes(&classes)
        )));
    }
    let filters = vec![format!("abc={}", join_classes(&classes))];
    let info = build_info(AggregationType::Abc, filters, Some(classes), &filtered);
    Ok((sum_by_period(&filtered), info))
}

/// Applies family, process and ABC filters in sequence; each stage must leave
/// at least one row.
#[instrument(skip(observations, classified))]
pub fn aggregate_combined(
    observations: &[Observation],
    classified: Option<&[AbcRecord]>,
    familias: Option<&[String]>,
    processos: Option<&[String]>,
    raw_classes: Option<&[String]>,
) -> Result<(Vec<SeriesPoint>, AggregationInfo), ServiceError> {
    if familias.is_none() && processos.is_none() && raw_classes.is_none() {
        return Err(ServiceError::invalid(
            "combined aggregation needs at least one of familia, processo or abc_class",
        ));
    }
    let mut filtered = prepare(observations);
    let mut filters = Vec::new();
    let mut parsed_classes = None;

    if let Some(familias) = familias {
        filtered.retain(|obs| familias.iter().any(|f| f == &obs.family));
        if filtered.is_empty() {
            return Err(ServiceError::not_found(format!(
                "familia(s) '{}' not present in the dataset",
                familias.join(", ")
            )));
        }
        filters.push(format!("familia={}", familias.join(", ")));
    }

    if let Some(processos) = processos {
        filtered.retain(|obs| processos.iter().any(|p| p == &obs.process));
        if filtered.is_empty() {
            return Err(ServiceError::not_found(format!(
                "processo(s) '{}' not present after earlier filters",
                processos.join(", ")
            )));
        }
        filters.push(format!("processo={}", processos.join(", ")));
    }

    if let Some(raw_classes) = raw_classes {
        let classified = classified.ok_or_else(|| {
            ServiceError::invalid("a classification table is required when abc_class is set")
        })?;
        let classes = parse_classes(raw_classes)?;
        let skus = skus_in_classes(classified, &classes);
        if skus.is_empty() {
            return Err(ServiceError::not_found(format!(
                "no SKU classified as '{}'",
                join_classes(&classes)
            )));
        }
        filtered.retain(|obs| skus.binary_search(&obs.sku).is_ok());
        if filtered.is_empty() {
            return Err(ServiceError::not_found(format!(
                "no data found for ABC class(es) '{}' after earlier filters",
                join_classes(&classes)
            )));
        }
        filters.push(format!("abc={}", join_classes(&classes)));
        parsed_classes = Some(classes);
    }

    let info = build_info(
        AggregationType::Combined,
        filters,
        parsed_classes,
        &filtered,
    );
    Ok((sum_by_period(&filtered), info))
}

/// Builds the deduplicated monthly series of a single SKU.
pub fn sku_series(
    observations: &[Observation],
    sku: &str,
) -> Result<Vec<SeriesPoint>, ServiceError> {
    let wanted = sku.trim().to_uppercase();
    let clean = prepare(observations);
    let filtered: Vec<Observation> = clean
        .into_iter()
        .filter(|obs| obs.sku.trim().to_uppercase() == wanted)
        .collect();
    if filtered.is_empty() {
        return Err(ServiceError::not_found(format!(
            "SKU '{sku}' not present in the dataset"
        )));
    }
    Ok(sum_by_period(&filtered))
}

fn join_classes(classes: &[AbcClass]) -> String {
    classes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
