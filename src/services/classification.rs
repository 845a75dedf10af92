use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::ServiceError;
use crate::timeseries::Observation;

/// Pareto class of a SKU inside its (family, process) segment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
pub enum AbcClass {
    A,
    B,
    C,
}

impl AbcClass {
    /// Case-insensitive parse of a class letter; anything outside A/B/C is an
    /// invalid request.
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        match value.trim().to_uppercase().as_str() {
            "A" => Ok(AbcClass::A),
            "B" => Ok(AbcClass::B),
            "C" => Ok(AbcClass::C),
            other => Err(ServiceError::invalid(format!(
                "invalid ABC class '{other}'; use A, B or C"
            ))),
        }
    }
}

/// Total demand of one SKU within its (family, process) segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTotal {
    pub family: String,
    pub process: String,
    pub sku: String,
    pub total_quantity: f64,
}

/// Classification record: cumulative share and assigned class, recomputed
/// fresh from the full dataset on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbcRecord {
    pub sku: String,
    pub family: String,
    pub process: String,
    pub total_quantity: f64,
    pub cumulative_share: f64,
    pub class: AbcClass,
}

/// Sums quantity per (family, process, SKU), preserving first-occurrence
/// order so downstream tie-breaking is deterministic.
pub fn aggregate_by_sku(observations: &[Observation]) -> Vec<SegmentTotal> {
    let mut order: Vec<(String, String, String)> = Vec::new();
    let mut totals: HashMap<(String, String, String), f64> = HashMap::new();
    for obs in observations {
        let key = (obs.family.clone(), obs.process.clone(), obs.sku.clone());
        match totals.get_mut(&key) {
            Some(total) => *total += obs.quantity,
            None => {
                totals.insert(key.clone(), obs.quantity);
                order.push(key);
            }
        }
    }
    order
        .into_iter()
        .map(|key| {
            let total_quantity = totals[&key];
            SegmentTotal {
                family: key.0,
                process: key.1,
                sku: key.2,
                total_quantity,
            }
        })
        .collect()
}

/// Assigns ABC classes per (family, process) segment: SKUs sorted by total
/// descending (stable, so equal totals keep their incoming order), cumulative
/// share thresholds at 0.80 and 0.95 inclusive.
#[instrument(skip(totals), fields(skus = totals.len()))]
pub fn classify(totals: &[SegmentTotal]) -> Vec<AbcRecord> {
    let mut segment_order: Vec<(String, String)> = Vec::new();
    let mut segments: HashMap<(String, String), Vec<&SegmentTotal>> = HashMap::new();
    for total in totals {
        let key = (total.family.clone(), total.process.clone());
        let entry = segments.entry(key.clone()).or_insert_with(|| {
            segment_order.push(key);
            Vec::new()
        });
        entry.push(total);
    }

    let mut records = Vec::with_capacity(totals.len());
    for key in segment_order {
        let mut group = segments.remove(&key).unwrap_or_default();
        group.sort_by(|a, b| b.total_quantity.total_cmp(&a.total_quantity));
        let segment_total: f64 = group.iter().map(|t| t.total_quantity).sum();
        let mut running = 0.0;
        for entry in group {
            running += entry.total_quantity;
            // A segment that sums to zero has no meaningful shares; every SKU
            // classifies as A with share 0.
            let share = if segment_total > 0.0 {
                running / segment_total
            } else {
                0.0
            };
            let class = if share <= 0.80 {
                AbcClass::A
            } else if share <= 0.95 {
                AbcClass::B
            } else {
                AbcClass::C
            };
            records.push(AbcRecord {
                sku: entry.sku.clone(),
                family: entry.family.clone(),
                process: entry.process.clone(),
                total_quantity: entry.total_quantity,
                cumulative_share: share,
                class,
            });
        }
    }
    records
}

/// Looks up the class of a SKU in a classification table; comparison is
/// trimmed and case-insensitive on both sides.
pub fn class_of_sku(records: &[AbcRecord], sku: &str) -> Option<AbcClass> {
    let wanted = sku.trim().to_uppercase();
    records
        .iter()
        .find(|r| r.sku.trim().to_uppercase() == wanted)
        .map(|r| r.class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(sku: &str, family: &str, process: &str, quantity: f64) -> Observation {
        Observation {
            sku: sku.into(),
            period: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            quantity,
            family: family.into(),
            process: process.into(),
        }
    }

    fn totals_fixture() -> Vec<SegmentTotal> {
        // Shares within FAM1/EXT: 0.5, 0.8, 0.95, 1.0.
        vec![
            SegmentTotal {
                family: "FAM1".into(),
                process: "EXT".into(),
                sku: "S1".into(),
                total_quantity: 500.0,
            },
            SegmentTotal {
                family: "FAM1".into(),
                process: "EXT".into(),
                sku: "S2".into(),
                total_quantity: 300.0,
            },
            SegmentTotal {
                family: "FAM1".into(),
                process: "EXT".into(),
                sku: "S3".into(),
                total_quantity: 150.0,
            },
            SegmentTotal {
                family: "FAM1".into(),
                process: "EXT".into(),
                sku: "S4".into(),
                total_quantity: 50.0,
            },
        ]
    }

    #[test]
    fn aggregate_sums_duplicate_sku_rows() {
        let observations = vec![
            obs("S1", "FAM1", "EXT", 10.0),
            obs("S2", "FAM1", "EXT", 5.0),
            obs("S1", "FAM1", "EXT", 7.0),
        ];
        let totals = aggregate_by_sku(&observations);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].sku, "S1");
        assert_eq!(totals[0].total_quantity, 17.0);
        assert_eq!(totals[1].sku, "S2");
    }

    #[test]
    fn share_boundaries_are_inclusive() {
        let records = classify(&totals_fixture());
        let classes: Vec<(String, AbcClass)> = records
            .iter()
            .map(|r| (r.sku.clone(), r.class))
            .collect();
        // 0.80 is still A and 0.95 is still B.
        assert_eq!(classes[0], ("S1".into(), AbcClass::A));
        assert_eq!(classes[1], ("S2".into(), AbcClass::A));
        assert_eq!(classes[2], ("S3".into(), AbcClass::B));
        assert_eq!(classes[3], ("S4".into(), AbcClass::C));
    }

    #[test]
    fn no_low_share_sku_lands_outside_class_a() {
        let records = classify(&totals_fixture());
        for record in records {
            if record.cumulative_share <= 0.80 {
                assert_eq!(record.class, AbcClass::A);
            }
        }
    }

    #[test]
    fn classification_is_idempotent() {
        let totals = totals_fixture();
        let first = classify(&totals);
        let second = classify(&totals);
        assert_eq!(first, second);
    }

    #[test]
    fn equal_totals_keep_incoming_order() {
        let totals = vec![
            SegmentTotal {
                family: "F".into(),
                process: "P".into(),
                sku: "TIE1".into(),
                total_quantity: 100.0,
            },
            SegmentTotal {
                family: "F".into(),
                process: "P".into(),
                sku: "TIE2".into(),
                total_quantity: 100.0,
            },
        ];
        let records = classify(&totals);
        assert_eq!(records[0].sku, "TIE1");
        assert_eq!(records[1].sku, "TIE2");
    }

    #[test]
    fn segments_are_classified_independently() {
        let observations = vec![
            obs("S1", "FAM1", "EXT", 1000.0),
            obs("S2", "FAM1", "EXT", 10.0),
            obs("S3", "FAM2", "INJ", 1.0),
        ];
        let records = classify(&aggregate_by_sku(&observations));
        // S3 dominates its own segment even though its volume is tiny overall.
        let s3 = records.iter().find(|r| r.sku == "S3").unwrap();
        assert_eq!(s3.class, AbcClass::A);
    }

    #[test]
    fn zero_total_segment_defaults_to_class_a() {
        let totals = vec![SegmentTotal {
            family: "F".into(),
            process: "P".into(),
            sku: "Z".into(),
            total_quantity: 0.0,
        }];
        let records = classify(&totals);
        assert_eq!(records[0].class, AbcClass::A);
        assert_eq!(records[0].cumulative_share, 0.0);
    }

    #[test]
    fn class_parse_rejects_unknown_letters() {
        assert_eq!(AbcClass::parse(" b ").unwrap(), AbcClass::B);
        assert!(matches!(
            AbcClass::parse("D"),
            Err(ServiceError::InvalidRequest(_))
        ));
    }

    #[test]
    fn class_lookup_normalizes_sku_codes() {
        let records = classify(&totals_fixture());
        assert_eq!(class_of_sku(&records, " s1 "), Some(AbcClass::A));
        assert_eq!(class_of_sku(&records, "missing"), None);
    }
}
