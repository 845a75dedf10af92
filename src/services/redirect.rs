use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::errors::ServiceError;
use crate::services::aggregation::AggregationType;
use crate::services::classification::{class_of_sku, AbcClass, AbcRecord};
use crate::services::forecasting::ModelKind;

/// Which adapter to run and whether the router picked it on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub kind: ModelKind,
    pub auto_selected: bool,
}

/// ABC-class routing table. Class B points at the intermittent-demand slot,
/// which ships unimplemented; anything unmapped falls back to the primary
/// adapter.
pub fn kind_for_class(class: Option<AbcClass>) -> ModelKind {
    match class {
        Some(AbcClass::A) => ModelKind::Seasonal,
        Some(AbcClass::B) => ModelKind::Intermittent,
        Some(AbcClass::C) => ModelKind::Boosted,
        None => ModelKind::Seasonal,
    }
}

/// Chooses the model for a forecast request.
///
/// Single-SKU targets with no explicit model are routed by the SKU's ABC
/// class. Aggregate targets never auto-route: they use the explicit model or
/// default to the primary adapter, since an aggregate has no single class.
#[instrument(skip(classified))]
pub fn route(
    aggregation_type: AggregationType,
    sku: Option<&str>,
    explicit_model: Option<&str>,
    classified: &[AbcRecord],
) -> Result<RoutingDecision, ServiceError> {
    if let Some(name) = explicit_model {
        return Ok(RoutingDecision {
            kind: ModelKind::parse(name)?,
            auto_selected: false,
        });
    }

    if aggregation_type != AggregationType::Sku {
        return Ok(RoutingDecision {
            kind: ModelKind::Seasonal,
            auto_selected: false,
        });
    }

    let sku = sku.ok_or_else(|| {
        ServiceError::invalid("field 'sku' is required when aggregation_type is 'sku'")
    })?;
    let class = class_of_sku(classified, sku);
    if class.is_none() {
        warn!(sku, "SKU missing from ABC classification; using the primary model");
    }
    Ok(RoutingDecision {
        kind: kind_for_class(class),
        auto_selected: true,
    })
}
