//! Catalog access and the expansion of bundled price specifications into
//! their billable recurring leaves.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::models::{ChargeKind, PriceSpec};
use super::period;
use super::validation::{self, ValidationError};
use crate::error::BillingResult;

/// Lookup into the external product catalog. A missing price spec is
/// reported as `None`; the caller decides whether that is a skip
/// condition or an error.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn get_price_spec(&self, id: &str) -> BillingResult<Option<PriceSpec>>;
}

/// Expands bundled price specifications by resolving their declared
/// sub-relationships through the catalog. Bundles may nest; a visited-id
/// set makes the traversal total under malformed (cyclic) catalog data.
pub struct BundlePriceResolver<'a> {
    catalog: &'a dyn CatalogApi,
}

impl<'a> BundlePriceResolver<'a> {
    pub fn new(catalog: &'a dyn CatalogApi) -> Self {
        Self { catalog }
    }

    /// The recurring leaf specs reachable from `spec`, with one-time
    /// sub-prices skipped. A sub-price that is neither one-time nor
    /// recognized-recurring, or a bundle cycle, is a validation error.
    pub async fn billable_specs(&self, spec: &PriceSpec) -> BillingResult<Vec<PriceSpec>> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(spec.id.clone());

        let mut pending = vec![spec.clone()];
        let mut leaves = Vec::new();

        while let Some(current) = pending.pop() {
            validation::validate_price_spec(&current)?;

            if current.is_bundle() {
                debug!(price_spec = %current.id, "expanding bundled price spec");
                for child_ref in &current.bundled_refs {
                    if !visited.insert(child_ref.id.clone()) {
                        return Err(ValidationError::single(format!(
                            "bundled price spec '{}' forms a cycle via '{}'",
                            spec.id, child_ref.id
                        ))
                        .into());
                    }
                    let child = self.catalog.get_price_spec(&child_ref.id).await?.ok_or_else(
                        || {
                            ValidationError::single(format!(
                                "bundled sub-price '{}' not found in catalog",
                                child_ref.id
                            ))
                        },
                    )?;
                    pending.push(child);
                }
                continue;
            }

            match current.charge_kind() {
                Some(ChargeKind::OneTime) => {
                    debug!(price_spec = %current.id, "one-time sub-price skipped");
                }
                Some(kind) if kind.is_recurring() || kind.is_usage() => leaves.push(current),
                _ => {
                    return Err(ValidationError::single(format!(
                        "cannot compute billing periods for price spec '{}': unsupported price type",
                        current.id
                    ))
                    .into())
                }
            }
        }

        Ok(leaves)
    }

    /// Billing-period end dates for a price spec between an activation
    /// and a limit date, accumulated over all recurring leaves of a
    /// bundle.
    pub async fn boundaries_for_price(
        &self,
        spec: &PriceSpec,
        activation: DateTime<Utc>,
        limit: DateTime<Utc>,
    ) -> BillingResult<Vec<DateTime<Utc>>> {
        let mut boundaries = Vec::new();
        for leaf in self.billable_specs(spec).await? {
            let recurring = leaf.recurring_spec().ok_or_else(|| {
                ValidationError::single(format!(
                    "price spec '{}' has no usable recurring charge period",
                    leaf.id
                ))
            })?;
            boundaries.extend(period::compute_boundaries(&recurring, activation, limit)?);
        }
        Ok(boundaries)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::billing::models::Ref;
    use crate::error::BillingError;

    struct MapCatalog {
        specs: HashMap<String, PriceSpec>,
    }

    #[async_trait]
    impl CatalogApi for MapCatalog {
        async fn get_price_spec(&self, id: &str) -> BillingResult<Option<PriceSpec>> {
            Ok(self.specs.get(id).cloned())
        }
    }

    fn recurring_spec(id: &str, period: &str, length: u32) -> PriceSpec {
        PriceSpec {
            id: id.into(),
            lifecycle_status: Some("launched".into()),
            is_bundle: Some(false),
            price_type: Some("recurring".into()),
            recurring_charge_period_type: Some(period.into()),
            recurring_charge_period_length: Some(length),
            bundled_refs: vec![],
        }
    }

    fn one_time_spec(id: &str) -> PriceSpec {
        PriceSpec {
            id: id.into(),
            lifecycle_status: Some("launched".into()),
            is_bundle: Some(false),
            price_type: Some("one-time".into()),
            recurring_charge_period_type: None,
            recurring_charge_period_length: None,
            bundled_refs: vec![],
        }
    }

    fn bundle(id: &str, children: &[&str]) -> PriceSpec {
        PriceSpec {
            id: id.into(),
            lifecycle_status: Some("launched".into()),
            is_bundle: Some(true),
            price_type: None,
            recurring_charge_period_type: None,
            recurring_charge_period_length: None,
            bundled_refs: children.iter().map(|c| Ref::new(*c)).collect(),
        }
    }

    fn ts(s: &str) -> DateTime<Utc> {
        format!("{s}T00:00:00Z").parse().unwrap()
    }

    #[tokio::test]
    async fn bundle_expansion_skips_one_time_sub_prices() {
        let catalog = MapCatalog {
            specs: HashMap::from([
                ("daily".into(), recurring_spec("daily", "day", 5)),
                ("monthly".into(), recurring_spec("monthly", "month", 1)),
                ("setup".into(), one_time_spec("setup")),
            ]),
        };
        let resolver = BundlePriceResolver::new(&catalog);
        let parent = bundle("parent", &["daily", "monthly", "setup"]);

        let boundaries = resolver
            .boundaries_for_price(&parent, ts("2025-09-01"), ts("2025-09-30"))
            .await
            .unwrap();

        // DAY/5 contributes six boundaries, MONTH/1 contributes one, the
        // one-time sub-price contributes none.
        assert_eq!(boundaries.len(), 7);
        assert!(boundaries.contains(&ts("2025-09-05")));
        assert!(boundaries.contains(&ts("2025-09-30")));
    }

    #[tokio::test]
    async fn nested_bundles_are_expanded_recursively() {
        let catalog = MapCatalog {
            specs: HashMap::from([
                ("inner".into(), bundle("inner", &["daily"])),
                ("daily".into(), recurring_spec("daily", "day", 10)),
            ]),
        };
        let resolver = BundlePriceResolver::new(&catalog);
        let parent = bundle("parent", &["inner"]);

        let leaves = resolver.billable_specs(&parent).await.unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].id, "daily");
    }

    #[tokio::test]
    async fn cyclic_bundles_are_a_validation_error() {
        let catalog = MapCatalog {
            specs: HashMap::from([
                ("a".into(), bundle("a", &["b"])),
                ("b".into(), bundle("b", &["a"])),
            ]),
        };
        let resolver = BundlePriceResolver::new(&catalog);
        let err = resolver
            .billable_specs(&bundle("a", &["b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn unsupported_price_type_is_a_validation_error() {
        let mut odd = recurring_spec("odd", "day", 1);
        odd.price_type = Some("flat-fee".into());
        let catalog = MapCatalog {
            specs: HashMap::from([("odd".into(), odd)]),
        };
        let resolver = BundlePriceResolver::new(&catalog);
        let err = resolver
            .billable_specs(&bundle("parent", &["odd"]))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[tokio::test]
    async fn plain_recurring_spec_computes_its_own_boundaries() {
        let catalog = MapCatalog {
            specs: HashMap::new(),
        };
        let resolver = BundlePriceResolver::new(&catalog);
        let spec = recurring_spec("solo", "week", 1);

        let boundaries = resolver
            .boundaries_for_price(&spec, ts("2025-01-01"), ts("2025-01-31"))
            .await
            .unwrap();
        assert_eq!(
            boundaries,
            vec![ts("2025-01-07"), ts("2025-01-14"), ts("2025-01-21"), ts("2025-01-28")]
        );
    }
}
