//! Decides which of a product's chargeable items are due at an
//! evaluation instant and groups them into shared coverage windows so the
//! rating engine is invoked once per window instead of once per item.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::catalog::CatalogApi;
use super::models::{
    BillingWindow, ChargeKind, ChargeableItem, Product, RecurringChargeSpec,
};
use super::period;
use crate::error::BillingResult;

/// Items sharing a normalized charge kind and an identical coverage
/// window, batched into one rating call.
#[derive(Debug, Clone)]
pub struct DueGroup {
    pub kind: ChargeKind,
    pub window: BillingWindow,
    pub items: Vec<ChargeableItem>,
}

pub struct DueWindowSelector<'a> {
    catalog: &'a dyn CatalogApi,
    /// Backward shift applied to the evaluation instant for usage-based
    /// kinds, so metering can settle before rating.
    usage_delay: Duration,
}

impl<'a> DueWindowSelector<'a> {
    pub fn new(catalog: &'a dyn CatalogApi, usage_delay_days: i64) -> Self {
        Self {
            catalog,
            usage_delay: Duration::days(usage_delay_days),
        }
    }

    /// The due groups of `product` at `now`. Items whose charge kind or
    /// recurring period cannot be determined are skipped with a logged
    /// reason, never a failure.
    pub async fn select_due(
        &self,
        product: &Product,
        now: DateTime<Utc>,
    ) -> BillingResult<Vec<DueGroup>> {
        let Some(activation) = product.start_date else {
            warn!(product = %product.id, "product has no activation date, nothing due");
            return Ok(Vec::new());
        };

        let mut groups: BTreeMap<(ChargeKind, i64), DueGroup> = BTreeMap::new();

        for item in &product.product_price {
            let Some((kind, spec)) = self.effective_price(product, item).await else {
                continue;
            };

            let at = if kind.is_usage() {
                now - self.usage_delay
            } else {
                now
            };

            let (previous, next) = period::due_boundaries(activation, at, &spec);
            if !period::is_due(at, next) {
                debug!(
                    product = %product.id,
                    kind = kind.as_str(),
                    days_until_boundary = (next.date_naive() - at.date_naive()).num_days(),
                    "item not due at this instant"
                );
                continue;
            }

            let window = BillingWindow::new(previous, next);
            groups
                .entry((kind, window.length_days()))
                .or_insert_with(|| DueGroup {
                    kind,
                    window,
                    items: Vec::new(),
                })
                .items
                .push(item.clone());
        }

        Ok(groups.into_values().collect())
    }

    /// Resolves an item's effective charge kind and recurring spec: the
    /// referenced catalog price takes precedence, the item's own declared
    /// values are the fallback. One-time items and items whose kind or
    /// period cannot be determined resolve to `None`.
    async fn effective_price(
        &self,
        product: &Product,
        item: &ChargeableItem,
    ) -> Option<(ChargeKind, RecurringChargeSpec)> {
        let catalog_spec = match &item.price_ref {
            Some(price_ref) => match self.catalog.get_price_spec(&price_ref.id).await {
                Ok(Some(spec)) => Some(spec),
                Ok(None) => {
                    warn!(
                        product = %product.id,
                        price_spec = %price_ref.id,
                        "referenced catalog price not found, cannot determine charge kind"
                    );
                    return None;
                }
                Err(err) => {
                    warn!(
                        product = %product.id,
                        price_spec = %price_ref.id,
                        %err,
                        "catalog lookup failed, item skipped for this run"
                    );
                    return None;
                }
            },
            None => None,
        };

        let kind = catalog_spec
            .as_ref()
            .and_then(|spec| spec.charge_kind())
            .or_else(|| item.declared_kind());

        let kind = match kind {
            Some(ChargeKind::OneTime) => {
                debug!(product = %product.id, "one-time item excluded from window computation");
                return None;
            }
            Some(kind) => kind,
            None => {
                warn!(
                    product = %product.id,
                    price_type = %item.price_type,
                    "unrecognized charge kind, item skipped"
                );
                return None;
            }
        };

        let spec = catalog_spec
            .as_ref()
            .and_then(|spec| spec.recurring_spec())
            .or_else(|| item.direct_spec());

        match spec {
            Some(spec) => Some((kind, spec)),
            None => {
                warn!(
                    product = %product.id,
                    kind = kind.as_str(),
                    "no recurring charge period found, item skipped"
                );
                None
            }
        }
    }
}
