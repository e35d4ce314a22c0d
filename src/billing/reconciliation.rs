//! Idempotence guard over the billing record store. Every persist goes
//! through a check-then-act probe so re-running a pass over the same
//! horizon never duplicates bills or charges.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::models::{BillRecord, BillingWindow, ChargeRecord, Money, RatedBill, RelatedParty};
use crate::error::BillingResult;

/// Monetary comparison tolerance. Amounts that crossed a float boundary
/// on their way through the record store still count as equal.
pub const MONEY_EPSILON: f64 = 1e-4;

/// Appended to bills and charges this service creates, so externally
/// created records are distinguishable from ours.
pub const PROVENANCE_WATERMARK: &str = "Created by the billing scheduler";

const PARTY_ROLE_BUYER: &str = "buyer";
const PARTY_ROLE_CUSTOMER: &str = "customer";
const PARTY_ROLE_SELLER: &str = "seller";

/// Server-side filter for bill listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillFilter {
    pub bill_date: Option<DateTime<Utc>>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

/// Server-side filter for charge listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChargeFilter {
    pub rate_type: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub product_id: Option<String>,
    pub billing_account_id: Option<String>,
    pub bill_id: Option<String>,
}

/// Persistence surface of the external billing record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_bills(
        &self,
        filter: &BillFilter,
        limit: u32,
        offset: u32,
    ) -> BillingResult<Vec<BillRecord>>;

    async fn list_charges(
        &self,
        filter: &ChargeFilter,
        limit: u32,
        offset: u32,
    ) -> BillingResult<Vec<ChargeRecord>>;

    async fn create_bill(&self, bill: &BillRecord) -> BillingResult<BillRecord>;

    async fn create_charge(&self, charge: &ChargeRecord) -> BillingResult<ChargeRecord>;
}

/// Result of persisting one rated bill through the guard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistOutcome {
    pub bill_id: Option<String>,
    pub charges_created: usize,
    /// True when an equivalent bill already existed and nothing was
    /// written.
    pub skipped: bool,
}

pub struct ReconciliationGuard<'a> {
    store: &'a dyn RecordStore,
    page_size: u32,
}

impl<'a> ReconciliationGuard<'a> {
    pub fn new(store: &'a dyn RecordStore, page_size: u32) -> Self {
        Self { store, page_size }
    }

    /// Whether an equivalent bill for `product_id` already exists: same
    /// coverage window, same buyer and seller, same tax-included amount,
    /// and at least one persisted charge linking the candidate bill to
    /// the product. Pages through candidates and stops at the first
    /// match; a malformed candidate is logged and skipped, never fatal.
    pub async fn bill_already_exists(
        &self,
        rated: &RatedBill,
        product_id: &str,
    ) -> BillingResult<bool> {
        let filter = BillFilter {
            bill_date: rated.bill.bill_date,
            period_start: rated.bill.billing_period.map(|w| w.start),
            period_end: rated.bill.billing_period.map(|w| w.end),
        };

        let mut offset = 0;
        loop {
            let page = self.store.list_bills(&filter, self.page_size, offset).await?;
            let page_len = page.len();

            for candidate in page {
                match self.matches_bill(&candidate, rated, product_id).await {
                    Ok(true) => {
                        info!(
                            product = product_id,
                            bill = candidate.id.as_deref().unwrap_or("<no id>"),
                            "equivalent bill already present"
                        );
                        return Ok(true);
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(
                            product = product_id,
                            bill = candidate.id.as_deref().unwrap_or("<no id>"),
                            %err,
                            "candidate bill could not be compared, skipping it"
                        );
                    }
                }
            }

            if page_len < self.page_size as usize {
                return Ok(false);
            }
            offset += self.page_size;
        }
    }

    /// Whether an equivalent charge already exists: same rate type, same
    /// coverage window, same product. Delegates the match to a
    /// server-side filter and only checks for a non-empty result.
    pub async fn charge_already_exists(&self, charge: &ChargeRecord) -> BillingResult<bool> {
        let filter = ChargeFilter {
            rate_type: charge.rate_type.clone(),
            period_start: charge.period_coverage.map(|w| w.start),
            period_end: charge.period_coverage.map(|w| w.end),
            product_id: charge.product.as_ref().map(|r| r.id.clone()),
            billing_account_id: charge.billing_account.as_ref().map(|r| r.id.clone()),
            bill_id: None,
        };
        let existing = self.store.list_charges(&filter, 1, 0).await?;
        Ok(!existing.is_empty())
    }

    /// Persists a single bill header unless an equivalent one already
    /// exists. `None` means nothing was written.
    pub async fn persist_bill(
        &self,
        rated: &RatedBill,
        product_id: &str,
    ) -> BillingResult<Option<BillRecord>> {
        if self.bill_already_exists(rated, product_id).await? {
            return Ok(None);
        }
        let mut bill = rated.bill.clone();
        bill.category = Some(watermarked(bill.category.as_deref()));
        Ok(Some(self.store.create_bill(&bill).await?))
    }

    /// Persists a single charge unless an equivalent one already exists.
    /// `None` means nothing was written.
    pub async fn persist_charge(
        &self,
        charge: &ChargeRecord,
    ) -> BillingResult<Option<ChargeRecord>> {
        if self.charge_already_exists(charge).await? {
            return Ok(None);
        }
        let mut charge = charge.clone();
        charge.description = Some(watermarked(charge.description.as_deref()));
        Ok(Some(self.store.create_charge(&charge).await?))
    }

    /// Persists a rated bill and its charges unless an equivalent bill is
    /// already present, in which case the whole invoice is skipped. Once
    /// the header is known to be new, all its line items are written; a
    /// rated bill may legitimately carry several charges with the same
    /// rate type and window.
    pub async fn persist_rated_bill(
        &self,
        rated: &RatedBill,
        product_id: &str,
    ) -> BillingResult<PersistOutcome> {
        if self.bill_already_exists(rated, product_id).await? {
            return Ok(PersistOutcome {
                skipped: true,
                ..Default::default()
            });
        }

        let mut bill = rated.bill.clone();
        bill.category = Some(watermarked(bill.category.as_deref()));
        let created_bill = self.store.create_bill(&bill).await?;
        let bill_id = created_bill.id.clone();
        debug!(
            product = product_id,
            bill = bill_id.as_deref().unwrap_or("<no id>"),
            "bill persisted"
        );

        let mut charges_created = 0;
        for charge in &rated.charges {
            let mut charge = charge.clone();
            charge.bill = bill_id.clone().map(super::models::Ref::new);
            charge.is_billed = Some(true);
            charge.description = Some(watermarked(charge.description.as_deref()));
            self.store.create_charge(&charge).await?;
            charges_created += 1;
        }

        Ok(PersistOutcome {
            bill_id,
            charges_created,
            skipped: false,
        })
    }

    async fn matches_bill(
        &self,
        candidate: &BillRecord,
        rated: &RatedBill,
        product_id: &str,
    ) -> BillingResult<bool> {
        if !windows_equal(candidate.billing_period, rated.bill.billing_period) {
            return Ok(false);
        }
        if !buyer_matches(&candidate.related_party, &rated.bill.related_party) {
            return Ok(false);
        }
        if !party_matches(
            &candidate.related_party,
            &rated.bill.related_party,
            PARTY_ROLE_SELLER,
        ) {
            return Ok(false);
        }
        if !money_equals(
            candidate.tax_included_amount.as_ref(),
            rated.bill.tax_included_amount.as_ref(),
        ) {
            return Ok(false);
        }

        // A bill without an id cannot be linked to charges; treat it as
        // not ours.
        let Some(bill_id) = candidate.id.as_deref() else {
            return Ok(false);
        };
        let link_filter = ChargeFilter {
            bill_id: Some(bill_id.to_string()),
            product_id: Some(product_id.to_string()),
            ..Default::default()
        };
        let linked = self.store.list_charges(&link_filter, 1, 0).await?;
        Ok(!linked.is_empty())
    }
}

fn windows_equal(a: Option<BillingWindow>, b: Option<BillingWindow>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            a.start.date_naive() == b.start.date_naive() && a.end.date_naive() == b.end.date_naive()
        }
        _ => false,
    }
}

fn party_with_role<'p>(parties: &'p [RelatedParty], role: &str) -> Option<&'p RelatedParty> {
    parties
        .iter()
        .find(|p| p.role.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(role)))
}

/// Buyer comparison tolerates records where the buyer was stored under
/// the legacy "Customer" role.
fn buyer_matches(candidate: &[RelatedParty], expected: &[RelatedParty]) -> bool {
    let candidate_buyer = party_with_role(candidate, PARTY_ROLE_BUYER)
        .or_else(|| party_with_role(candidate, PARTY_ROLE_CUSTOMER));
    let expected_buyer = party_with_role(expected, PARTY_ROLE_BUYER)
        .or_else(|| party_with_role(expected, PARTY_ROLE_CUSTOMER));
    match (candidate_buyer, expected_buyer) {
        (Some(a), Some(b)) => a.id == b.id,
        _ => false,
    }
}

fn party_matches(candidate: &[RelatedParty], expected: &[RelatedParty], role: &str) -> bool {
    match (party_with_role(candidate, role), party_with_role(expected, role)) {
        (Some(a), Some(b)) => a.id == b.id,
        _ => false,
    }
}

/// Two amounts are equal when their values differ by less than
/// [`MONEY_EPSILON`] and their currency units agree ignoring case.
pub fn money_equals(a: Option<&Money>, b: Option<&Money>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    let (Some(va), Some(vb)) = (a.value, b.value) else {
        return false;
    };
    if (va - vb).abs() >= MONEY_EPSILON {
        return false;
    }
    match (a.unit.as_deref(), b.unit.as_deref()) {
        (Some(ua), Some(ub)) => ua.trim().eq_ignore_ascii_case(ub.trim()),
        (None, None) => true,
        _ => false,
    }
}

fn watermarked(existing: Option<&str>) -> String {
    match existing {
        Some(text) if !text.trim().is_empty() => format!("{text} - {PROVENANCE_WATERMARK}"),
        _ => PROVENANCE_WATERMARK.to_string(),
    }
}
