#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use billing_scheduler::billing::{
    BillFilter, BillRecord, BillingWindow, CatalogApi, ChargeFilter, ChargeKind, ChargeRecord,
    Money, PriceSpec, Product, ProductInventoryApi, RatedBill, RatingApi, RecordStore, Ref,
    RelatedParty,
};
use billing_scheduler::BillingResult;

pub fn ts(s: &str) -> DateTime<Utc> {
    format!("{s}T00:00:00Z").parse().unwrap()
}

pub fn buyer() -> RelatedParty {
    RelatedParty {
        id: "org-buyer".into(),
        role: Some("Buyer".into()),
    }
}

pub fn seller() -> RelatedParty {
    RelatedParty {
        id: "org-seller".into(),
        role: Some("Seller".into()),
    }
}

pub struct MemoryInventory {
    pub products: Vec<Product>,
}

#[async_trait]
impl ProductInventoryApi for MemoryInventory {
    async fn list_active_products(&self, limit: u32, offset: u32) -> BillingResult<Vec<Product>> {
        Ok(self
            .products
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

pub struct MemoryCatalog {
    pub specs: HashMap<String, PriceSpec>,
}

impl MemoryCatalog {
    pub fn empty() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }
}

#[async_trait]
impl CatalogApi for MemoryCatalog {
    async fn get_price_spec(&self, id: &str) -> BillingResult<Option<PriceSpec>> {
        Ok(self.specs.get(id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryRecordStore {
    pub bills: Mutex<Vec<BillRecord>>,
    pub charges: Mutex<Vec<ChargeRecord>>,
}

impl MemoryRecordStore {
    pub fn bill_count(&self) -> usize {
        self.bills.lock().unwrap().len()
    }

    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }
}

fn window_start(window: Option<BillingWindow>) -> Option<DateTime<Utc>> {
    window.map(|w| w.start)
}

fn window_end(window: Option<BillingWindow>) -> Option<DateTime<Utc>> {
    window.map(|w| w.end)
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_bills(
        &self,
        filter: &BillFilter,
        limit: u32,
        offset: u32,
    ) -> BillingResult<Vec<BillRecord>> {
        let bills = self.bills.lock().unwrap();
        Ok(bills
            .iter()
            .filter(|b| {
                filter
                    .bill_date
                    .map_or(true, |d| b.bill_date == Some(d))
                    && filter
                        .period_start
                        .map_or(true, |s| window_start(b.billing_period) == Some(s))
                    && filter
                        .period_end
                        .map_or(true, |e| window_end(b.billing_period) == Some(e))
            })
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_charges(
        &self,
        filter: &ChargeFilter,
        limit: u32,
        offset: u32,
    ) -> BillingResult<Vec<ChargeRecord>> {
        let charges = self.charges.lock().unwrap();
        Ok(charges
            .iter()
            .filter(|c| {
                filter
                    .rate_type
                    .as_ref()
                    .map_or(true, |rt| c.rate_type.as_ref() == Some(rt))
                    && filter
                        .period_start
                        .map_or(true, |s| window_start(c.period_coverage) == Some(s))
                    && filter
                        .period_end
                        .map_or(true, |e| window_end(c.period_coverage) == Some(e))
                    && filter
                        .product_id
                        .as_ref()
                        .map_or(true, |id| c.product.as_ref().map(|r| &r.id) == Some(id))
                    && filter
                        .billing_account_id
                        .as_ref()
                        .map_or(true, |id| c.billing_account.as_ref().map(|r| &r.id) == Some(id))
                    && filter
                        .bill_id
                        .as_ref()
                        .map_or(true, |id| c.bill.as_ref().map(|r| &r.id) == Some(id))
            })
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn create_bill(&self, bill: &BillRecord) -> BillingResult<BillRecord> {
        let mut created = bill.clone();
        created.id = Some(Uuid::new_v4().to_string());
        self.bills.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn create_charge(&self, charge: &ChargeRecord) -> BillingResult<ChargeRecord> {
        let mut created = charge.clone();
        created.id = Some(Uuid::new_v4().to_string());
        self.charges.lock().unwrap().push(created.clone());
        Ok(created)
    }
}

/// Deterministic rating stub that records every call it receives.
pub struct CountingRating {
    pub amount: f64,
    pub calls: Mutex<Vec<(String, BillingWindow)>>,
}

impl CountingRating {
    pub fn new(amount: f64) -> Self {
        Self {
            amount,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RatingApi for CountingRating {
    async fn rate(
        &self,
        product: &Product,
        kind: ChargeKind,
        window: &BillingWindow,
    ) -> BillingResult<RatedBill> {
        self.calls
            .lock()
            .unwrap()
            .push((product.id.clone(), *window));
        Ok(RatedBill {
            bill: BillRecord {
                id: None,
                bill_date: Some(window.end),
                billing_period: Some(*window),
                category: None,
                tax_included_amount: Some(Money::new(self.amount, "EUR")),
                related_party: vec![buyer(), seller()],
            },
            charges: vec![ChargeRecord {
                name: Some(format!("{} charge", kind.as_str())),
                rate_type: Some(kind.as_str().to_string()),
                period_coverage: Some(*window),
                tax_included_amount: Some(Money::new(self.amount, "EUR")),
                product: Some(Ref::new(product.id.clone())),
                billing_account: product.billing_account.clone(),
                ..Default::default()
            }],
        })
    }
}
