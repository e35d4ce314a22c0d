//! HTTP clients for the external registries: product inventory, product
//! catalog, billing record store and the rating engine. All of them speak
//! plain JSON over REST with limit/offset pagination.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use super::catalog::CatalogApi;
use super::models::{BillRecord, BillingWindow, ChargeKind, ChargeRecord, PriceSpec, Product, RatedBill};
use super::reconciliation::{BillFilter, ChargeFilter, RecordStore};
use super::scheduler::{ProductInventoryApi, RatingApi};
use crate::error::{BillingError, BillingResult};

fn fmt_instant(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

async fn expect_success(
    response: reqwest::Response,
    context: &str,
) -> BillingResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BillingError::external(format!(
        "{context} returned {status}: {body}"
    )))
}

/// Product inventory registry client.
#[derive(Debug, Clone)]
pub struct InventoryClient {
    http: Client,
    base_url: String,
}

impl InventoryClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProductInventoryApi for InventoryClient {
    async fn list_active_products(&self, limit: u32, offset: u32) -> BillingResult<Vec<Product>> {
        let response = self
            .http
            .get(format!("{}/product", self.base_url))
            .query(&[
                ("status", "active".to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?;
        let products = expect_success(response, "product inventory")
            .await?
            .json::<Vec<Product>>()
            .await?;
        debug!(count = products.len(), offset, "fetched product page");
        Ok(products)
    }
}

/// Product catalog client. A missing price spec is a regular outcome,
/// not an error.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CatalogApi for CatalogClient {
    async fn get_price_spec(&self, id: &str) -> BillingResult<Option<PriceSpec>> {
        let response = self
            .http
            .get(format!("{}/productOfferingPrice/{id}", self.base_url))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let spec = expect_success(response, "product catalog")
            .await?
            .json::<PriceSpec>()
            .await?;
        Ok(Some(spec))
    }
}

/// Billing record store client for customer bills and applied charges.
#[derive(Debug, Clone)]
pub struct RecordStoreClient {
    http: Client,
    base_url: String,
}

impl RecordStoreClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl RecordStore for RecordStoreClient {
    async fn list_bills(
        &self,
        filter: &BillFilter,
        limit: u32,
        offset: u32,
    ) -> BillingResult<Vec<BillRecord>> {
        let mut query = vec![
            ("limit".to_string(), limit.to_string()),
            ("offset".to_string(), offset.to_string()),
        ];
        if let Some(ts) = filter.bill_date {
            query.push(("billDate".to_string(), fmt_instant(ts)));
        }
        if let Some(ts) = filter.period_start {
            query.push(("billingPeriod.startDateTime".to_string(), fmt_instant(ts)));
        }
        if let Some(ts) = filter.period_end {
            query.push(("billingPeriod.endDateTime".to_string(), fmt_instant(ts)));
        }

        let response = self
            .http
            .get(format!("{}/customerBill", self.base_url))
            .query(&query)
            .send()
            .await?;
        Ok(expect_success(response, "record store (bills)")
            .await?
            .json::<Vec<BillRecord>>()
            .await?)
    }

    async fn list_charges(
        &self,
        filter: &ChargeFilter,
        limit: u32,
        offset: u32,
    ) -> BillingResult<Vec<ChargeRecord>> {
        let mut query = vec![
            ("limit".to_string(), limit.to_string()),
            ("offset".to_string(), offset.to_string()),
        ];
        if let Some(rate_type) = &filter.rate_type {
            query.push(("rateType".to_string(), rate_type.clone()));
        }
        if let Some(ts) = filter.period_start {
            query.push(("periodCoverage.startDateTime".to_string(), fmt_instant(ts)));
        }
        if let Some(ts) = filter.period_end {
            query.push(("periodCoverage.endDateTime".to_string(), fmt_instant(ts)));
        }
        if let Some(id) = &filter.product_id {
            query.push(("product.id".to_string(), id.clone()));
        }
        if let Some(id) = &filter.billing_account_id {
            query.push(("billingAccount.id".to_string(), id.clone()));
        }
        if let Some(id) = &filter.bill_id {
            query.push(("bill.id".to_string(), id.clone()));
        }

        let response = self
            .http
            .get(format!("{}/appliedCustomerBillingRate", self.base_url))
            .query(&query)
            .send()
            .await?;
        Ok(expect_success(response, "record store (charges)")
            .await?
            .json::<Vec<ChargeRecord>>()
            .await?)
    }

    async fn create_bill(&self, bill: &BillRecord) -> BillingResult<BillRecord> {
        let response = self
            .http
            .post(format!("{}/customerBill", self.base_url))
            .json(bill)
            .send()
            .await?;
        Ok(expect_success(response, "record store (create bill)")
            .await?
            .json::<BillRecord>()
            .await?)
    }

    async fn create_charge(&self, charge: &ChargeRecord) -> BillingResult<ChargeRecord> {
        let response = self
            .http
            .post(format!("{}/appliedCustomerBillingRate", self.base_url))
            .json(charge)
            .send()
            .await?;
        Ok(expect_success(response, "record store (create charge)")
            .await?
            .json::<ChargeRecord>()
            .await?)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RatingRequest<'a> {
    product: &'a Product,
    rate_type: &'static str,
    billing_period: &'a BillingWindow,
}

/// Rating engine client. The engine prices one coverage window of a
/// product and returns the invoice to persist.
#[derive(Debug, Clone)]
pub struct RatingClient {
    http: Client,
    base_url: String,
}

impl RatingClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl RatingApi for RatingClient {
    async fn rate(
        &self,
        product: &Product,
        kind: ChargeKind,
        window: &BillingWindow,
    ) -> BillingResult<RatedBill> {
        let request = RatingRequest {
            product,
            rate_type: kind.as_str(),
            billing_period: window,
        };
        let response = self
            .http
            .post(format!("{}/billing/bill", self.base_url))
            .json(&request)
            .send()
            .await?;
        Ok(expect_success(response, "rating engine")
            .await?
            .json::<RatedBill>()
            .await?)
    }
}
