use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Calendar unit of a recurring charge. Parsed once at the boundary from
/// registry strings; no string matching happens downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecurringPeriod {
    Day,
    Week,
    Month,
    Year,
}

impl RecurringPeriod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "day" | "days" | "daily" => Some(RecurringPeriod::Day),
            "week" | "weeks" | "weekly" => Some(RecurringPeriod::Week),
            "month" | "months" | "monthly" => Some(RecurringPeriod::Month),
            "year" | "years" | "yearly" | "annual" => Some(RecurringPeriod::Year),
            _ => None,
        }
    }
}

/// How often a price recurs: period type plus a positive length
/// (e.g. every 5 days, every 1 month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecurringChargeSpec {
    pub period: RecurringPeriod,
    pub length: u32,
}

impl RecurringChargeSpec {
    pub fn new(period: RecurringPeriod, length: u32) -> Self {
        Self { period, length }
    }

    /// Parses the registry encoding of a recurring period, either
    /// "<length> <unit>" or a bare unit meaning length 1 (e.g. "5 day",
    /// "month").
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(unit), None, _) => {
                RecurringPeriod::parse(unit).map(|period| Self { period, length: 1 })
            }
            (Some(length), Some(unit), None) => {
                let length = length.parse::<u32>().ok().filter(|l| *l > 0)?;
                RecurringPeriod::parse(unit).map(|period| Self { period, length })
            }
            _ => None,
        }
    }
}

/// Normalized classification of a price. Unrecognized registry values map
/// to `None` and the item is skipped with a logged reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChargeKind {
    OneTime,
    Recurring,
    RecurringPrepaid,
    RecurringPostpaid,
    PayPerUse,
}

impl ChargeKind {
    pub fn normalize(raw: &str) -> Option<Self> {
        let folded: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c })
            .collect();
        match folded.as_str() {
            "one-time" | "onetime" => Some(ChargeKind::OneTime),
            "recurring" => Some(ChargeKind::Recurring),
            "recurring-prepaid" => Some(ChargeKind::RecurringPrepaid),
            "recurring-postpaid" => Some(ChargeKind::RecurringPostpaid),
            "pay-per-use" | "payperuse" | "usage" => Some(ChargeKind::PayPerUse),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeKind::OneTime => "one-time",
            ChargeKind::Recurring => "recurring",
            ChargeKind::RecurringPrepaid => "recurring-prepaid",
            ChargeKind::RecurringPostpaid => "recurring-postpaid",
            ChargeKind::PayPerUse => "pay-per-use",
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(
            self,
            ChargeKind::Recurring | ChargeKind::RecurringPrepaid | ChargeKind::RecurringPostpaid
        )
    }

    /// Usage kinds are rated after a settlement delay.
    pub fn is_usage(&self) -> bool {
        matches!(self, ChargeKind::PayPerUse)
    }
}

/// One chargeable period, inclusive on both ends at day granularity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingWindow {
    #[serde(rename = "startDateTime")]
    pub start: DateTime<Utc>,
    #[serde(rename = "endDateTime")]
    pub end: DateTime<Utc>,
}

impl BillingWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start <= end, "billing window start must not exceed end");
        Self { start, end }
    }

    pub fn length_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// Reference to another registry entity by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub id: String,
}

impl Ref {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedParty {
    pub id: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl Money {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            unit: Some(unit.into()),
        }
    }
}

/// A product's price entry: carries either a direct recurring-charge
/// period or a reference to a catalog price that itself carries one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeableItem {
    #[serde(default)]
    pub name: Option<String>,
    /// Declared charge kind, used when no catalog price is referenced.
    pub price_type: String,
    /// Direct recurring period in registry encoding ("5 day", "month").
    #[serde(default)]
    pub recurring_charge_period: Option<String>,
    /// Reference to the catalog price specification, if any.
    #[serde(default, rename = "productOfferingPrice")]
    pub price_ref: Option<Ref>,
}

impl ChargeableItem {
    pub fn declared_kind(&self) -> Option<ChargeKind> {
        ChargeKind::normalize(&self.price_type)
    }

    pub fn direct_spec(&self) -> Option<RecurringChargeSpec> {
        self.recurring_charge_period
            .as_deref()
            .and_then(RecurringChargeSpec::parse)
    }
}

pub const PRODUCT_STATUS_ACTIVE: &str = "active";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
    /// Activation date the recurring calculus is anchored on.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub billing_account: Option<Ref>,
    #[serde(default)]
    pub related_party: Vec<RelatedParty>,
    #[serde(default)]
    pub product_price: Vec<ChargeableItem>,
}

impl Product {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(PRODUCT_STATUS_ACTIVE)
    }
}

/// Catalog price specification. May bundle several sub-prices, in which
/// case the recurring fields live on the (recursively resolved) leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSpec {
    pub id: String,
    #[serde(default)]
    pub lifecycle_status: Option<String>,
    #[serde(default)]
    pub is_bundle: Option<bool>,
    #[serde(default)]
    pub price_type: Option<String>,
    #[serde(default)]
    pub recurring_charge_period_type: Option<String>,
    #[serde(default)]
    pub recurring_charge_period_length: Option<u32>,
    #[serde(default, rename = "bundledPopRelationship")]
    pub bundled_refs: Vec<Ref>,
}

impl PriceSpec {
    pub fn is_bundle(&self) -> bool {
        self.is_bundle.unwrap_or(false)
    }

    pub fn charge_kind(&self) -> Option<ChargeKind> {
        self.price_type.as_deref().and_then(ChargeKind::normalize)
    }

    pub fn recurring_spec(&self) -> Option<RecurringChargeSpec> {
        let period = self
            .recurring_charge_period_type
            .as_deref()
            .and_then(RecurringPeriod::parse)?;
        let length = self.recurring_charge_period_length.filter(|l| *l > 0)?;
        Some(RecurringChargeSpec::new(period, length))
    }
}

/// Previously persisted bill header, matched (not created) by the
/// reconciliation guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BillRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub bill_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub billing_period: Option<BillingWindow>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tax_included_amount: Option<Money>,
    #[serde(default)]
    pub related_party: Vec<RelatedParty>,
}

/// Previously persisted charge line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rate_type: Option<String>,
    #[serde(default)]
    pub is_billed: Option<bool>,
    #[serde(default)]
    pub period_coverage: Option<BillingWindow>,
    #[serde(default)]
    pub tax_included_amount: Option<Money>,
    #[serde(default)]
    pub product: Option<Ref>,
    #[serde(default)]
    pub billing_account: Option<Ref>,
    #[serde(default)]
    pub bill: Option<Ref>,
}

/// Output of the rating engine for one (product, window) pair: a bill
/// header plus its charge line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatedBill {
    pub bill: BillRecord,
    pub charges: Vec<ChargeRecord>,
}
