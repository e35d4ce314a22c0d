//! Recurring billing: period calculus, due-window selection, bundle
//! expansion, idempotent persistence and the periodic passes tying them
//! together.

pub mod catalog;
pub mod clients;
pub mod models;
pub mod period;
pub mod reconciliation;
pub mod scheduler;
pub mod selector;
pub mod validation;

pub use catalog::{BundlePriceResolver, CatalogApi};
pub use models::{
    BillRecord, BillingWindow, ChargeKind, ChargeRecord, ChargeableItem, Money, PriceSpec, Product,
    RatedBill, RecurringChargeSpec, RecurringPeriod, Ref, RelatedParty,
};
pub use reconciliation::{
    BillFilter, ChargeFilter, PersistOutcome, ReconciliationGuard, RecordStore,
};
pub use scheduler::{
    BillingOrchestrator, OrchestratorSettings, PassSummary, ProductInventoryApi, RatingApi,
};
pub use selector::{DueGroup, DueWindowSelector};
pub use validation::ValidationError;
