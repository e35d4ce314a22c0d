pub mod billing;
pub mod config;
pub mod error;

pub use error::{BillingError, BillingResult};
