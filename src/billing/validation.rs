//! Entity validation performed before a product or price specification
//! enters the recurring calculus. Issues are collected per entity so a
//! skip decision can be logged with every reason at once.

use std::fmt;

use tracing::debug;

use super::models::{PriceSpec, Product};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub message: String,
    pub severity: IssueSeverity,
}

impl ValidationIssue {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: IssueSeverity::Error,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.severity, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    pub fn single(message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue::error(message)],
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .issues
            .iter()
            .map(|issue| issue.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

fn raise_if_any(issues: Vec<ValidationIssue>) -> Result<(), ValidationError> {
    if issues
        .iter()
        .any(|issue| issue.severity == IssueSeverity::Error)
    {
        return Err(ValidationError::new(issues));
    }
    Ok(())
}

/// A product is eligible for billing only with an activation date and at
/// least one price entry.
pub fn validate_product(product: &Product) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    if product.product_price.is_empty() {
        issues.push(ValidationIssue::error(format!(
            "product '{}' must have at least one price entry",
            product.id
        )));
    }
    if product.start_date.is_none() {
        issues.push(ValidationIssue::error(format!(
            "product '{}' must have an activation date",
            product.id
        )));
    }

    raise_if_any(issues)?;
    debug!(product = %product.id, "product validation successful");
    Ok(())
}

/// A catalog price must declare a lifecycle status; a non-bundled price
/// must carry a charge kind, a bundled one its sub-price references, and
/// a recurring one its period.
pub fn validate_price_spec(spec: &PriceSpec) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    if spec
        .lifecycle_status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .is_none()
    {
        issues.push(ValidationIssue::error(format!(
            "price spec '{}' must have a lifecycle status",
            spec.id
        )));
    }

    if spec.is_bundle() {
        if spec.bundled_refs.is_empty() {
            issues.push(ValidationIssue::error(format!(
                "price spec '{}' is bundled but has no bundled sub-prices",
                spec.id
            )));
        }
    } else if spec
        .price_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .is_none()
    {
        issues.push(ValidationIssue::error(format!(
            "price spec '{}' (not bundled) must have a price type",
            spec.id
        )));
    }

    if spec.charge_kind().map(|k| k.is_recurring()).unwrap_or(false)
        && spec.recurring_spec().is_none()
    {
        issues.push(ValidationIssue::error(format!(
            "price spec '{}' (recurring) must have a valid recurring charge period",
            spec.id
        )));
    }

    raise_if_any(issues)?;
    debug!(price_spec = %spec.id, "price spec validation successful");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::models::{ChargeableItem, Ref};

    fn base_product() -> Product {
        Product {
            id: "prod-1".into(),
            name: None,
            status: "active".into(),
            start_date: Some("2025-01-01T00:00:00Z".parse().unwrap()),
            billing_account: None,
            related_party: vec![],
            product_price: vec![ChargeableItem {
                name: None,
                price_type: "recurring".into(),
                recurring_charge_period: Some("1 month".into()),
                price_ref: None,
            }],
        }
    }

    #[test]
    fn product_without_activation_date_is_invalid() {
        let mut product = base_product();
        product.start_date = None;
        let err = validate_product(&product).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.to_string().contains("activation date"));
    }

    #[test]
    fn product_without_prices_collects_all_issues() {
        let mut product = base_product();
        product.start_date = None;
        product.product_price.clear();
        let err = validate_product(&product).unwrap_err();
        assert_eq!(err.issues.len(), 2);
    }

    #[test]
    fn bundle_without_children_is_invalid() {
        let spec = PriceSpec {
            id: "pop-1".into(),
            lifecycle_status: Some("launched".into()),
            is_bundle: Some(true),
            price_type: None,
            recurring_charge_period_type: None,
            recurring_charge_period_length: None,
            bundled_refs: vec![],
        };
        assert!(validate_price_spec(&spec).is_err());
    }

    #[test]
    fn recurring_spec_without_period_is_invalid() {
        let spec = PriceSpec {
            id: "pop-2".into(),
            lifecycle_status: Some("launched".into()),
            is_bundle: Some(false),
            price_type: Some("recurring".into()),
            recurring_charge_period_type: None,
            recurring_charge_period_length: None,
            bundled_refs: vec![],
        };
        assert!(validate_price_spec(&spec).is_err());

        let valid = PriceSpec {
            recurring_charge_period_type: Some("month".into()),
            recurring_charge_period_length: Some(1),
            ..spec
        };
        assert!(validate_price_spec(&valid).is_ok());
    }

    #[test]
    fn one_time_spec_needs_no_period() {
        let spec = PriceSpec {
            id: "pop-3".into(),
            lifecycle_status: Some("launched".into()),
            is_bundle: Some(false),
            price_type: Some("one-time".into()),
            recurring_charge_period_type: None,
            recurring_charge_period_length: None,
            bundled_refs: vec![Ref::new("ignored")],
        };
        assert!(validate_price_spec(&spec).is_ok());
    }
}
