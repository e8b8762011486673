//! Entry validation rules.
//!
//! Validation is a pure function of the entry and an explicit context; it
//! never reads session or cache state itself. Every rule runs independently
//! and all violations are reported together so the form can list them inline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entry::{Entry, EntryField, Product};

pub const OPEN_SL_MAX: f64 = 70_000.0;
pub const RATE_MIN: f64 = 1.0;
pub const RATE_MAX: f64 = 50.0;
pub const READING_ORDER_MESSAGE: &str = "Closing reading must be greater than opening reading";

/// One broken rule. `field` is the wire name of the offending field, when the
/// rule is about a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Violation {
    fn on(field: EntryField, message: String) -> Self {
        Self {
            field: Some(field.wire_name().to_string()),
            message,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Cross-product cash check: the designated product's cash-to-bank plus its
/// companion's must match the bank lodgement within `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashVarianceRule {
    pub product: Product,
    pub companion: Product,
    pub threshold: f64,
}

impl Default for CashVarianceRule {
    fn default() -> Self {
        Self {
            product: Product::Diesel,
            companion: Product::Super,
            threshold: 100.0,
        }
    }
}

/// Everything validation needs beyond the entry itself.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext<'a> {
    pub cash_variance: Option<&'a CashVarianceRule>,
    /// Companion product's cash-to-bank for the same station and day, when
    /// one was recorded earlier.
    pub companion_cash_to_bank: Option<f64>,
}

/// Validate an entry without any cross-entry context.
pub fn validate_entry(entry: &Entry) -> Vec<Violation> {
    validate(entry, &ValidationContext::default())
}

pub fn validate(entry: &Entry, ctx: &ValidationContext<'_>) -> Vec<Violation> {
    let mut violations = Vec::new();

    for field in EntryField::MANDATORY {
        if !entry.has(field) {
            violations.push(Violation::on(field, format!("{field} is required")));
        }
    }

    if let Some(open_sl) = entry.inputs.open_sl {
        if !(0.0..=OPEN_SL_MAX).contains(&open_sl) {
            violations.push(Violation::on(
                EntryField::OpenSL,
                format!("openSL must be between 0 and {OPEN_SL_MAX:.0} litres"),
            ));
        }
    }

    if let Some(rate) = entry.inputs.rate {
        if !(RATE_MIN..=RATE_MAX).contains(&rate) {
            violations.push(Violation::on(
                EntryField::Rate,
                format!("rate must be between {RATE_MIN:.0} and {RATE_MAX:.0}"),
            ));
        }
    }

    if let (Some(open), Some(close)) = (entry.inputs.open_sr, entry.inputs.closing_sr) {
        if close <= open {
            violations.push(Violation::on(
                EntryField::ClosingSR,
                READING_ORDER_MESSAGE.to_string(),
            ));
        }
    }

    if let Some(v) = cash_variance_violation(entry, ctx) {
        violations.push(v);
    }

    violations
}

fn cash_variance_violation(entry: &Entry, ctx: &ValidationContext<'_>) -> Option<Violation> {
    let rule = ctx.cash_variance?;
    if entry.product != Some(rule.product) {
        return None;
    }
    let companion = ctx.companion_cash_to_bank?;
    let own = entry.derived.cash_to_bank?;
    let lodged = entry.inputs.bank_lodgement?;

    let variance = (companion + own - lodged).abs();
    if variance <= rule.threshold {
        return None;
    }
    Some(Violation::on(
        EntryField::BankLodgement,
        format!(
            "Cash variance of \u{20b5}{variance:.2} between {} + {} cash to bank and bank lodgement exceeds \u{20b5}{:.2}",
            rule.product, rule.companion, rule.threshold
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryInputs;
    use crate::reconcile;
    use chrono::NaiveDate;

    fn complete_entry() -> Entry {
        reconcile::derive(Entry {
            date: NaiveDate::from_ymd_opt(2026, 10, 16),
            product: Some(Product::Super),
            station_id: "st-1".into(),
            inputs: EntryInputs {
                open_sl: Some(8500.0),
                supply: Some(15000.0),
                overage_shortage_l: Some(0.0),
                closing_sl: Some(6200.0),
                open_sr: Some(125680.0),
                closing_sr: Some(143280.0),
                return_tt: Some(300.0),
                rate: Some(15.85),
                credit_sales: Some(14000.0),
                advances: Some(5000.0),
                shortage_momo: Some(2000.0),
                repayment_shortage_momo: Some(1500.0),
                repayment_advances: Some(3000.0),
                received_from_debtors: Some(8000.0),
                bank_lodgement: Some(265705.0),
            },
            ..Entry::default()
        })
    }

    fn messages(v: &[Violation]) -> Vec<&str> {
        v.iter().map(|v| v.message.as_str()).collect()
    }

    #[test]
    fn complete_entry_is_clean() {
        assert!(validate_entry(&complete_entry()).is_empty());
    }

    #[test]
    fn every_missing_mandatory_field_is_reported() {
        let violations = validate_entry(&Entry::default());
        let msgs = messages(&violations);
        for expected in [
            "date is required",
            "product is required",
            "openSL is required",
            "closingSL is required",
            "openSR is required",
            "closingSR is required",
            "rate is required",
            "bankLodgement is required",
        ] {
            assert!(msgs.contains(&expected), "missing {expected:?} in {msgs:?}");
        }
        assert_eq!(violations.len(), 8);
    }

    #[test]
    fn closing_reading_must_exceed_opening() {
        let mut entry = complete_entry();
        entry.inputs.open_sr = Some(100000.0);
        entry.inputs.closing_sr = Some(100000.0);
        assert_eq!(messages(&validate_entry(&entry)), vec![READING_ORDER_MESSAGE]);

        entry.inputs.closing_sr = Some(99999.0);
        assert_eq!(messages(&validate_entry(&entry)), vec![READING_ORDER_MESSAGE]);
    }

    #[test]
    fn opening_stock_range_is_inclusive() {
        let mut entry = complete_entry();
        entry.inputs.open_sl = Some(70000.0);
        assert!(validate_entry(&entry).is_empty());

        entry.inputs.open_sl = Some(75000.0);
        let violations = validate_entry(&entry);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field.as_deref(), Some("openSL"));
        assert!(violations[0].message.contains("70000"));
    }

    #[test]
    fn rate_range_is_checked() {
        let mut entry = complete_entry();
        entry.inputs.rate = Some(0.5);
        assert_eq!(validate_entry(&entry)[0].field.as_deref(), Some("rate"));
        entry.inputs.rate = Some(50.0);
        assert!(validate_entry(&entry).is_empty());
        entry.inputs.rate = Some(50.01);
        assert_eq!(validate_entry(&entry).len(), 1);
    }

    #[test]
    fn rules_do_not_short_circuit() {
        let mut entry = complete_entry();
        entry.inputs.rate = None;
        entry.inputs.open_sl = Some(80000.0);
        entry.inputs.closing_sr = Some(1.0);
        assert_eq!(validate_entry(&entry).len(), 3);
    }

    #[test]
    fn companion_variance_only_applies_to_designated_product() {
        let rule = CashVarianceRule::default();
        let mut entry = complete_entry();
        // Lodgement covers this product's cash only; companion adds 500 more.
        let ctx = ValidationContext {
            cash_variance: Some(&rule),
            companion_cash_to_bank: Some(500.0),
        };
        assert!(validate(&entry, &ctx).is_empty(), "Super is not the designated product");

        entry.product = Some(Product::Diesel);
        let violations = validate(&entry, &ctx);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field.as_deref(), Some("bankLodgement"));

        // Within threshold once the companion cash is lodged too.
        entry.inputs.bank_lodgement = Some(265705.0 + 450.0);
        assert!(validate(&entry, &ctx).is_empty());
    }

    #[test]
    fn variance_threshold_is_inclusive() {
        let rule = CashVarianceRule::default();
        let mut entry = complete_entry();
        entry.product = Some(Product::Diesel);
        let ctx = ValidationContext {
            cash_variance: Some(&rule),
            companion_cash_to_bank: Some(500.0),
        };

        entry.inputs.bank_lodgement = Some(265705.0 + 500.0 - 100.0);
        assert!(validate(&entry, &ctx).is_empty());

        entry.inputs.bank_lodgement = Some(265705.0 + 500.0 - 100.01);
        let violations = validate(&entry, &ctx);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("100.01"), "{}", violations[0].message);
    }

    #[test]
    fn variance_skipped_without_cached_companion_value() {
        let rule = CashVarianceRule::default();
        let mut entry = complete_entry();
        entry.product = Some(Product::Diesel);
        entry.inputs.bank_lodgement = Some(1.0);
        let ctx = ValidationContext {
            cash_variance: Some(&rule),
            companion_cash_to_bank: None,
        };
        assert!(validate(&entry, &ctx).is_empty());
    }
}
