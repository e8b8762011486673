//! Daily sales reconciliation chain.
//!
//! Derives stock balance, sales volume and cash figures from the inputs of an
//! [`Entry`]. Each step runs only when all of its inputs are present, so a
//! half-filled form still shows whatever can already be computed. Values are
//! never rounded or clamped here; shortages are meaningful negatives.

use crate::entry::{DerivedFields, Entry, EntryInputs};

/// Recompute every derived field of `entry` from its inputs.
///
/// Previously derived values are discarded first, so the result depends only
/// on the inputs and applying it twice gives the same entry.
pub fn derive(mut entry: Entry) -> Entry {
    entry.derived = derive_fields(&entry.inputs);
    entry
}

/// The derivation chain itself, in dependency order.
pub fn derive_fields(i: &EntryInputs) -> DerivedFields {
    // 1. stock available = opening stock + supply + overage/shortage
    let available_l = sum3(i.open_sl, i.supply, i.overage_shortage_l);
    // 2. stock check = available - closing stock
    let check_l = both(available_l, i.closing_sl).map(|(a, c)| a - c);
    // 3. metered sales = closing reading - opening reading - returned to tank
    let sales_l = match (i.closing_sr, i.open_sr, i.return_tt) {
        (Some(close), Some(open), Some(ret)) => Some(close - open - ret),
        _ => None,
    };
    // 4. difference between metered and stock-based sales
    let difference_l = both(sales_l, check_l).map(|(s, c)| s - c);
    // 5. sales value
    let value = both(i.rate, sales_l).map(|(r, s)| r * s);
    // 6. cash sales = value - credit sales
    let cash_sales = both(value, i.credit_sales).map(|(v, c)| v - c);
    // 7. cash available = cash sales - advances - momo shortage
    let cash_available = match (cash_sales, i.advances, i.shortage_momo) {
        (Some(cs), Some(adv), Some(momo)) => Some(cs - adv - momo),
        _ => None,
    };
    // 8. cash to bank = cash available + repayments + debtor receipts
    let cash_to_bank = match (
        cash_available,
        i.repayment_shortage_momo,
        i.repayment_advances,
        i.received_from_debtors,
    ) {
        (Some(ca), Some(rsm), Some(ra), Some(rfd)) => Some(ca + rsm + ra + rfd),
        _ => None,
    };

    DerivedFields {
        available_l,
        check_l,
        sales_l,
        difference_l,
        value,
        cash_sales,
        cash_available,
        cash_to_bank,
    }
}

fn both(a: Option<f64>, b: Option<f64>) -> Option<(f64, f64)> {
    Some((a?, b?))
}

fn sum3(a: Option<f64>, b: Option<f64>, c: Option<f64>) -> Option<f64> {
    Some(a? + b? + c?)
}
