//! Daily reconciliation entry model.
//!
//! An [`Entry`] is one product's sales/stock record for one station on one
//! date. User input goes through [`EntryDraft`], which accepts updates keyed
//! by the backend's wire field names, rejects unknown or derived fields, and
//! re-runs the derivation chain after every accepted change.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LedgerError, Result};
use crate::reconcile;

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// Fuel product. Older stations still send the legacy codes PMS/AGO/LPG,
/// which map onto Super/Diesel/Gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    #[serde(alias = "PMS", alias = "SUPER", alias = "super")]
    Super,
    #[serde(alias = "REGULAR", alias = "regular")]
    Regular,
    #[serde(alias = "AGO", alias = "DIESEL", alias = "diesel")]
    Diesel,
    #[serde(alias = "LPG", alias = "GAS", alias = "gas")]
    Gas,
    #[serde(alias = "KEROSENE", alias = "kerosene", alias = "DPK")]
    Kerosene,
}

impl Product {
    pub const ALL: [Product; 5] = [
        Product::Super,
        Product::Regular,
        Product::Diesel,
        Product::Gas,
        Product::Kerosene,
    ];

    /// Parse a product name or legacy code, case-insensitively.
    pub fn parse(raw: &str) -> Option<Product> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUPER" | "PMS" => Some(Product::Super),
            "REGULAR" => Some(Product::Regular),
            "DIESEL" | "AGO" => Some(Product::Diesel),
            "GAS" | "LPG" => Some(Product::Gas),
            "KEROSENE" | "DPK" => Some(Product::Kerosene),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Super => "Super",
            Product::Regular => "Regular",
            Product::Diesel => "Diesel",
            Product::Gas => "Gas",
            Product::Kerosene => "Kerosene",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published reference rate (currency per litre) for each product. Used to
/// pre-fill `rate` when a product is picked on a fresh entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRates(HashMap<Product, f64>);

impl ReferenceRates {
    pub fn new(rates: HashMap<Product, f64>) -> Self {
        Self(rates)
    }

    pub fn get(&self, product: Product) -> Option<f64> {
        self.0.get(&product).copied()
    }

    pub fn set(&mut self, product: Product, rate: f64) {
        self.0.insert(product, rate);
    }
}

impl Default for ReferenceRates {
    fn default() -> Self {
        Self(HashMap::from([
            (Product::Super, 15.85),
            (Product::Regular, 14.95),
            (Product::Diesel, 16.20),
            (Product::Gas, 13.50),
            (Product::Kerosene, 12.80),
        ]))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    #[default]
    Draft,
    Submitted,
    Validated,
    Approved,
    Rejected,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Draft => "DRAFT",
            EntryStatus::Submitted => "SUBMITTED",
            EntryStatus::Validated => "VALIDATED",
            EntryStatus::Approved => "APPROVED",
            EntryStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> Option<EntryStatus> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Some(EntryStatus::Draft),
            "SUBMITTED" => Some(EntryStatus::Submitted),
            "VALIDATED" => Some(EntryStatus::Validated),
            "APPROVED" => Some(EntryStatus::Approved),
            "REJECTED" => Some(EntryStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// User-editable fields, named as the backend names them on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryField {
    Date,
    Product,
    Notes,
    OpenSL,
    Supply,
    OverageShortageL,
    ClosingSL,
    OpenSR,
    ClosingSR,
    ReturnTT,
    Rate,
    CreditSales,
    Advances,
    ShortageMomo,
    RepaymentShortageMomo,
    RepaymentAdvances,
    ReceivedFromDebtors,
    BankLodgement,
}

/// Wire names of the derived fields. Accepted on read, refused on write.
pub const DERIVED_FIELDS: [&str; 8] = [
    "availableL",
    "checkL",
    "salesL",
    "differenceL",
    "value",
    "cashSales",
    "cashAvailable",
    "cashToBank",
];

impl EntryField {
    pub const NUMERIC: [EntryField; 15] = [
        EntryField::OpenSL,
        EntryField::Supply,
        EntryField::OverageShortageL,
        EntryField::ClosingSL,
        EntryField::OpenSR,
        EntryField::ClosingSR,
        EntryField::ReturnTT,
        EntryField::Rate,
        EntryField::CreditSales,
        EntryField::Advances,
        EntryField::ShortageMomo,
        EntryField::RepaymentShortageMomo,
        EntryField::RepaymentAdvances,
        EntryField::ReceivedFromDebtors,
        EntryField::BankLodgement,
    ];

    /// Fields that must be present before an entry can be submitted.
    pub const MANDATORY: [EntryField; 8] = [
        EntryField::Date,
        EntryField::Product,
        EntryField::OpenSL,
        EntryField::ClosingSL,
        EntryField::OpenSR,
        EntryField::ClosingSR,
        EntryField::Rate,
        EntryField::BankLodgement,
    ];

    pub fn wire_name(&self) -> &'static str {
        match self {
            EntryField::Date => "date",
            EntryField::Product => "product",
            EntryField::Notes => "notes",
            EntryField::OpenSL => "openSL",
            EntryField::Supply => "supply",
            EntryField::OverageShortageL => "overageShortageL",
            EntryField::ClosingSL => "closingSL",
            EntryField::OpenSR => "openSR",
            EntryField::ClosingSR => "closingSR",
            EntryField::ReturnTT => "returnTT",
            EntryField::Rate => "rate",
            EntryField::CreditSales => "creditSales",
            EntryField::Advances => "advances",
            EntryField::ShortageMomo => "shortageMomo",
            EntryField::RepaymentShortageMomo => "repaymentShortageMomo",
            EntryField::RepaymentAdvances => "repaymentAdvances",
            EntryField::ReceivedFromDebtors => "receivedFromDebtors",
            EntryField::BankLodgement => "bankLodgement",
        }
    }

    /// Resolve a wire name. Derived names are reported as read-only, anything
    /// else unknown as an unknown field.
    pub fn from_wire(name: &str) -> Result<EntryField> {
        let field = match name {
            "date" => EntryField::Date,
            "product" => EntryField::Product,
            "notes" => EntryField::Notes,
            "openSL" => EntryField::OpenSL,
            "supply" => EntryField::Supply,
            "overageShortageL" => EntryField::OverageShortageL,
            "closingSL" => EntryField::ClosingSL,
            "openSR" => EntryField::OpenSR,
            "closingSR" => EntryField::ClosingSR,
            "returnTT" => EntryField::ReturnTT,
            "rate" => EntryField::Rate,
            "creditSales" => EntryField::CreditSales,
            "advances" => EntryField::Advances,
            "shortageMomo" => EntryField::ShortageMomo,
            "repaymentShortageMomo" => EntryField::RepaymentShortageMomo,
            "repaymentAdvances" => EntryField::RepaymentAdvances,
            "receivedFromDebtors" => EntryField::ReceivedFromDebtors,
            "bankLodgement" => EntryField::BankLodgement,
            other if DERIVED_FIELDS.contains(&other) => {
                return Err(LedgerError::ReadOnlyField(other.to_string()))
            }
            other => return Err(LedgerError::UnknownField(other.to_string())),
        };
        Ok(field)
    }

    pub fn is_numeric(&self) -> bool {
        Self::NUMERIC.contains(self)
    }

    /// `overageShortageL` is the only signed input.
    pub fn allows_negative(&self) -> bool {
        matches!(self, EntryField::OverageShortageL)
    }
}

impl fmt::Display for EntryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// User-entered quantities. Absent means "not entered yet".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInputs {
    #[serde(rename = "openSL", default, skip_serializing_if = "Option::is_none")]
    pub open_sl: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply: Option<f64>,
    #[serde(rename = "overageShortageL", default, skip_serializing_if = "Option::is_none")]
    pub overage_shortage_l: Option<f64>,
    #[serde(rename = "closingSL", default, skip_serializing_if = "Option::is_none")]
    pub closing_sl: Option<f64>,
    #[serde(rename = "openSR", default, skip_serializing_if = "Option::is_none")]
    pub open_sr: Option<f64>,
    #[serde(rename = "closingSR", default, skip_serializing_if = "Option::is_none")]
    pub closing_sr: Option<f64>,
    #[serde(rename = "returnTT", default, skip_serializing_if = "Option::is_none")]
    pub return_tt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_sales: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advances: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortage_momo: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repayment_shortage_momo: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repayment_advances: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_from_debtors: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_lodgement: Option<f64>,
}

impl EntryInputs {
    /// Read a numeric input. Non-numeric fields read as `None`.
    pub fn get(&self, field: EntryField) -> Option<f64> {
        match field {
            EntryField::OpenSL => self.open_sl,
            EntryField::Supply => self.supply,
            EntryField::OverageShortageL => self.overage_shortage_l,
            EntryField::ClosingSL => self.closing_sl,
            EntryField::OpenSR => self.open_sr,
            EntryField::ClosingSR => self.closing_sr,
            EntryField::ReturnTT => self.return_tt,
            EntryField::Rate => self.rate,
            EntryField::CreditSales => self.credit_sales,
            EntryField::Advances => self.advances,
            EntryField::ShortageMomo => self.shortage_momo,
            EntryField::RepaymentShortageMomo => self.repayment_shortage_momo,
            EntryField::RepaymentAdvances => self.repayment_advances,
            EntryField::ReceivedFromDebtors => self.received_from_debtors,
            EntryField::BankLodgement => self.bank_lodgement,
            EntryField::Date | EntryField::Product | EntryField::Notes => None,
        }
    }

    fn slot(&mut self, field: EntryField) -> Option<&mut Option<f64>> {
        let slot = match field {
            EntryField::OpenSL => &mut self.open_sl,
            EntryField::Supply => &mut self.supply,
            EntryField::OverageShortageL => &mut self.overage_shortage_l,
            EntryField::ClosingSL => &mut self.closing_sl,
            EntryField::OpenSR => &mut self.open_sr,
            EntryField::ClosingSR => &mut self.closing_sr,
            EntryField::ReturnTT => &mut self.return_tt,
            EntryField::Rate => &mut self.rate,
            EntryField::CreditSales => &mut self.credit_sales,
            EntryField::Advances => &mut self.advances,
            EntryField::ShortageMomo => &mut self.shortage_momo,
            EntryField::RepaymentShortageMomo => &mut self.repayment_shortage_momo,
            EntryField::RepaymentAdvances => &mut self.repayment_advances,
            EntryField::ReceivedFromDebtors => &mut self.received_from_debtors,
            EntryField::BankLodgement => &mut self.bank_lodgement,
            EntryField::Date | EntryField::Product | EntryField::Notes => return None,
        };
        Some(slot)
    }
}

/// Values computed by [`reconcile::derive`]. Never set by users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedFields {
    #[serde(rename = "availableL", default, skip_serializing_if = "Option::is_none")]
    pub available_l: Option<f64>,
    #[serde(rename = "checkL", default, skip_serializing_if = "Option::is_none")]
    pub check_l: Option<f64>,
    #[serde(rename = "salesL", default, skip_serializing_if = "Option::is_none")]
    pub sales_l: Option<f64>,
    #[serde(rename = "differenceL", default, skip_serializing_if = "Option::is_none")]
    pub difference_l: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_sales: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_available: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_to_bank: Option<f64>,
}

/// Who moved the entry through its workflow, and when.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleStamps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_comments: Option<String>,
    #[serde(default)]
    pub edit_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_requested_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_request_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
    #[serde(default)]
    pub station_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_name: Option<String>,
    #[serde(flatten)]
    pub inputs: EntryInputs,
    #[serde(flatten)]
    pub derived: DerivedFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: EntryStatus,
    #[serde(flatten)]
    pub stamps: LifecycleStamps,
}

impl Entry {
    /// Whether a mandatory (or any editable) field currently has a value.
    pub fn has(&self, field: EntryField) -> bool {
        match field {
            EntryField::Date => self.date.is_some(),
            EntryField::Product => self.product.is_some(),
            EntryField::Notes => self.notes.as_deref().is_some_and(|n| !n.trim().is_empty()),
            numeric => self.inputs.get(numeric).is_some(),
        }
    }

    /// Entries can only be edited before they leave the station.
    pub fn is_editable(&self) -> bool {
        self.status == EntryStatus::Draft
    }
}

// ---------------------------------------------------------------------------
// Draft (field-keyed editing)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateSource {
    Unset,
    Reference,
    Carried,
    User,
}

/// An entry being edited in the current session.
///
/// Every accepted update re-derives the computed fields, so the wrapped entry
/// is always consistent with its inputs.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    entry: Entry,
    rates: ReferenceRates,
    rate_source: RateSource,
}

impl EntryDraft {
    pub fn new(station_id: &str, station_name: Option<&str>, rates: ReferenceRates) -> Self {
        let entry = Entry {
            station_id: station_id.to_string(),
            station_name: station_name.map(str::to_string),
            ..Entry::default()
        };
        Self {
            entry,
            rates,
            rate_source: RateSource::Unset,
        }
    }

    /// Resume editing an existing entry. A rate already on the entry counts
    /// as user-entered and is never replaced by a product change.
    pub fn from_entry(entry: Entry, rates: ReferenceRates) -> Self {
        let rate_source = if entry.inputs.rate.is_some() {
            RateSource::User
        } else {
            RateSource::Unset
        };
        Self {
            entry: reconcile::derive(entry),
            rates,
            rate_source,
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn into_entry(self) -> Entry {
        self.entry
    }

    pub fn set_date(&mut self, date: Option<NaiveDate>) {
        self.entry.date = date;
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.entry.notes = notes.filter(|n| !n.trim().is_empty());
    }

    /// Select a product. Fills `rate` from the reference table only while no
    /// rate has been set in this session.
    pub fn set_product(&mut self, product: Option<Product>) {
        self.entry.product = product;
        if let Some(p) = product {
            if self.rate_source == RateSource::Unset {
                if let Some(reference) = self.rates.get(p) {
                    self.entry.inputs.rate = Some(reference);
                    self.rate_source = RateSource::Reference;
                }
            }
        }
        self.rederive();
    }

    /// Set (or clear, with `None`) one numeric input.
    pub fn set_number(&mut self, field: EntryField, value: Option<f64>) -> Result<()> {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(LedgerError::Decode(format!("{field} must be a finite number")));
            }
            if v < 0.0 && !field.allows_negative() {
                return Err(LedgerError::Decode(format!("{field} cannot be negative")));
            }
        }
        let slot = self
            .entry
            .inputs
            .slot(field)
            .ok_or_else(|| LedgerError::Decode(format!("{field} is not numeric")))?;
        *slot = value;
        if field == EntryField::Rate {
            self.rate_source = if value.is_some() {
                RateSource::User
            } else {
                RateSource::Unset
            };
        }
        self.rederive();
        Ok(())
    }

    /// Apply one form update keyed by wire name. `null` clears the field;
    /// numeric fields accept numbers or numeric strings.
    pub fn apply(&mut self, name: &str, value: &Value) -> Result<()> {
        let field = EntryField::from_wire(name)?;
        match field {
            EntryField::Date => {
                let date = match value {
                    Value::Null => None,
                    Value::String(s) if s.trim().is_empty() => None,
                    Value::String(s) => Some(
                        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                            .map_err(|e| LedgerError::Decode(format!("date: {e}")))?,
                    ),
                    other => return Err(LedgerError::Decode(format!("date: expected string, got {other}"))),
                };
                self.set_date(date);
            }
            EntryField::Product => {
                let product = match value {
                    Value::Null => None,
                    Value::String(s) => Some(
                        Product::parse(s)
                            .ok_or_else(|| LedgerError::Decode(format!("unknown product: {s}")))?,
                    ),
                    other => {
                        return Err(LedgerError::Decode(format!("product: expected string, got {other}")))
                    }
                };
                self.set_product(product);
            }
            EntryField::Notes => {
                let notes = match value {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                };
                self.set_notes(notes);
            }
            numeric => {
                let number = parse_number(numeric, value)?;
                self.set_number(numeric, number)?;
            }
        }
        Ok(())
    }

    /// Apply a whole JSON object of updates. Every key is checked before any
    /// is applied, so a patch with one bad key changes nothing.
    pub fn apply_patch(&mut self, patch: &Value) -> Result<()> {
        let obj = patch
            .as_object()
            .ok_or_else(|| LedgerError::Decode("patch must be a JSON object".into()))?;
        for (name, value) in obj {
            let field = EntryField::from_wire(name)?;
            if field.is_numeric() {
                parse_number(field, value)?;
            }
        }
        let mut staged = self.clone();
        for (name, value) in obj {
            staged.apply(name, value)?;
        }
        *self = staged;
        Ok(())
    }

    /// Carry yesterday's closing readings forward as today's openings, and
    /// its rate when none is set yet.
    pub fn carry_forward(&mut self, previous: &Entry) {
        let inputs = &mut self.entry.inputs;
        if let Some(closing) = previous.inputs.closing_sl {
            inputs.open_sl = Some(closing);
        }
        if let Some(closing) = previous.inputs.closing_sr {
            inputs.open_sr = Some(closing);
        }
        if inputs.rate.is_none() {
            if let Some(rate) = previous.inputs.rate {
                inputs.rate = Some(rate);
                self.rate_source = RateSource::Carried;
            }
        }
        self.rederive();
    }

    fn rederive(&mut self) {
        self.entry = reconcile::derive(std::mem::take(&mut self.entry));
    }
}

fn parse_number(field: EntryField, value: &Value) -> Result<Option<f64>> {
    let number = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| LedgerError::Decode(format!("{field} must be a number")))?;

    if number < 0.0 && !field.allows_negative() {
        return Err(LedgerError::Decode(format!("{field} cannot be negative")));
    }
    Ok(Some(number))
}
