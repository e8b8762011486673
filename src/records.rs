//! Price changes, inter-station product sharing and utility bills.
//!
//! Plain records with a status each. Status changes are driven by the
//! backend; the client only checks role and current status before asking,
//! and can mirror an accepted change locally when running without a backend.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::Product;
use crate::error::{LedgerError, Result};
use crate::session::{Role, Session};
use crate::validation::{Violation, RATE_MAX, RATE_MIN};

fn forbidden(session: &Session, action: &str) -> LedgerError {
    LedgerError::Forbidden {
        role: session.role().to_string(),
        action: action.to_string(),
    }
}

fn invalid(from: impl fmt::Display, action: &str) -> LedgerError {
    LedgerError::InvalidTransition {
        from: from.to_string(),
        action: action.to_string(),
    }
}

fn required(value: &str, name: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::MissingReason(name));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Price changes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceChangeStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for PriceChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PriceChangeStatus::Pending => "PENDING",
            PriceChangeStatus::Approved => "APPROVED",
            PriceChangeStatus::Rejected => "REJECTED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceChange {
    pub id: String,
    pub product: Product,
    /// `None` for a network-wide change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    pub proposed_price: f64,
    pub effective_date: NaiveDate,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub status: PriceChangeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPriceChange {
    pub product: Product,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    pub proposed_price: f64,
    pub effective_date: NaiveDate,
    pub reason: String,
}

impl NewPriceChange {
    /// Same price bounds as the entry `rate` field.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();
        if !(RATE_MIN..=RATE_MAX).contains(&self.proposed_price) {
            violations.push(Violation {
                field: Some("proposedPrice".into()),
                message: format!("proposedPrice must be between {RATE_MIN:.0} and {RATE_MAX:.0}"),
            });
        }
        if self.reason.trim().is_empty() {
            violations.push(Violation {
                field: Some("reason".into()),
                message: "reason is required".into(),
            });
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation(violations))
        }
    }

    /// Record as the backend would create it, for local-only use.
    pub fn into_local(self, id: String, requested_by: &str) -> PriceChange {
        PriceChange {
            id,
            product: self.product,
            station_id: self.station_id,
            current_price: None,
            proposed_price: self.proposed_price,
            effective_date: self.effective_date,
            reason: self.reason,
            requested_by: Some(requested_by.to_string()),
            status: PriceChangeStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
        }
    }
}

impl PriceChange {
    /// Only a super admin reviews price changes, and only while pending.
    /// Rejections need a reason.
    pub fn check_review(&self, session: &Session, approve: bool, reason: Option<&str>) -> Result<()> {
        let action = if approve { "approve price change" } else { "reject price change" };
        if session.role() != Role::SuperAdmin {
            return Err(forbidden(session, action));
        }
        if self.status != PriceChangeStatus::Pending {
            return Err(invalid(self.status, action));
        }
        if !approve {
            required(reason.unwrap_or_default(), "rejection reason")?;
        }
        Ok(())
    }

    pub fn apply_review(&mut self, approve: bool, reason: Option<&str>, actor: &str, at: DateTime<Utc>) {
        self.status = if approve {
            PriceChangeStatus::Approved
        } else {
            PriceChangeStatus::Rejected
        };
        self.reviewed_by = Some(actor.to_string());
        self.reviewed_at = Some(at);
        if !approve {
            self.rejection_reason = reason.map(|r| r.trim().to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Product sharing supply
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplyStatus {
    #[default]
    Pending,
    Approved,
    Confirmed,
    Received,
}

impl fmt::Display for SupplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SupplyStatus::Pending => "PENDING",
            SupplyStatus::Approved => "APPROVED",
            SupplyStatus::Confirmed => "CONFIRMED",
            SupplyStatus::Received => "RECEIVED",
        })
    }
}

/// Fuel moved from one station to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSharingSupply {
    pub id: String,
    pub product: Product,
    pub from_station_id: String,
    pub to_station_id: String,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_quantity: Option<f64>,
    pub supply_date: NaiveDate,
    #[serde(default)]
    pub status: SupplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSupply {
    pub product: Product,
    pub from_station_id: String,
    pub to_station_id: String,
    pub quantity: f64,
    pub supply_date: NaiveDate,
}

impl NewSupply {
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();
        if self.quantity.is_nan() || self.quantity <= 0.0 {
            violations.push(Violation {
                field: Some("quantity".into()),
                message: "quantity must be greater than zero".into(),
            });
        }
        if self.from_station_id.trim() == self.to_station_id.trim() {
            violations.push(Violation {
                field: Some("toStationId".into()),
                message: "receiving station must differ from the supplying station".into(),
            });
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation(violations))
        }
    }

    pub fn into_local(self, id: String, requested_by: &str) -> ProductSharingSupply {
        ProductSharingSupply {
            id,
            product: self.product,
            from_station_id: self.from_station_id,
            to_station_id: self.to_station_id,
            quantity: self.quantity,
            received_quantity: None,
            supply_date: self.supply_date,
            status: SupplyStatus::Pending,
            requested_by: Some(requested_by.to_string()),
            approved_by: None,
            confirmed_by: None,
            received_by: None,
            updated_at: None,
        }
    }
}

impl ProductSharingSupply {
    /// Role and status guard for moving to `to`.
    ///
    /// PENDING → APPROVED: admin or super admin.
    /// APPROVED → CONFIRMED: the receiving station's manager or an admin.
    /// CONFIRMED → RECEIVED: the receiving station's manager.
    pub fn check_transition(&self, session: &Session, to: SupplyStatus) -> Result<()> {
        let action = match to {
            SupplyStatus::Approved => "approve supply",
            SupplyStatus::Confirmed => "confirm supply",
            SupplyStatus::Received => "receive supply",
            SupplyStatus::Pending => return Err(invalid(self.status, "reopen supply")),
        };
        let expected_from = match to {
            SupplyStatus::Approved => SupplyStatus::Pending,
            SupplyStatus::Confirmed => SupplyStatus::Approved,
            _ => SupplyStatus::Confirmed,
        };
        let receiver = session.owns_station(&self.to_station_id);
        let allowed = match to {
            SupplyStatus::Approved => matches!(session.role(), Role::Admin | Role::SuperAdmin),
            SupplyStatus::Confirmed => receiver || session.role() == Role::Admin,
            _ => receiver,
        };
        if !allowed {
            return Err(forbidden(session, action));
        }
        if self.status != expected_from {
            return Err(invalid(self.status, action));
        }
        Ok(())
    }

    pub fn apply_transition(
        &mut self,
        to: SupplyStatus,
        received_quantity: Option<f64>,
        actor: &str,
        at: DateTime<Utc>,
    ) {
        let actor = Some(actor.to_string());
        match to {
            SupplyStatus::Approved => self.approved_by = actor,
            SupplyStatus::Confirmed => self.confirmed_by = actor,
            SupplyStatus::Received => {
                self.received_by = actor;
                self.received_quantity = received_quantity.or(Some(self.quantity));
            }
            SupplyStatus::Pending => {}
        }
        self.status = to;
        self.updated_at = Some(at);
    }
}

// ---------------------------------------------------------------------------
// Utility bills
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UtilityBillStatus {
    #[default]
    #[serde(alias = "PENDING")]
    Pending,
    #[serde(alias = "PAID")]
    Paid,
    #[serde(alias = "OVERDUE")]
    Overdue,
    #[serde(alias = "PROCESSING")]
    Processing,
}

impl fmt::Display for UtilityBillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UtilityBillStatus::Pending => "Pending",
            UtilityBillStatus::Paid => "Paid",
            UtilityBillStatus::Overdue => "Overdue",
            UtilityBillStatus::Processing => "Processing",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtilityKind {
    Electricity,
    Water,
    Internet,
    Telephone,
    Waste,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilityBill {
    pub id: String,
    pub station_id: String,
    pub kind: UtilityKind,
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    pub amount: f64,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub status: UtilityBillStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUtilityBill {
    pub station_id: String,
    pub kind: UtilityKind,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    pub amount: f64,
    pub due_date: NaiveDate,
}

impl NewUtilityBill {
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();
        if self.amount.is_nan() || self.amount <= 0.0 {
            violations.push(Violation {
                field: Some("amount".into()),
                message: "amount must be greater than zero".into(),
            });
        }
        if self.provider.trim().is_empty() {
            violations.push(Violation {
                field: Some("provider".into()),
                message: "provider is required".into(),
            });
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation(violations))
        }
    }

    pub fn into_local(self, id: String) -> UtilityBill {
        UtilityBill {
            id,
            station_id: self.station_id,
            kind: self.kind,
            provider: self.provider,
            account_number: self.account_number,
            amount: self.amount,
            due_date: self.due_date,
            status: UtilityBillStatus::Pending,
            paid_at: None,
            updated_by: None,
        }
    }
}

impl UtilityBill {
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.status == UtilityBillStatus::Pending && self.due_date < today
    }

    /// Admins and super admins move bills along; nobody moves a paid bill.
    pub fn check_transition(&self, session: &Session, to: UtilityBillStatus) -> Result<()> {
        let action = match to {
            UtilityBillStatus::Processing => "process bill",
            UtilityBillStatus::Paid => "mark bill paid",
            UtilityBillStatus::Overdue => "mark bill overdue",
            UtilityBillStatus::Pending => return Err(invalid(self.status, "reopen bill")),
        };
        if !matches!(session.role(), Role::Admin | Role::SuperAdmin) {
            return Err(forbidden(session, action));
        }
        let from_ok = match to {
            UtilityBillStatus::Processing => matches!(
                self.status,
                UtilityBillStatus::Pending | UtilityBillStatus::Overdue
            ),
            UtilityBillStatus::Paid => self.status == UtilityBillStatus::Processing,
            _ => self.status == UtilityBillStatus::Pending,
        };
        if !from_ok {
            return Err(invalid(self.status, action));
        }
        Ok(())
    }

    pub fn apply_transition(&mut self, to: UtilityBillStatus, actor: &str, at: DateTime<Utc>) {
        if to == UtilityBillStatus::Paid {
            self.paid_at = Some(at);
        }
        self.status = to;
        self.updated_by = Some(actor.to_string());
    }

    /// Display status: a pending bill past its due date reads as overdue even
    /// before anyone marks it.
    pub fn effective_status(&self, today: NaiveDate) -> UtilityBillStatus {
        if self.is_past_due(today) {
            UtilityBillStatus::Overdue
        } else {
            self.status
        }
    }
}
