//! Stand-in data shown when the backend cannot be reached and nothing is
//! cached. Every record is built through the same derivation as real input,
//! so totals on screen stay internally consistent.

use chrono::{Days, NaiveDate, Utc};
use uuid::Uuid;

use crate::entry::{Entry, EntryInputs, EntryStatus, Product, ReferenceRates};
use crate::records::{
    PriceChange, PriceChangeStatus, ProductSharingSupply, SupplyStatus, UtilityBill,
    UtilityBillStatus, UtilityKind,
};
use crate::reconcile;

const MOCK_STATION_ID: &str = "st-1";
const MOCK_STATION_NAME: &str = "Demo Station";

/// Id for a record that only exists on this device.
pub fn local_id(kind: &str) -> String {
    format!("local-{kind}-{}", Uuid::new_v4())
}

fn days_before(today: NaiveDate, n: u64) -> NaiveDate {
    today.checked_sub_days(Days::new(n)).unwrap_or(today)
}

fn sample_entry(
    station_id: &str,
    date: NaiveDate,
    product: Product,
    rate: f64,
    open_sr: f64,
    status: EntryStatus,
) -> Entry {
    let inputs = EntryInputs {
        open_sl: Some(8500.0),
        supply: Some(15000.0),
        overage_shortage_l: Some(0.0),
        closing_sl: Some(6200.0),
        open_sr: Some(open_sr),
        closing_sr: Some(open_sr + 17600.0),
        return_tt: Some(300.0),
        rate: Some(rate),
        credit_sales: Some(14000.0),
        advances: Some(5000.0),
        shortage_momo: Some(2000.0),
        repayment_shortage_momo: Some(1500.0),
        repayment_advances: Some(3000.0),
        received_from_debtors: Some(8000.0),
        bank_lodgement: None,
    };
    let mut entry = reconcile::derive(Entry {
        id: Some(format!("mock-{station_id}-{date}-{}", product.as_str().to_lowercase())),
        date: Some(date),
        product: Some(product),
        station_id: station_id.to_string(),
        station_name: Some(MOCK_STATION_NAME.to_string()),
        inputs,
        status,
        ..Entry::default()
    });
    entry.inputs.bank_lodgement = entry.derived.cash_to_bank;
    entry.stamps.entered_by = Some("Demo Manager".to_string());
    entry
}

/// A few days of entries across the workflow states.
pub fn entries(station_id: Option<&str>, today: NaiveDate) -> Vec<Entry> {
    let station = station_id.unwrap_or(MOCK_STATION_ID);
    let rates = ReferenceRates::default();
    let rate = |p: Product| rates.get(p).unwrap_or(15.0);
    vec![
        sample_entry(station, today, Product::Super, rate(Product::Super), 143_280.0, EntryStatus::Draft),
        sample_entry(station, today, Product::Diesel, rate(Product::Diesel), 98_410.0, EntryStatus::Submitted),
        sample_entry(
            station,
            days_before(today, 1),
            Product::Super,
            rate(Product::Super),
            125_680.0,
            EntryStatus::Validated,
        ),
        sample_entry(
            station,
            days_before(today, 2),
            Product::Gas,
            rate(Product::Gas),
            40_120.0,
            EntryStatus::Approved,
        ),
    ]
}

pub fn price_changes(today: NaiveDate) -> Vec<PriceChange> {
    vec![
        PriceChange {
            id: "mock-pc-1".into(),
            product: Product::Super,
            station_id: None,
            current_price: Some(15.85),
            proposed_price: 16.10,
            effective_date: today,
            reason: "Pricing window adjustment".into(),
            requested_by: Some("Demo Admin".into()),
            status: PriceChangeStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
        },
        PriceChange {
            id: "mock-pc-2".into(),
            product: Product::Diesel,
            station_id: Some(MOCK_STATION_ID.into()),
            current_price: Some(16.00),
            proposed_price: 16.20,
            effective_date: days_before(today, 7),
            reason: "Supplier increase".into(),
            requested_by: Some("Demo Admin".into()),
            status: PriceChangeStatus::Approved,
            reviewed_by: Some("Demo Director".into()),
            reviewed_at: Some(Utc::now()),
            rejection_reason: None,
        },
    ]
}

pub fn supplies(today: NaiveDate) -> Vec<ProductSharingSupply> {
    vec![ProductSharingSupply {
        id: "mock-ps-1".into(),
        product: Product::Diesel,
        from_station_id: "st-2".into(),
        to_station_id: MOCK_STATION_ID.into(),
        quantity: 4000.0,
        received_quantity: None,
        supply_date: today,
        status: SupplyStatus::Approved,
        requested_by: Some("Demo Manager".into()),
        approved_by: Some("Demo Admin".into()),
        confirmed_by: None,
        received_by: None,
        updated_at: None,
    }]
}

pub fn utility_bills(today: NaiveDate) -> Vec<UtilityBill> {
    vec![
        UtilityBill {
            id: "mock-ub-1".into(),
            station_id: MOCK_STATION_ID.into(),
            kind: UtilityKind::Electricity,
            provider: "Power Distribution".into(),
            account_number: Some("ACC-0042".into()),
            amount: 1250.0,
            due_date: today.checked_add_days(Days::new(10)).unwrap_or(today),
            status: UtilityBillStatus::Pending,
            paid_at: None,
            updated_by: None,
        },
        UtilityBill {
            id: "mock-ub-2".into(),
            station_id: MOCK_STATION_ID.into(),
            kind: UtilityKind::Water,
            provider: "Water Company".into(),
            account_number: None,
            amount: 310.5,
            due_date: days_before(today, 5),
            status: UtilityBillStatus::Overdue,
            paid_at: None,
            updated_by: None,
        },
    ]
}
