//! Dashboard backend API client.
//!
//! Bearer-authenticated JSON over HTTP. Failures are split the way callers
//! need them: anything that means "could not talk to the backend" becomes
//! [`LedgerError::Connectivity`], while a non-2xx answer becomes
//! [`LedgerError::Api`] with the backend's own message when it sent one.
//! Retry and fallback live one layer up, in [`crate::resilient`].

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{normalize_base_url, ClientConfig};
use crate::entry::{Entry, EntryStatus, Product};
use crate::error::{LedgerError, Result};
use crate::records::{
    NewPriceChange, NewSupply, NewUtilityBill, PriceChange, ProductSharingSupply, SupplyStatus,
    UtilityBill, UtilityBillStatus,
};
use crate::session::Session;

/// Timeout used specifically for the lightweight connectivity test.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> LedgerError {
    if err.is_decode() {
        return LedgerError::Decode(err.to_string());
    }
    let message = if err.is_connect() {
        format!("Cannot reach the dashboard backend at {url}")
    } else if err.is_timeout() {
        format!("Connection to {url} timed out")
    } else if err.is_builder() {
        format!("Invalid dashboard backend URL: {url}")
    } else {
        format!("Network error communicating with {url}: {err}")
    };
    LedgerError::Connectivity(message)
}

/// Convert an HTTP status code into a user-friendly message.
fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session is invalid or expired".to_string(),
        403 => "You are not allowed to perform this action".to_string(),
        404 => "Record not found".to_string(),
        409 => "Record was changed by someone else".to_string(),
        422 => "The backend rejected the submitted data".to_string(),
        s if s >= 500 => format!("Dashboard backend error (HTTP {s})"),
        s => format!("Unexpected response from dashboard backend (HTTP {s})"),
    }
}

/// Build an API error from a failed response body, preferring the backend's
/// `error`/`message` text and keeping any `details`/`errors` payload.
fn api_error(status: StatusCode, body_text: &str) -> LedgerError {
    let trimmed = body_text.trim();
    let message = match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => {
            let message = json
                .get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status_message(status));
            match json.get("details").or_else(|| json.get("errors")) {
                Some(details) => format!("{message}: {details}"),
                None => message,
            }
        }
        Err(_) if !trimmed.is_empty() && trimmed.len() <= 200 => {
            format!("{}: {trimmed}", status_message(status))
        }
        Err(_) => status_message(status),
    };
    LedgerError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Responses come either bare or wrapped as `{ "data": ... }`.
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.contains_key("data") => {
            obj.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Result of a connectivity test.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Filters for the entry list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryQuery {
    pub status: Option<EntryStatus>,
    pub product: Option<Product>,
    pub station_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl EntryQuery {
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(s) = self.status {
            pairs.push(("status".into(), s.as_str().into()));
        }
        if let Some(p) = self.product {
            pairs.push(("product".into(), p.as_str().into()));
        }
        if let Some(id) = self.station_id.as_deref().filter(|s| !s.trim().is_empty()) {
            pairs.push(("stationId".into(), id.trim().into()));
        }
        if let Some(d) = self.from {
            pairs.push(("from".into(), d.to_string()));
        }
        if let Some(d) = self.to {
            pairs.push(("to".into(), d.to_string()));
        }
        if let Some(s) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            pairs.push(("search".into(), s.trim().into()));
        }
        if let Some(p) = self.page {
            pairs.push(("page".into(), p.to_string()));
        }
        if let Some(l) = self.limit {
            pairs.push(("limit".into(), l.to_string()));
        }
        pairs
    }

    /// Stable key for the local list cache.
    pub fn cache_key(&self) -> String {
        let query: Vec<String> = self
            .to_pairs()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("entries?{}", query.join("&"))
    }

    /// Apply the same filters locally (used on cached and mock lists).
    pub fn matches(&self, entry: &Entry) -> bool {
        if self.status.is_some_and(|s| s != entry.status) {
            return false;
        }
        if self.product.is_some() && self.product != entry.product {
            return false;
        }
        if let Some(id) = self.station_id.as_deref() {
            if entry.station_id != id {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.date.map_or(true, |d| d < from) {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.date.map_or(true, |d| d > to) {
                return false;
            }
        }
        if let Some(needle) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            let haystack = [
                entry.station_name.as_deref().unwrap_or_default(),
                entry.station_id.as_str(),
                entry.notes.as_deref().unwrap_or_default(),
                entry.stamps.entered_by.as_deref().unwrap_or_default(),
            ]
            .join(" ")
            .to_lowercase();
            if !haystack.contains(&needle) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

fn first_page() -> u32 {
    1
}

impl<T> Page<T> {
    pub fn single(items: Vec<T>) -> Self {
        let total = items.len() as u64;
        let limit = items.len() as u32;
        Self {
            items,
            total,
            page: 1,
            limit,
        }
    }
}

/// Accept `[...]`, `{ items: [...] }`, `{ entries: [...] }` or
/// `{ data: [...], total, page }`.
fn parse_page<T: DeserializeOwned>(value: Value) -> Result<Page<T>> {
    let (list, meta) = match value {
        Value::Array(_) => (value, None),
        Value::Object(mut obj) => {
            let list = ["items", "data", "entries", "results"]
                .iter()
                .find_map(|k| obj.remove(*k))
                .unwrap_or(Value::Array(Vec::new()));
            (list, Some(obj))
        }
        Value::Null => (Value::Array(Vec::new()), None),
        other => return Err(LedgerError::Decode(format!("expected a list, got {other}"))),
    };
    let items: Vec<T> = serde_json::from_value(list)?;
    let mut page = Page::single(items);
    if let Some(meta) = meta {
        let meta = meta.get("pagination").and_then(Value::as_object).unwrap_or(&meta);
        if let Some(total) = meta.get("total").and_then(Value::as_u64) {
            page.total = total;
        }
        if let Some(p) = meta.get("page").and_then(Value::as_u64) {
            page.page = p as u32;
        }
        if let Some(l) = meta.get("limit").and_then(Value::as_u64) {
            page.limit = l as u32;
        }
    }
    Ok(page)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    Csv,
    Excel,
    Pdf,
}

/// What the backend hands back for an export request. The file itself is
/// produced and hosted by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDescriptor {
    #[serde(alias = "url")]
    pub download_url: String,
    #[serde(default)]
    pub file_name: Option<String>,
    pub format: ExportFormat,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// One fuel delivery to a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyDelivery {
    #[serde(alias = "quantityL", alias = "litres")]
    pub quantity: f64,
    #[serde(default)]
    pub waybill: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyData {
    #[serde(default)]
    pub station_id: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub product: Option<Product>,
    #[serde(default)]
    pub deliveries: Vec<SupplyDelivery>,
    /// Backend-computed total, when it sends one.
    #[serde(default)]
    pub total_quantity: Option<f64>,
}

impl SupplyData {
    pub fn total(&self) -> f64 {
        self.total_quantity
            .unwrap_or_else(|| self.deliveries.iter().map(|d| d.quantity).sum())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.retry.attempt_timeout)
            .build()
            .map_err(|e| LedgerError::Connectivity(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: normalize_base_url(&config.base_url),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one request and decode the (unwrapped) payload.
    async fn request<T: DeserializeOwned>(
        &self,
        session: Option<&Session>,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<T> {
        let value = self.request_value(session, method, path, query, body).await?;
        serde_json::from_value(unwrap_data(value))
            .map_err(|e| LedgerError::Decode(format!("{path}: {e}")))
    }

    /// Perform one request and return the raw JSON body. `path` includes the
    /// leading slash, e.g. `/api/entries`. Empty bodies read as `null`.
    async fn request_value(
        &self,
        session: Option<&Session>,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self
            .http
            .request(method.clone(), &url)
            .header("Accept", "application/json");
        if let Some(s) = session {
            req = req.bearer_auth(s.token());
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        debug!(method = %method, path, "backend request");
        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;

        if !status.is_success() {
            return Err(api_error(status, &body_text));
        }

        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| LedgerError::Decode(format!("{path}: {e}")))
    }

    // -- Connectivity --------------------------------------------------------

    /// Lightweight health check. Never fails; the outcome is in the result.
    pub async fn check_health(&self) -> ConnectivityResult {
        let url = format!("{}/api/health", self.base_url);
        let start = Instant::now();
        let resp = self
            .http
            .get(&url)
            .timeout(CONNECTIVITY_TIMEOUT)
            .send()
            .await;
        match resp {
            Ok(r) => {
                let latency = start.elapsed().as_millis() as u64;
                let status = r.status();
                if status.is_success() {
                    debug!(latency_ms = latency, "health check passed");
                    ConnectivityResult {
                        success: true,
                        latency_ms: Some(latency),
                        error: None,
                    }
                } else {
                    ConnectivityResult {
                        success: false,
                        latency_ms: Some(latency),
                        error: Some(status_message(status)),
                    }
                }
            }
            Err(e) => ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some(friendly_error(&self.base_url, &e).to_string()),
            },
        }
    }

    // -- Entries ---------------------------------------------------------------

    pub async fn list_entries(&self, session: &Session, query: &EntryQuery) -> Result<Page<Entry>> {
        let raw = self
            .request_value(Some(session), Method::GET, "/api/entries", &query.to_pairs(), None)
            .await?;
        parse_page(raw)
    }

    pub async fn submit_entry(&self, session: &Session, entry: &Entry) -> Result<Entry> {
        let body = serde_json::to_value(entry)?;
        let saved: Entry = self
            .request(Some(session), Method::POST, "/api/entries", &[], Some(&body))
            .await?;
        info!(entry_id = ?saved.id, "entry submitted");
        Ok(saved)
    }

    pub async fn validate_entry(&self, session: &Session, id: &str) -> Result<Entry> {
        let path = format!("/api/entries/{}/validate", encode_segment(id));
        self.request(Some(session), Method::PUT, &path, &[], Some(&Value::Object(Default::default())))
            .await
    }

    pub async fn approve_entry(&self, session: &Session, id: &str) -> Result<Entry> {
        let path = format!("/api/entries/{}/approve", encode_segment(id));
        self.request(Some(session), Method::PUT, &path, &[], Some(&Value::Object(Default::default())))
            .await
    }

    pub async fn reject_entry(
        &self,
        session: &Session,
        id: &str,
        reason: &str,
        comments: &str,
    ) -> Result<Entry> {
        let path = format!("/api/entries/{}/reject", encode_segment(id));
        let body = serde_json::json!({ "reason": reason, "comments": comments });
        self.request(Some(session), Method::PUT, &path, &[], Some(&body))
            .await
    }

    pub async fn request_edit(&self, session: &Session, id: &str, reason: &str) -> Result<Entry> {
        let path = format!("/api/entries/{}/edit-request", encode_segment(id));
        let body = serde_json::json!({ "reason": reason });
        self.request(Some(session), Method::PUT, &path, &[], Some(&body))
            .await
    }

    /// Yesterday's entry for a station/product, if the backend has one.
    pub async fn previous_day(
        &self,
        session: &Session,
        station_id: &str,
        product: Product,
    ) -> Result<Option<Entry>> {
        let query = vec![
            ("stationId".to_string(), station_id.to_string()),
            ("product".to_string(), product.as_str().to_string()),
        ];
        match self
            .request::<Option<Entry>>(Some(session), Method::GET, "/api/entries/previous", &query, None)
            .await
        {
            Ok(entry) => Ok(entry),
            Err(LedgerError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn supply_data(
        &self,
        session: &Session,
        station_id: &str,
        date: NaiveDate,
        product: Product,
    ) -> Result<SupplyData> {
        let query = vec![
            ("stationId".to_string(), station_id.to_string()),
            ("date".to_string(), date.to_string()),
            ("product".to_string(), product.as_str().to_string()),
        ];
        let data: Option<SupplyData> = self
            .request(Some(session), Method::GET, "/api/supply", &query, None)
            .await?;
        Ok(data.unwrap_or_default())
    }

    pub async fn export_entries(
        &self,
        session: &Session,
        format: ExportFormat,
        query: &EntryQuery,
    ) -> Result<ExportDescriptor> {
        let body = serde_json::json!({ "format": format, "filters": query });
        self.request(Some(session), Method::POST, "/api/entries/export", &[], Some(&body))
            .await
    }

    // -- Price changes ----------------------------------------------------------

    pub async fn list_price_changes(&self, session: &Session) -> Result<Vec<PriceChange>> {
        let raw = self
            .request_value(Some(session), Method::GET, "/api/price-changes", &[], None)
            .await?;
        Ok(parse_page(raw)?.items)
    }

    pub async fn create_price_change(
        &self,
        session: &Session,
        change: &NewPriceChange,
    ) -> Result<PriceChange> {
        let body = serde_json::to_value(change)?;
        self.request(Some(session), Method::POST, "/api/price-changes", &[], Some(&body))
            .await
    }

    pub async fn approve_price_change(&self, session: &Session, id: &str) -> Result<PriceChange> {
        let path = format!("/api/price-changes/{}/approve", encode_segment(id));
        self.request(Some(session), Method::PUT, &path, &[], Some(&Value::Object(Default::default())))
            .await
    }

    pub async fn reject_price_change(
        &self,
        session: &Session,
        id: &str,
        reason: &str,
    ) -> Result<PriceChange> {
        let path = format!("/api/price-changes/{}/reject", encode_segment(id));
        let body = serde_json::json!({ "reason": reason });
        self.request(Some(session), Method::PUT, &path, &[], Some(&body))
            .await
    }

    // -- Product sharing supply ----------------------------------------------------

    pub async fn list_supplies(&self, session: &Session) -> Result<Vec<ProductSharingSupply>> {
        let raw = self
            .request_value(Some(session), Method::GET, "/api/product-sharing", &[], None)
            .await?;
        Ok(parse_page(raw)?.items)
    }

    pub async fn create_supply(
        &self,
        session: &Session,
        supply: &NewSupply,
    ) -> Result<ProductSharingSupply> {
        let body = serde_json::to_value(supply)?;
        self.request(Some(session), Method::POST, "/api/product-sharing", &[], Some(&body))
            .await
    }

    pub async fn update_supply_status(
        &self,
        session: &Session,
        id: &str,
        status: SupplyStatus,
        received_quantity: Option<f64>,
    ) -> Result<ProductSharingSupply> {
        let path = format!("/api/product-sharing/{}/status", encode_segment(id));
        let body = serde_json::json!({ "status": status, "receivedQuantity": received_quantity });
        self.request(Some(session), Method::PUT, &path, &[], Some(&body))
            .await
    }

    // -- Utility bills ------------------------------------------------------------

    pub async fn list_utility_bills(&self, session: &Session) -> Result<Vec<UtilityBill>> {
        let raw = self
            .request_value(Some(session), Method::GET, "/api/utility-bills", &[], None)
            .await?;
        Ok(parse_page(raw)?.items)
    }

    pub async fn create_utility_bill(
        &self,
        session: &Session,
        bill: &NewUtilityBill,
    ) -> Result<UtilityBill> {
        let body = serde_json::to_value(bill)?;
        self.request(Some(session), Method::POST, "/api/utility-bills", &[], Some(&body))
            .await
    }

    pub async fn update_utility_bill_status(
        &self,
        session: &Session,
        id: &str,
        status: UtilityBillStatus,
    ) -> Result<UtilityBill> {
        let path = format!("/api/utility-bills/{}/status", encode_segment(id));
        let body = serde_json::json!({ "status": status });
        self.request(Some(session), Method::PUT, &path, &[], Some(&body))
            .await
    }
}

/// Percent-encode an id for use as a single path segment.
fn encode_segment(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
