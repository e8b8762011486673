//! Client facade: one signed-in user, one backend, one local cache.
//!
//! Reads degrade remote → cache → mock and say which one they returned.
//! Writes go remote-first and, when the backend is unreachable and
//! `allow_mock_writes` is set, are mirrored locally with the
//! `applied_locally_only` flag raised.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::{Local, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{ApiClient, ConnectivityResult, EntryQuery, ExportDescriptor, ExportFormat, Page};
use crate::config::ClientConfig;
use crate::db::LocalCache;
use crate::entry::{Entry, EntryDraft};
use crate::error::{LedgerError, Result};
use crate::lifecycle::{EntryLifecycle, Transition, TransitionOutcome};
use crate::mock;
use crate::records::{
    NewPriceChange, NewSupply, NewUtilityBill, PriceChange, ProductSharingSupply, SupplyStatus,
    UtilityBill, UtilityBillStatus,
};
use crate::resilient::{resilient_fetch, resilient_write, with_retry, DataSource, Fetched, WriteOutcome};
use crate::session::{self, Role, Session};
use crate::storage::{CredentialStore, KeyringStore};

const PRICE_CHANGES_KEY: &str = "price-changes";
const SUPPLIES_KEY: &str = "product-sharing";
const UTILITY_BILLS_KEY: &str = "utility-bills";

pub struct Dashboard {
    config: ClientConfig,
    api: ApiClient,
    cache: LocalCache,
    secrets: Box<dyn CredentialStore>,
    session: RwLock<Option<Arc<Session>>>,
    cancel: CancellationToken,
}

impl Dashboard {
    pub fn new(
        config: ClientConfig,
        cache: LocalCache,
        secrets: Box<dyn CredentialStore>,
    ) -> Result<Self> {
        let api = ApiClient::new(&config)?;
        info!(base_url = %api.base_url(), "dashboard client ready");
        Ok(Self {
            config,
            api,
            cache,
            secrets,
            session: RwLock::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// Production wiring: cache database under `data_dir`, token in the OS
    /// keyring, and any stored session restored.
    pub fn open(config: ClientConfig, data_dir: &Path) -> Result<Self> {
        let cache = LocalCache::open(data_dir)?;
        let dashboard = Self::new(config, cache, Box::new(KeyringStore))?;
        dashboard.restore_session();
        Ok(dashboard)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Token shared by every in-flight call. Child tokens let a view cancel
    /// only its own work.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort all in-flight calls and stop background loops.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    pub fn sign_in(&self, session: Session) -> Result<Arc<Session>> {
        session.save(self.secrets.as_ref(), &self.cache)?;
        let session = Arc::new(session);
        *self
            .session
            .write()
            .map_err(|e| LedgerError::Storage(e.to_string()))? = Some(session.clone());
        Ok(session)
    }

    pub fn restore_session(&self) -> Option<Arc<Session>> {
        let restored = Arc::new(Session::restore(self.secrets.as_ref(), &self.cache)?);
        match self.session.write() {
            Ok(mut slot) => *slot = Some(restored.clone()),
            Err(e) => {
                warn!(error = %e, "session lock poisoned");
                return None;
            }
        }
        info!(user_id = %restored.user.id, "session restored");
        Some(restored)
    }

    pub fn sign_out(&self) -> Result<()> {
        if let Ok(mut slot) = self.session.write() {
            *slot = None;
        }
        Session::clear(self.secrets.as_ref(), &self.cache)
    }

    pub fn session(&self) -> Result<Arc<Session>> {
        let current = self
            .session
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .clone();
        session::require(current.as_deref())?;
        current.ok_or(LedgerError::NotAuthenticated)
    }

    // -----------------------------------------------------------------------
    // Connectivity
    // -----------------------------------------------------------------------

    pub async fn check_health(&self) -> ConnectivityResult {
        tokio::select! {
            _ = self.cancel.cancelled() => ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some("health check cancelled".into()),
            },
            r = self.api.check_health() => r,
        }
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    pub fn lifecycle(&self) -> EntryLifecycle<'_> {
        EntryLifecycle::new(&self.api, &self.cache, &self.config, &self.cancel)
    }

    /// Fresh draft for the signed-in station manager's station.
    pub fn new_draft(&self) -> Result<EntryDraft> {
        let session = self.session()?;
        let station_id = session
            .user
            .station_id
            .as_deref()
            .filter(|_| session.role() == Role::StationManager)
            .ok_or_else(|| LedgerError::Forbidden {
                role: session.role().to_string(),
                action: "create entries".into(),
            })?;
        let mut draft = EntryDraft::new(
            station_id,
            session.user.station_name.as_deref(),
            self.config.reference_rates.clone(),
        );
        draft.set_date(Some(Local::now().date_naive()));
        Ok(draft)
    }

    pub async fn transition(&self, entry: &Entry, transition: Transition) -> Result<TransitionOutcome> {
        let session = self.session()?;
        self.lifecycle().transition(&session, entry, transition).await
    }

    pub async fn prefill_from_previous(&self, draft: &mut EntryDraft) -> Result<Option<DataSource>> {
        let session = self.session()?;
        self.lifecycle().prefill_from_previous(&session, draft).await
    }

    pub async fn prefill_supply(&self, draft: &mut EntryDraft) -> Result<Option<f64>> {
        let session = self.session()?;
        self.lifecycle().prefill_supply(&session, draft).await
    }

    /// Station managers only ever see their own station.
    fn scoped(&self, session: &Session, query: &EntryQuery) -> EntryQuery {
        let mut query = query.clone();
        if session.role() == Role::StationManager {
            query.station_id = session.user.station_id.clone();
        }
        query
    }

    pub async fn list_entries(&self, query: &EntryQuery) -> Result<Fetched<Page<Entry>>> {
        let session = self.session()?;
        let query = self.scoped(&session, query);
        let (api, session_ref, query_ref) = (&self.api, session.as_ref(), &query);
        self.fetch_list(
            "entries",
            &query.cache_key(),
            move || api.list_entries(session_ref, query_ref),
            || {
                let today = Local::now().date_naive();
                let items = mock::entries(query.station_id.as_deref(), today)
                    .into_iter()
                    .filter(|e| query.matches(e))
                    .collect();
                Page::single(items)
            },
        )
        .await
    }

    /// Ask the backend for an export file. There is no offline variant.
    pub async fn export_entries(&self, format: ExportFormat, query: &EntryQuery) -> Result<ExportDescriptor> {
        let session = self.session()?;
        let query = self.scoped(&session, query);
        let (api, session_ref, query_ref) = (&self.api, session.as_ref(), &query);
        with_retry(&self.config.retry, &self.cancel, "entries/export", move || {
            api.export_entries(session_ref, format, query_ref)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    pub async fn list_price_changes(&self) -> Result<Fetched<Vec<PriceChange>>> {
        let session = self.session()?;
        let (api, s) = (&self.api, session.as_ref());
        self.fetch_list(
            "price-changes",
            PRICE_CHANGES_KEY,
            move || api.list_price_changes(s),
            || mock::price_changes(Local::now().date_naive()),
        )
        .await
    }

    pub async fn create_price_change(&self, change: NewPriceChange) -> Result<WriteOutcome<PriceChange>> {
        let session = self.session()?;
        change.validate()?;
        let (api, s, body) = (&self.api, session.as_ref(), &change);
        self.write(
            "price-changes",
            move || api.create_price_change(s, body),
            || change.clone().into_local(mock::local_id("price-change"), s.actor()),
        )
        .await
    }

    pub async fn review_price_change(
        &self,
        change: &PriceChange,
        approve: bool,
        reason: Option<&str>,
    ) -> Result<WriteOutcome<PriceChange>> {
        let session = self.session()?;
        change.check_review(&session, approve, reason)?;
        let (api, s, id) = (&self.api, session.as_ref(), change.id.as_str());
        let reason_text = reason.map(str::trim).unwrap_or_default();
        self.write(
            if approve { "price-changes/approve" } else { "price-changes/reject" },
            move || async move {
                if approve {
                    api.approve_price_change(s, id).await
                } else {
                    api.reject_price_change(s, id, reason_text).await
                }
            },
            || {
                let mut local = change.clone();
                local.apply_review(approve, reason, s.actor(), Utc::now());
                local
            },
        )
        .await
    }

    pub async fn list_supplies(&self) -> Result<Fetched<Vec<ProductSharingSupply>>> {
        let session = self.session()?;
        let (api, s) = (&self.api, session.as_ref());
        self.fetch_list(
            "product-sharing",
            SUPPLIES_KEY,
            move || api.list_supplies(s),
            || mock::supplies(Local::now().date_naive()),
        )
        .await
    }

    pub async fn create_supply(&self, supply: NewSupply) -> Result<WriteOutcome<ProductSharingSupply>> {
        let session = self.session()?;
        supply.validate()?;
        let (api, s, body) = (&self.api, session.as_ref(), &supply);
        self.write(
            "product-sharing",
            move || api.create_supply(s, body),
            || supply.clone().into_local(mock::local_id("supply"), s.actor()),
        )
        .await
    }

    pub async fn update_supply_status(
        &self,
        supply: &ProductSharingSupply,
        to: SupplyStatus,
        received_quantity: Option<f64>,
    ) -> Result<WriteOutcome<ProductSharingSupply>> {
        let session = self.session()?;
        supply.check_transition(&session, to)?;
        let (api, s, id) = (&self.api, session.as_ref(), supply.id.as_str());
        self.write(
            "product-sharing/status",
            move || api.update_supply_status(s, id, to, received_quantity),
            || {
                let mut local = supply.clone();
                local.apply_transition(to, received_quantity, s.actor(), Utc::now());
                local
            },
        )
        .await
    }

    pub async fn list_utility_bills(&self) -> Result<Fetched<Vec<UtilityBill>>> {
        let session = self.session()?;
        let (api, s) = (&self.api, session.as_ref());
        self.fetch_list(
            "utility-bills",
            UTILITY_BILLS_KEY,
            move || api.list_utility_bills(s),
            || mock::utility_bills(Local::now().date_naive()),
        )
        .await
    }

    pub async fn create_utility_bill(&self, bill: NewUtilityBill) -> Result<WriteOutcome<UtilityBill>> {
        let session = self.session()?;
        bill.validate()?;
        let (api, s, body) = (&self.api, session.as_ref(), &bill);
        self.write(
            "utility-bills",
            move || api.create_utility_bill(s, body),
            || bill.clone().into_local(mock::local_id("bill")),
        )
        .await
    }

    pub async fn update_utility_bill_status(
        &self,
        bill: &UtilityBill,
        to: UtilityBillStatus,
    ) -> Result<WriteOutcome<UtilityBill>> {
        let session = self.session()?;
        bill.check_transition(&session, to)?;
        let (api, s, id) = (&self.api, session.as_ref(), bill.id.as_str());
        self.write(
            "utility-bills/status",
            move || api.update_utility_bill_status(s, id, to),
            || {
                let mut local = bill.clone();
                local.apply_transition(to, s.actor(), Utc::now());
                local
            },
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Read with fallback; a fresh remote result replaces the cached copy.
    async fn fetch_list<T, F, Fut, M>(
        &self,
        endpoint: &str,
        cache_key: &str,
        fetch: F,
        mock: M,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        M: FnOnce() -> T,
    {
        let cache = &self.cache;
        let fetched = resilient_fetch(
            endpoint,
            &self.config.retry,
            &self.cancel,
            fetch,
            || cache.load_list(cache_key),
            mock,
        )
        .await?;
        if fetched.source == DataSource::Remote {
            if let Err(e) = cache.store_list(cache_key, &fetched.data) {
                warn!(cache_key, error = %e, "failed to cache list");
            }
        }
        Ok(fetched)
    }

    async fn write<T, F, Fut, L>(&self, endpoint: &str, call: F, local: L) -> Result<WriteOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        L: FnOnce() -> T,
    {
        let local = self.config.allow_mock_writes.then_some(local);
        resilient_write(endpoint, &self.config.retry, &self.cancel, call, local).await
    }
}
