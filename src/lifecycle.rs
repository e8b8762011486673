//! Entry workflow: DRAFT → SUBMITTED → VALIDATED → APPROVED, with REJECTED
//! reachable from SUBMITTED or VALIDATED and a separate edit-request flag.
//!
//! Guards (role, current status, reasons, validation) run locally first, so
//! a refused transition never reaches the backend. Accepted transitions are
//! sent to the backend; if it cannot be reached and local writes are
//! allowed, the transition is applied to a copy of the entry and returned
//! flagged [`TransitionOutcome::applied_locally_only`]. The caller's entry is
//! never modified.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::db::LocalCache;
use crate::entry::{Entry, EntryDraft, EntryField, EntryStatus};
use crate::error::{LedgerError, Result};
use crate::mock;
use crate::reconcile;
use crate::resilient::{resilient_fetch, resilient_write, DataSource};
use crate::session::{Role, Session};
use crate::validation::{validate, ValidationContext};

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Submit,
    Validate,
    Approve,
    Reject { reason: String, comments: String },
    RequestEdit { reason: String },
}

impl Transition {
    pub fn action(&self) -> &'static str {
        match self {
            Transition::Submit => "submit",
            Transition::Validate => "validate",
            Transition::Approve => "approve",
            Transition::Reject { .. } => "reject",
            Transition::RequestEdit { .. } => "request edit",
        }
    }

    fn allowed_from(&self) -> &'static [EntryStatus] {
        match self {
            Transition::Submit => &[EntryStatus::Draft],
            Transition::Validate => &[EntryStatus::Submitted],
            Transition::Approve => &[EntryStatus::Validated],
            Transition::Reject { .. } | Transition::RequestEdit { .. } => {
                &[EntryStatus::Submitted, EntryStatus::Validated]
            }
        }
    }

    fn role_allowed(&self, session: &Session, entry: &Entry) -> bool {
        match self {
            Transition::Submit | Transition::RequestEdit { .. } => {
                session.owns_station(&entry.station_id)
            }
            Transition::Validate => session.role() == Role::Admin,
            Transition::Approve => session.role() == Role::SuperAdmin,
            Transition::Reject { .. } => matches!(session.role(), Role::Admin | Role::SuperAdmin),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub entry: Entry,
    /// `true` when the backend never saw this transition.
    pub applied_locally_only: bool,
}

fn non_empty(value: &str, name: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::MissingReason(name));
    }
    Ok(())
}

/// Check whether `session` may apply `transition` to `entry`. Submission also
/// requires the entry to pass validation under `ctx`.
pub fn check(
    entry: &Entry,
    session: &Session,
    transition: &Transition,
    ctx: &ValidationContext<'_>,
) -> Result<()> {
    let action = transition.action();
    if !transition.role_allowed(session, entry) {
        return Err(LedgerError::Forbidden {
            role: session.role().to_string(),
            action: action.to_string(),
        });
    }
    if !transition.allowed_from().contains(&entry.status) {
        return Err(LedgerError::InvalidTransition {
            from: entry.status.to_string(),
            action: action.to_string(),
        });
    }

    match transition {
        Transition::Submit => {
            let violations = validate(entry, ctx);
            if !violations.is_empty() {
                return Err(LedgerError::Validation(violations));
            }
        }
        Transition::Reject { reason, comments } => {
            non_empty(reason, "rejection reason")?;
            non_empty(comments, "rejection comments")?;
        }
        Transition::RequestEdit { reason } => {
            if entry.stamps.edit_requested {
                return Err(LedgerError::InvalidTransition {
                    from: format!("{} (edit already requested)", entry.status),
                    action: action.to_string(),
                });
            }
            non_empty(reason, "edit request reason")?;
        }
        Transition::Validate | Transition::Approve => {}
    }

    if !matches!(transition, Transition::Submit) && entry.id.is_none() {
        return Err(LedgerError::Unsaved);
    }
    Ok(())
}

/// The entry as it looks after `transition`, stamped with `actor` and `at`.
/// Does not check guards and never assigns an id.
pub fn stamp(entry: &Entry, transition: &Transition, actor: &str, at: DateTime<Utc>) -> Entry {
    let mut next = entry.clone();
    let stamps = &mut next.stamps;
    let actor = Some(actor.to_string());
    match transition {
        Transition::Submit => {
            stamps.entered_by = stamps.entered_by.take().or(actor);
            stamps.entered_at = stamps.entered_at.or(Some(at));
            stamps.submitted_at = Some(at);
            next.status = EntryStatus::Submitted;
        }
        Transition::Validate => {
            stamps.validated_by = actor;
            stamps.validated_at = Some(at);
            next.status = EntryStatus::Validated;
        }
        Transition::Approve => {
            stamps.approved_by = actor;
            stamps.approved_at = Some(at);
            next.status = EntryStatus::Approved;
        }
        Transition::Reject { reason, comments } => {
            stamps.rejected_by = actor;
            stamps.rejected_at = Some(at);
            stamps.rejection_reason = Some(reason.trim().to_string());
            stamps.rejection_comments = Some(comments.trim().to_string());
            next.status = EntryStatus::Rejected;
        }
        Transition::RequestEdit { reason } => {
            stamps.edit_requested = true;
            stamps.edit_requested_by = actor;
            stamps.edit_requested_at = Some(at);
            stamps.edit_request_reason = Some(reason.trim().to_string());
        }
    }
    next
}

/// [`stamp`] for a transition the backend never saw. A submitted entry
/// without an id gets a local one.
pub fn apply_locally(entry: &Entry, transition: &Transition, actor: &str, at: DateTime<Utc>) -> Entry {
    let mut next = stamp(entry, transition, actor, at);
    if matches!(transition, Transition::Submit) && next.id.is_none() {
        next.id = Some(mock::local_id("entry"));
    }
    next
}

async fn send(
    api: &ApiClient,
    session: &Session,
    entry: &Entry,
    transition: &Transition,
) -> Result<Entry> {
    let id = || entry.id.as_deref().ok_or(LedgerError::Unsaved);
    match transition {
        Transition::Submit => api.submit_entry(session, entry).await,
        Transition::Validate => api.validate_entry(session, id()?).await,
        Transition::Approve => api.approve_entry(session, id()?).await,
        Transition::Reject { reason, comments } => {
            api.reject_entry(session, id()?, reason.trim(), comments.trim())
                .await
        }
        Transition::RequestEdit { reason } => {
            api.request_edit(session, id()?, reason.trim()).await
        }
    }
}

/// Workflow operations for one signed-in user.
pub struct EntryLifecycle<'a> {
    api: &'a ApiClient,
    cache: &'a LocalCache,
    config: &'a ClientConfig,
    cancel: &'a CancellationToken,
}

impl<'a> EntryLifecycle<'a> {
    pub fn new(
        api: &'a ApiClient,
        cache: &'a LocalCache,
        config: &'a ClientConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            api,
            cache,
            config,
            cancel,
        }
    }

    /// Validation context for `entry`, with the companion product's cash to
    /// bank looked up from the local cache.
    pub fn validation_context(&self, entry: &Entry) -> ValidationContext<'a> {
        let rule = self.config.cash_variance.as_ref();
        let companion_cash_to_bank = match (rule, entry.date) {
            (Some(rule), Some(date)) if entry.product == Some(rule.product) => {
                self.cache.cash_to_bank(&entry.station_id, date, rule.companion)
            }
            _ => None,
        };
        ValidationContext {
            cash_variance: rule,
            companion_cash_to_bank,
        }
    }

    pub async fn transition(
        &self,
        session: &Session,
        entry: &Entry,
        transition: Transition,
    ) -> Result<TransitionOutcome> {
        let current = reconcile::derive(entry.clone());
        let ctx = self.validation_context(&current);
        check(&current, session, &transition, &ctx)?;

        let action = transition.action();
        // Submission sends the entry as it will be stored; other transitions
        // only name it.
        let body = match transition {
            Transition::Submit => stamp(&current, &transition, session.actor(), Utc::now()),
            _ => current.clone(),
        };
        let (api, body_ref, transition_ref) = (self.api, &body, &transition);
        let local = self.config.allow_mock_writes.then_some(|| {
            if matches!(transition_ref, Transition::Submit) {
                apply_locally(body_ref, transition_ref, session.actor(), Utc::now())
            } else {
                apply_locally(&current, transition_ref, session.actor(), Utc::now())
            }
        });

        let outcome = resilient_write(
            &format!("entries/{action}"),
            &self.config.retry,
            self.cancel,
            move || send(api, session, body_ref, transition_ref),
            local,
        )
        .await?;

        let entry = reconcile::derive(outcome.value);
        if outcome.applied_locally_only {
            warn!(entry_id = ?entry.id, action, "transition applied locally only");
        } else {
            info!(entry_id = ?entry.id, action, status = %entry.status, "transition accepted");
        }

        if matches!(transition, Transition::Submit) {
            self.remember_cash_to_bank(&entry);
        }

        Ok(TransitionOutcome {
            entry,
            applied_locally_only: outcome.applied_locally_only,
        })
    }

    fn remember_cash_to_bank(&self, entry: &Entry) {
        let (Some(date), Some(product), Some(cash)) =
            (entry.date, entry.product, entry.derived.cash_to_bank)
        else {
            return;
        };
        if let Err(e) = self
            .cache
            .record_cash_to_bank(&entry.station_id, date, product, cash)
        {
            warn!(error = %e, "failed to cache cash to bank");
        }
    }

    /// Fill today's opening readings (and rate, when unset) from the previous
    /// day's entry for the same station and product. Returns where the
    /// snapshot came from, or `None` when there was nothing to carry.
    pub async fn prefill_from_previous(
        &self,
        session: &Session,
        draft: &mut EntryDraft,
    ) -> Result<Option<DataSource>> {
        let Some(product) = draft.entry().product else {
            return Ok(None);
        };
        let station_id = draft.entry().station_id.clone();
        let cache_key = format!("previous?stationId={station_id}&product={product}");
        let (api, cache, key, station) = (self.api, self.cache, cache_key.as_str(), station_id.as_str());

        let fetched = resilient_fetch(
            "entries/previous",
            &self.config.retry,
            self.cancel,
            move || async move {
                let previous = api.previous_day(session, station, product).await?;
                if let Err(e) = cache.store_list(key, &previous) {
                    warn!(error = %e, "failed to cache previous-day entry");
                }
                Ok(previous)
            },
            || cache.load_list::<Option<Entry>>(key),
            || None,
        )
        .await?;

        match fetched.data {
            Some(previous) => {
                debug!(station_id = %station, %product, source = ?fetched.source, "carrying previous day forward");
                draft.carry_forward(&previous);
                Ok(Some(fetched.source))
            }
            None => Ok(None),
        }
    }

    /// Set `supply` from the deliveries recorded for the draft's station,
    /// date and product. Leaves the draft untouched when the lookup cannot
    /// reach the backend.
    pub async fn prefill_supply(&self, session: &Session, draft: &mut EntryDraft) -> Result<Option<f64>> {
        let (Some(date), Some(product)) = (draft.entry().date, draft.entry().product) else {
            return Ok(None);
        };
        let station_id = draft.entry().station_id.clone();
        let (api, station) = (self.api, station_id.as_str());
        let fetched = resilient_fetch(
            "supply",
            &self.config.retry,
            self.cancel,
            move || async move { api.supply_data(session, station, date, product).await.map(Some) },
            || None,
            || None,
        )
        .await?;

        let Some(supply) = fetched.data else {
            return Ok(None);
        };
        let total = supply.total();
        draft.set_number(EntryField::Supply, Some(total))?;
        Ok(Some(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryInputs, Product, ReferenceRates};
    use crate::resilient::RetryPolicy;
    use crate::session::tests::session;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn complete_entry() -> Entry {
        reconcile::derive(Entry {
            date: Some(date()),
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

    fn with_status(status: EntryStatus) -> Entry {
        Entry {
            id: Some("e1".into()),
            status,
            ..complete_entry()
        }
    }

    fn config(base_url: &str, allow_mock_writes: bool) -> ClientConfig {
        ClientConfig {
            retry: RetryPolicy {
                attempts: 2,
                backoff: Duration::from_millis(1),
                attempt_timeout: Duration::from_secs(2),
            },
            allow_mock_writes,
            ..ClientConfig::new(base_url)
        }
    }

    struct Fixture {
        api: ApiClient,
        cache: LocalCache,
        config: ClientConfig,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new(base_url: &str, allow_mock_writes: bool) -> Self {
            let config = config(base_url, allow_mock_writes);
            Self {
                api: ApiClient::new(&config).unwrap(),
                cache: LocalCache::in_memory().unwrap(),
                config,
                cancel: CancellationToken::new(),
            }
        }

        fn unreachable(allow_mock_writes: bool) -> Self {
            Self::new("http://127.0.0.1:9", allow_mock_writes)
        }

        fn lifecycle(&self) -> EntryLifecycle<'_> {
            EntryLifecycle::new(&self.api, &self.cache, &self.config, &self.cancel)
        }
    }

    #[test]
    fn guards_enforce_roles() {
        let ctx = ValidationContext::default();
        let submitted = with_status(EntryStatus::Submitted);

        let err = check(&submitted, &session(Role::StationManager), &Transition::Validate, &ctx)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden { .. }));
        check(&submitted, &session(Role::Admin), &Transition::Validate, &ctx).unwrap();

        let validated = with_status(EntryStatus::Validated);
        assert!(check(&validated, &session(Role::Admin), &Transition::Approve, &ctx).is_err());
        check(&validated, &session(Role::SuperAdmin), &Transition::Approve, &ctx).unwrap();

        // Another station's manager cannot submit.
        let mut foreign = complete_entry();
        foreign.station_id = "st-2".into();
        let err = check(&foreign, &session(Role::StationManager), &Transition::Submit, &ctx)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden { .. }));
    }

    #[test]
    fn guards_enforce_state_order() {
        let ctx = ValidationContext::default();
        let err = check(
            &with_status(EntryStatus::Submitted),
            &session(Role::SuperAdmin),
            &Transition::Approve,
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));

        let reject = Transition::Reject {
            reason: "Wrong meter".into(),
            comments: "Recheck".into(),
        };
        assert!(check(&with_status(EntryStatus::Approved), &session(Role::Admin), &reject, &ctx).is_err());
        assert!(check(&with_status(EntryStatus::Draft), &session(Role::Admin), &reject, &ctx).is_err());
        check(&with_status(EntryStatus::Validated), &session(Role::SuperAdmin), &reject, &ctx).unwrap();
    }

    #[test]
    fn edit_request_needs_owner_reason_and_no_pending_request() {
        let ctx = ValidationContext::default();
        let manager = session(Role::StationManager);
        let mut entry = with_status(EntryStatus::Submitted);
        let ask = |reason: &str| Transition::RequestEdit {
            reason: reason.into(),
        };

        assert!(matches!(
            check(&entry, &manager, &ask(" "), &ctx),
            Err(LedgerError::MissingReason(_))
        ));
        check(&entry, &manager, &ask("Typo in closing SR"), &ctx).unwrap();

        entry = apply_locally(&entry, &ask("Typo in closing SR"), manager.actor(), Utc::now());
        assert_eq!(entry.status, EntryStatus::Submitted);
        assert!(entry.stamps.edit_requested);
        assert!(matches!(
            check(&entry, &manager, &ask("again"), &ctx),
            Err(LedgerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn local_transitions_stamp_actor_and_time() {
        let at = Utc::now();
        let submitted = apply_locally(&complete_entry(), &Transition::Submit, "Ama", at);
        assert_eq!(submitted.status, EntryStatus::Submitted);
        assert_eq!(submitted.stamps.submitted_at, Some(at));
        assert!(submitted.id.as_deref().is_some_and(|id| id.starts_with("local-entry-")));
        assert_eq!(stamp(&complete_entry(), &Transition::Submit, "Ama", at).id, None);

        let rejected = apply_locally(
            &with_status(EntryStatus::Validated),
            &Transition::Reject {
                reason: " Wrong meter ".into(),
                comments: "Recheck pump 2".into(),
            },
            "Kofi",
            at,
        );
        assert_eq!(rejected.status, EntryStatus::Rejected);
        assert_eq!(rejected.stamps.rejected_by.as_deref(), Some("Kofi"));
        assert_eq!(rejected.stamps.rejection_reason.as_deref(), Some("Wrong meter"));
    }

    #[tokio::test]
    async fn submit_without_rate_is_refused_and_stays_draft() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/entries"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        let fx = Fixture::new(&server.uri(), true);

        let mut entry = complete_entry();
        entry.inputs.rate = None;
        let err = fx
            .lifecycle()
            .transition(&session(Role::StationManager), &entry, Transition::Submit)
            .await
            .unwrap_err();
        match err {
            LedgerError::Validation(v) => {
                assert!(v.iter().any(|v| v.message == "rate is required"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(entry.status, EntryStatus::Draft);
    }

    #[tokio::test]
    async fn submit_leaves_id_to_the_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/entries"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": { "id": "e-981", "stationId": "st-1", "status": "SUBMITTED" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        let fx = Fixture::new(&server.uri(), true);

        let outcome = fx
            .lifecycle()
            .transition(&session(Role::StationManager), &complete_entry(), Transition::Submit)
            .await
            .expect("submitted");
        assert!(!outcome.applied_locally_only);
        assert_eq!(outcome.entry.id.as_deref(), Some("e-981"));

        let requests = server.received_requests().await.expect("request recording");
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("id").is_none(), "unexpected id in {body}");
        assert_eq!(body["status"], "SUBMITTED");
        assert!(body.get("submittedAt").is_some());
    }

    #[tokio::test]
    async fn reject_with_empty_comments_is_refused() {
        let fx = Fixture::unreachable(true);
        let entry = with_status(EntryStatus::Submitted);
        let err = fx
            .lifecycle()
            .transition(
                &session(Role::Admin),
                &entry,
                Transition::Reject {
                    reason: "Wrong meter".into(),
                    comments: "   ".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::MissingReason("rejection comments")));
        assert_eq!(entry.status, EntryStatus::Submitted);
    }

    #[tokio::test]
    async fn unreachable_backend_applies_locally_with_flag() {
        let fx = Fixture::unreachable(true);
        let entry = with_status(EntryStatus::Submitted);
        let outcome = fx
            .lifecycle()
            .transition(&session(Role::Admin), &entry, Transition::Validate)
            .await
            .expect("local fallback");
        assert!(outcome.applied_locally_only);
        assert_eq!(outcome.entry.status, EntryStatus::Validated);
        assert_eq!(outcome.entry.stamps.validated_by.as_deref(), Some("Kofi Boateng"));
        assert_eq!(entry.status, EntryStatus::Submitted, "input untouched");
    }

    #[tokio::test]
    async fn unreachable_backend_without_mock_writes_surfaces_error() {
        let fx = Fixture::unreachable(false);
        let err = fx
            .lifecycle()
            .transition(
                &session(Role::SuperAdmin),
                &with_status(EntryStatus::Validated),
                Transition::Approve,
            )
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn backend_success_never_sets_flag() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/entries/e1/approve"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": "e1", "stationId": "st-1", "status": "APPROVED", "approvedBy": "Efua Owusu" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        let fx = Fixture::new(&server.uri(), true);
        let outcome = fx
            .lifecycle()
            .transition(
                &session(Role::SuperAdmin),
                &with_status(EntryStatus::Validated),
                Transition::Approve,
            )
            .await
            .unwrap();
        assert!(!outcome.applied_locally_only);
        assert_eq!(outcome.entry.status, EntryStatus::Approved);
    }

    #[tokio::test]
    async fn api_rejection_is_not_masked_by_local_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/entries/e1/validate"))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({ "message": "Entry already validated" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        let fx = Fixture::new(&server.uri(), true);
        let err = fx
            .lifecycle()
            .transition(
                &session(Role::Admin),
                &with_status(EntryStatus::Submitted),
                Transition::Validate,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn submit_records_cash_for_companion_check() {
        let fx = Fixture::unreachable(true);
        let manager = session(Role::StationManager);
        let outcome = fx
            .lifecycle()
            .transition(&manager, &complete_entry(), Transition::Submit)
            .await
            .unwrap();
        assert!(outcome.applied_locally_only);
        assert_eq!(
            fx.cache.cash_to_bank("st-1", date(), Product::Super),
            Some(265705.0)
        );

        // The Diesel entry for the same day is now checked against it.
        let mut diesel = complete_entry();
        diesel.product = Some(Product::Diesel);
        let diesel = reconcile::derive(diesel);
        let ctx = fx.lifecycle().validation_context(&diesel);
        assert_eq!(ctx.companion_cash_to_bank, Some(265705.0));
        let err = check(&diesel, &manager, &Transition::Submit, &ctx).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn prefill_carries_previous_day_and_supply() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/entries/previous"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "e0", "stationId": "st-1", "product": "Super",
                "closingSL": 6200.0, "closingSR": 125680.0, "status": "APPROVED"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/supply"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "deliveries": [{ "quantity": 9000.0 }, { "quantity": 6000.0 }]
            })))
            .mount(&server)
            .await;
        let fx = Fixture::new(&server.uri(), true);
        let manager = session(Role::StationManager);

        let mut draft = EntryDraft::new("st-1", Some("Tema Main"), ReferenceRates::default());
        assert_eq!(
            fx.lifecycle().prefill_from_previous(&manager, &mut draft).await.unwrap(),
            None,
            "no product selected yet"
        );

        draft.set_product(Some(Product::Super));
        draft.set_date(Some(date()));
        let source = fx
            .lifecycle()
            .prefill_from_previous(&manager, &mut draft)
            .await
            .unwrap();
        assert_eq!(source, Some(DataSource::Remote));
        assert_eq!(draft.entry().inputs.open_sl, Some(6200.0));
        assert_eq!(draft.entry().inputs.open_sr, Some(125680.0));

        let total = fx.lifecycle().prefill_supply(&manager, &mut draft).await.unwrap();
        assert_eq!(total, Some(15000.0));
        assert_eq!(draft.entry().inputs.supply, Some(15000.0));
    }

    #[tokio::test]
    async fn prefill_without_backend_leaves_draft_alone() {
        let fx = Fixture::unreachable(true);
        let manager = session(Role::StationManager);
        let mut draft = EntryDraft::new("st-1", None, ReferenceRates::default());
        draft.set_product(Some(Product::Diesel));
        draft.set_date(Some(date()));

        assert_eq!(fx.lifecycle().prefill_from_previous(&manager, &mut draft).await.unwrap(), None);
        assert_eq!(fx.lifecycle().prefill_supply(&manager, &mut draft).await.unwrap(), None);
        assert_eq!(draft.entry().inputs.open_sl, None);
    }
}
