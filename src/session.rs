//! Signed-in user session.
//!
//! A [`Session`] is created at login and passed explicitly to the services
//! that need a bearer token or a role. The token lives in the
//! [`CredentialStore`]; the minimal profile is kept in the local cache so the
//! dashboard can be restored after a restart.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::db::LocalCache;
use crate::error::{LedgerError, Result};
use crate::storage::{CredentialStore, KEY_AUTH_TOKEN};

const SESSION_CATEGORY: &str = "session";
const PROFILE_KEY: &str = "user_profile";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Enters daily data for their own station.
    #[serde(alias = "manager", alias = "STATION_MANAGER")]
    StationManager,
    /// Validates submitted entries.
    #[serde(alias = "ADMIN", alias = "validator")]
    Admin,
    /// Approves validated entries and price changes.
    #[serde(alias = "SUPER_ADMIN", alias = "superadmin", alias = "approver")]
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::StationManager => "station_manager",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    /// Home station for station managers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_name: Option<String>,
}

pub struct Session {
    token: Zeroizing<String>,
    pub user: UserProfile,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

impl Session {
    pub fn new(token: impl Into<String>, user: UserProfile) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
            user,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    /// Display name used when stamping workflow actions.
    pub fn actor(&self) -> &str {
        if self.user.name.trim().is_empty() {
            &self.user.id
        } else {
            &self.user.name
        }
    }

    /// Whether this user owns entries of the given station.
    pub fn owns_station(&self, station_id: &str) -> bool {
        self.user.role == Role::StationManager
            && self.user.station_id.as_deref() == Some(station_id)
    }

    /// `exp` claim of the token, when it is a JWT that carries one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let payload = self.token.split('.').nth(1)?;
        let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        let claims: Value = serde_json::from_slice(&decoded).ok()?;
        let exp = claims.get("exp")?.as_i64()?;
        Utc.timestamp_opt(exp, 0).single()
    }

    /// Opaque tokens are treated as valid until the backend says otherwise.
    pub fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|exp| exp <= Utc::now())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn save(&self, secrets: &dyn CredentialStore, cache: &LocalCache) -> Result<()> {
        secrets.set(KEY_AUTH_TOKEN, &self.token)?;
        let profile = serde_json::to_string(&self.user)?;
        cache.set_setting(SESSION_CATEGORY, PROFILE_KEY, &profile)?;
        info!(user_id = %self.user.id, role = %self.user.role, "session saved");
        Ok(())
    }

    /// Restore the last saved session. Missing pieces, an undecodable
    /// profile, or an expired token all yield `None`.
    pub fn restore(secrets: &dyn CredentialStore, cache: &LocalCache) -> Option<Session> {
        let token = secrets.get(KEY_AUTH_TOKEN)?;
        let raw = cache.get_setting(SESSION_CATEGORY, PROFILE_KEY)?;
        let user: UserProfile = match serde_json::from_str(&raw) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "stored user profile is unreadable");
                return None;
            }
        };
        let session = Session::new(token, user);
        if session.is_expired() {
            info!(user_id = %session.user.id, "stored session expired");
            return None;
        }
        Some(session)
    }

    /// Forget the session and everything cached for it.
    pub fn clear(secrets: &dyn CredentialStore, cache: &LocalCache) -> Result<()> {
        secrets.delete(KEY_AUTH_TOKEN)?;
        cache.clear_user_data()?;
        info!("session cleared");
        Ok(())
    }
}

/// Fail with [`LedgerError::NotAuthenticated`] unless a live session exists.
pub fn require(session: Option<&Session>) -> Result<&Session> {
    match session {
        Some(s) if !s.is_expired() => Ok(s),
        _ => Err(LedgerError::NotAuthenticated),
    }
}
