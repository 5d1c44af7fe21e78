//! Per-user session state kept for one producer: cookies handed out by
//! the producer and the portlet sessions it established.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;
use wsrp_protocol::SessionContext;

use crate::cookie::{Cookie, coalesce_cookies};
use crate::error::CookieError;

/// Session information shared between the interactions of one user.
pub type SharedSessionInfo = Arc<Mutex<ProducerSessionInformation>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortletSession {
    pub session_id: String,
    pub portlet_handle: String,
    /// Milliseconds since the epoch; never expires when absent.
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ProducerSessionInformation {
    user_cookies: Vec<Cookie>,
    group_cookies: BTreeMap<String, Vec<Cookie>>,
    per_group_cookies: bool,
    init_cookie_done: bool,
    sessions: BTreeMap<String, PortletSession>,
}

impl ProducerSessionInformation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedSessionInfo {
        Arc::new(Mutex::new(self))
    }

    // ── Cookies ──────────────────────────────────────────────────────────

    pub fn is_per_group_cookies(&self) -> bool {
        self.per_group_cookies
    }

    pub fn set_per_group_cookies(&mut self, per_group: bool) {
        self.per_group_cookies = per_group;
    }

    pub fn is_init_cookie_done(&self) -> bool {
        self.init_cookie_done
    }

    pub fn set_init_cookie_done(&mut self, done: bool) {
        self.init_cookie_done = done;
    }

    pub fn user_cookies(&self) -> &[Cookie] {
        &self.user_cookies
    }

    pub fn group_cookies(&self, group_id: &str) -> &[Cookie] {
        self.group_cookies.get(group_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Store cookies received outside of any group; a cookie replaces an
    /// earlier one with the same name, domain and path.
    pub fn set_user_cookies(&mut self, cookies: Vec<Cookie>) {
        merge(&mut self.user_cookies, cookies);
    }

    pub fn set_group_cookies(&mut self, group_id: &str, cookies: Vec<Cookie>) {
        merge(self.group_cookies.entry(group_id.to_string()).or_default(), cookies);
    }

    pub fn clear_cookies(&mut self) {
        self.user_cookies.clear();
        self.group_cookies.clear();
    }

    /// The coalesced `Cookie` header for a request to `url`: the group's
    /// cookies first, then the user's. Expired cookies are dropped.
    pub fn cookie_header(&mut self, group_id: Option<&str>, url: &Url, now: i64) -> Result<Option<String>, CookieError> {
        if self.per_group_cookies && group_id.is_none() {
            return Err(CookieError::IllegalState(
                "per-group cookies are in use but no group id was set for this interaction".into(),
            ));
        }

        self.user_cookies.retain(|c| !c.is_expired_at(now));
        let mut values = Vec::new();
        if let Some(group) = group_id.and_then(|g| self.group_cookies.get_mut(g)) {
            group.retain(|c| !c.is_expired_at(now));
            values.extend(group.iter().filter(|c| c.matches(url)).map(Cookie::header_value));
        }
        values.extend(self.user_cookies.iter().filter(|c| c.matches(url)).map(Cookie::header_value));

        if values.is_empty() {
            Ok(None)
        } else {
            Ok(Some(coalesce_cookies(&values)))
        }
    }

    // ── Portlet sessions ─────────────────────────────────────────────────

    pub fn add_session(&mut self, portlet_handle: &str, context: &SessionContext, now: i64) {
        let expires_at = (context.expires >= 0).then(|| now + i64::from(context.expires) * 1000);
        self.sessions.insert(
            context.session_id.clone(),
            PortletSession {
                session_id: context.session_id.clone(),
                portlet_handle: portlet_handle.to_string(),
                expires_at,
            },
        );
    }

    /// The live session established for `portlet_handle`, if any. Expired
    /// sessions are forgotten.
    pub fn session_id_for(&mut self, portlet_handle: &str, now: i64) -> Option<String> {
        self.sessions.retain(|_, s| s.expires_at.is_none_or(|t| t > now));
        self.sessions
            .values()
            .find(|s| s.portlet_handle == portlet_handle)
            .map(|s| s.session_id.clone())
    }

    pub fn remove_session(&mut self, session_id: &str) -> Option<PortletSession> {
        self.sessions.remove(session_id)
    }

    pub fn remove_sessions_for(&mut self, portlet_handle: &str) -> Vec<PortletSession> {
        let ids: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.portlet_handle == portlet_handle)
            .map(|s| s.session_id.clone())
            .collect();
        ids.iter().filter_map(|id| self.sessions.remove(id)).collect()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn clear_sessions(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sessions).into_keys().collect()
    }
}

fn merge(existing: &mut Vec<Cookie>, cookies: Vec<Cookie>) {
    for cookie in cookies {
        existing.retain(|c| !c.same_identity(&cookie));
        existing.push(cookie);
    }
}
