//! Cookie/session correlation around producer calls.
//!
//! Every call to a producer runs inside an interaction. The
//! [`InteractionContext`] of the interaction carries the user's
//! [`ProducerSessionInformation`] and, under the `perGroup` cookie protocol,
//! the group of the targeted portlet. [`RequestHeaderClientHandler`] turns
//! stored cookies into the outbound `Cookie` header and stores the
//! `Set-Cookie` values of the response. [`SessionHandler`] owns the
//! per-user session information and runs `initCookie` when the producer
//! asks for it.
//!
//! [`ProducerSessionInformation`]: crate::session::ProducerSessionInformation

use dashmap::DashMap;
use hyper::header::{COOKIE, HeaderValue, SET_COOKIE};
use parking_lot::RwLock;
use tracing::{debug, info};
use wsrp_protocol::{CookieProtocol, Operations, RegistrationContext, WSRPResult};

use crate::cookie::{coalesce_cookies, parse_set_cookie};
use crate::endpoint::{MessageContext, ProducerEndpoint};
use crate::error::{ConsumerError, CookieError};
use crate::session::{ProducerSessionInformation, SharedSessionInfo};
use crate::{Clock, system_clock};

// ─────────────────────────────────────────────────────────────────────────────
// Interaction context
// ─────────────────────────────────────────────────────────────────────────────

/// State of one interaction with a producer. A reset context holds
/// nothing; session information is attached when the interaction starts
/// (or lazily by the first response carrying cookies).
#[derive(Debug, Default)]
pub struct InteractionContext {
    group_id: Option<String>,
    session_info: Option<SharedSessionInfo>,
}

impl InteractionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_info(session_info: SharedSessionInfo) -> Self {
        Self {
            group_id: None,
            session_info: Some(session_info),
        }
    }

    pub fn session_info(&self) -> Option<&SharedSessionInfo> {
        self.session_info.as_ref()
    }

    pub fn session_info_or_create(&mut self) -> SharedSessionInfo {
        self.session_info
            .get_or_insert_with(|| ProducerSessionInformation::new().shared())
            .clone()
    }

    pub fn current_group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn set_current_group_id(&mut self, group_id: Option<&str>) -> Result<(), CookieError> {
        let Some(info) = &self.session_info else {
            return Err(CookieError::IllegalState(
                "cannot set the current group id outside of an interaction".into(),
            ));
        };
        if info.lock().is_per_group_cookies() && group_id.is_none() {
            return Err(CookieError::IllegalArgument(
                "a group id is required while per-group cookies are in use".into(),
            ));
        }
        self.group_id = group_id.map(str::to_string);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.group_id = None;
        self.session_info = None;
    }

    pub fn is_reset(&self) -> bool {
        self.group_id.is_none() && self.session_info.is_none()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / response cookie handling
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct RequestHeaderClientHandler {
    clock: Clock,
}

impl Default for RequestHeaderClientHandler {
    fn default() -> Self {
        Self { clock: system_clock }
    }
}

impl RequestHeaderClientHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }

    /// Outbound leg: attach the stored cookies to the request.
    pub fn handle_request(&self, context: &InteractionContext, message: &mut MessageContext) -> Result<(), CookieError> {
        let Some(info) = context.session_info() else {
            return Ok(());
        };
        let header = info
            .lock()
            .cookie_header(context.current_group_id(), &message.endpoint, (self.clock)())?;

        if let Some(header) = header {
            let value = HeaderValue::from_str(&header)
                .map_err(|_| CookieError::IllegalArgument(format!("cookie header is not valid ASCII: {header}")))?;
            message.request_headers.insert(COOKIE, value);
            message.legacy_cookie = Some(header);
        }
        Ok(())
    }

    /// Inbound leg: validate and store the cookies the producer set.
    pub fn handle_response(&self, context: &mut InteractionContext, message: &MessageContext) -> Result<(), CookieError> {
        let values = message
            .response_headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| {
                v.to_str()
                    .map_err(|_| CookieError::Malformed("Set-Cookie header is not valid ASCII".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if values.is_empty() {
            return Ok(());
        }

        let cookies = parse_set_cookie(&coalesce_cookies(&values), (self.clock)())?
            .into_iter()
            .map(|c| c.accept(&message.endpoint))
            .collect::<Result<Vec<_>, _>>()?;
        let count = cookies.len();

        let info = context.session_info_or_create();
        let mut info = info.lock();
        if info.is_per_group_cookies() {
            let group = context.current_group_id().ok_or_else(|| {
                CookieError::IllegalState("per-group cookies are in use but no group id was set".into())
            })?;
            info.set_group_cookies(group, cookies);
            debug!("Stored {} cookies for group '{}' from {}", count, group, message.endpoint);
        } else {
            info.set_user_cookies(cookies);
            debug!("Stored {} user cookies from {}", count, message.endpoint);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session handler
// ─────────────────────────────────────────────────────────────────────────────

/// Per-user session information for one producer.
pub struct SessionHandler {
    cookie_protocol: RwLock<CookieProtocol>,
    sessions: DashMap<String, SharedSessionInfo>,
    headers: RequestHeaderClientHandler,
}

impl SessionHandler {
    pub fn new(cookie_protocol: CookieProtocol) -> Self {
        Self {
            cookie_protocol: RwLock::new(cookie_protocol),
            sessions: DashMap::new(),
            headers: RequestHeaderClientHandler::new(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.headers = RequestHeaderClientHandler::with_clock(clock);
        self
    }

    pub fn cookie_protocol(&self) -> CookieProtocol {
        *self.cookie_protocol.read()
    }

    /// A changed protocol invalidates every earlier initCookie.
    pub fn set_cookie_protocol(&self, protocol: CookieProtocol) {
        let mut current = self.cookie_protocol.write();
        if *current == protocol {
            return;
        }
        *current = protocol;
        for entry in self.sessions.iter() {
            let mut info = entry.value().lock();
            info.set_init_cookie_done(false);
            info.set_per_group_cookies(protocol == CookieProtocol::PerGroup);
        }
        info!("Cookie protocol changed to {:?}", protocol);
    }

    pub fn requires_init_cookie(&self) -> bool {
        self.cookie_protocol().requires_init_cookie()
    }

    pub fn session_info(&self, user_key: &str) -> Option<SharedSessionInfo> {
        self.sessions.get(user_key).map(|s| s.value().clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Forget everything kept for `user_key`.
    pub fn release(&self, user_key: &str) -> Option<SharedSessionInfo> {
        self.sessions.remove(user_key).map(|(_, info)| info)
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }

    /// Start an interaction of `user_key` with a portlet of `group_id`.
    /// The context is reset when the returned guard is dropped.
    pub fn begin_interaction(&self, user_key: &str, group_id: Option<&str>) -> Result<InteractionGuard<'_>, CookieError> {
        let info = self
            .sessions
            .entry(user_key.to_string())
            .or_insert_with(|| ProducerSessionInformation::new().shared())
            .clone();
        info.lock()
            .set_per_group_cookies(self.cookie_protocol() == CookieProtocol::PerGroup);

        let mut context = InteractionContext::with_session_info(info.clone());
        context.set_current_group_id(group_id)?;
        Ok(InteractionGuard {
            handler: self,
            user_key: user_key.to_string(),
            info,
            context,
        })
    }

    /// Run one producer call with cookie handling on both legs.
    pub fn exchange<T>(
        &self,
        guard: &mut InteractionGuard<'_>,
        endpoint: &dyn ProducerEndpoint,
        operation: &str,
        call: impl FnOnce(&dyn ProducerEndpoint) -> WSRPResult<T>,
    ) -> Result<T, ConsumerError> {
        let mut message = MessageContext::new(endpoint.address().clone());
        self.headers.handle_request(&guard.context, &mut message)?;
        endpoint.exchange_headers(operation, &mut message);
        let result = call(endpoint);
        self.headers.handle_response(&mut guard.context, &message)?;
        Ok(result?)
    }

    /// Call initCookie unless the producer does not need it or it already
    /// ran for this user (or group). Returns whether it ran.
    pub fn init_cookie_if_needed(
        &self,
        guard: &mut InteractionGuard<'_>,
        endpoint: &dyn ProducerEndpoint,
        registration: Option<&RegistrationContext>,
    ) -> Result<bool, ConsumerError> {
        if !self.requires_init_cookie() || guard.info.lock().is_init_cookie_done() {
            return Ok(false);
        }
        self.exchange(guard, endpoint, Operations::INIT_COOKIE, |e| e.markup().init_cookie(registration))?;
        guard.info.lock().set_init_cookie_done(true);
        debug!("initCookie done for user '{}'", guard.user_key);
        Ok(true)
    }

    /// The producer rejected our cookies: initCookie must run again.
    pub fn handle_invalid_cookie(&self, guard: &InteractionGuard<'_>) {
        guard.info.lock().set_init_cookie_done(false);
        info!("Producer reported invalid cookies for user '{}'", guard.user_key);
    }
}

/// An interaction in progress. Dropping the guard resets its context.
pub struct InteractionGuard<'a> {
    handler: &'a SessionHandler,
    user_key: String,
    info: SharedSessionInfo,
    context: InteractionContext,
}

impl InteractionGuard<'_> {
    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    pub fn session_info(&self) -> &SharedSessionInfo {
        &self.info
    }

    pub fn context(&self) -> &InteractionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut InteractionContext {
        &mut self.context
    }

    pub fn handler(&self) -> &SessionHandler {
        self.handler
    }
}

impl Drop for InteractionGuard<'_> {
    fn drop(&mut self) {
        self.context.reset();
    }
}
