//! WsrpProducer: the producer façade implementing the WSRP ports.
//!
//! Resolves the calling registration, binds the registration-checking
//! invoker to it and translates between port messages and invoker calls.
//! Port methods fail with `OperationFailed` unless the producer is running.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use wsrp_protocol::{
    BlockingInteractionResponse, ExportPortletsResponse, ExportedPortlet, FailedPortlets, ImportPortlet,
    ImportPortletsFailed, ImportPortletsResponse, ImportedPortlet, InteractionParams, Lifetime, MarkupPort,
    MarkupRequest, MarkupResponse, PortletContext, PortletDescription, PortletManagementPort, PortletStatus,
    PropertyChange, PropertyMap, RegistrationContext, RegistrationData, RegistrationPort, ServiceDescription,
    ServiceDescriptionPort, SessionContext, WSRPFault, WSRPResult,
};

use crate::config::ProducerConfiguration;
use crate::error::{ExportError, RegistrationError};
use crate::export::{ExportManager, ExportPersistenceManager, ExportPortletData, InMemoryExportStore};
use crate::invoker::{
    InvocationResponse, PortletInvocation, PortletInvoker, RegistrationCheckingPortletInvoker, RegistrationScope,
};
use crate::registration::{PolicyRegistry, Registration, RegistrationManager, RegistrationPersistenceManager, RegistrationStatus};

/// Milliseconds since the epoch.
pub type Clock = fn() -> i64;

pub fn system_clock() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Uninitialized,
    Running,
    Shutdown,
}

/// A portlet session handed out through a [`SessionContext`].
#[derive(Debug, Clone)]
struct PortletSession {
    portlet_handle: String,
    registration_id: Option<String>,
    last_access: i64,
}

pub struct WsrpProducer {
    config: RwLock<ProducerConfiguration>,
    policies: PolicyRegistry,
    registrations: Arc<RegistrationManager>,
    invoker: Arc<RegistrationCheckingPortletInvoker>,
    exports: ExportManager,
    sessions: DashMap<String, PortletSession>,
    state: RwLock<ProducerState>,
    clock: Clock,
}

impl WsrpProducer {
    /// Build a producer over `portlets`, storing registrations in
    /// `persistence`. By-reference exports are kept in memory when the
    /// configuration asks for them.
    pub fn new(
        config: ProducerConfiguration,
        persistence: Arc<dyn RegistrationPersistenceManager>,
        portlets: Arc<dyn PortletInvoker>,
    ) -> Result<Self, RegistrationError> {
        let export_store: Option<Arc<dyn ExportPersistenceManager>> = if config.export.by_reference {
            Some(Arc::new(InMemoryExportStore::new()))
        } else {
            None
        };
        Self::with_components(config, PolicyRegistry::with_defaults(), persistence, portlets, export_store)
    }

    pub fn with_components(
        config: ProducerConfiguration,
        policies: PolicyRegistry,
        persistence: Arc<dyn RegistrationPersistenceManager>,
        portlets: Arc<dyn PortletInvoker>,
        export_store: Option<Arc<dyn ExportPersistenceManager>>,
    ) -> Result<Self, RegistrationError> {
        let policy = policies.create(&config.registration_requirements.policy)?;
        let registrations = Arc::new(RegistrationManager::new(persistence, policy));
        let invoker = RegistrationCheckingPortletInvoker::new(portlets, registrations.clone());

        Ok(Self {
            config: RwLock::new(config),
            policies,
            registrations,
            invoker,
            exports: ExportManager::new(export_store),
            sessions: DashMap::new(),
            state: RwLock::new(ProducerState::Uninitialized),
            clock: system_clock,
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    pub fn start(&self) {
        let mut state = self.state.write();
        if *state == ProducerState::Uninitialized {
            *state = ProducerState::Running;
            info!("WSRP producer started");
        }
    }

    pub fn stop(&self) {
        let mut state = self.state.write();
        if *state == ProducerState::Shutdown {
            return;
        }
        *state = ProducerState::Shutdown;
        let dropped = self.sessions.len();
        self.sessions.clear();
        info!("WSRP producer stopped ({} sessions dropped)", dropped);
    }

    pub fn state(&self) -> ProducerState {
        *self.state.read()
    }

    fn ensure_running(&self) -> WSRPResult<()> {
        match self.state() {
            ProducerState::Running => Ok(()),
            ProducerState::Uninitialized => Err(WSRPFault::operation_failed("producer is not started")),
            ProducerState::Shutdown => Err(WSRPFault::operation_failed("producer is shut down")),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn configuration(&self) -> ProducerConfiguration {
        self.config.read().clone()
    }

    pub fn registration_manager(&self) -> &Arc<RegistrationManager> {
        &self.registrations
    }

    pub fn export_manager(&self) -> &ExportManager {
        &self.exports
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Apply a new configuration. A changed policy is re-created; changed
    /// registration properties force every registration through
    /// modifyRegistration.
    pub fn update_configuration(&self, config: ProducerConfiguration) -> Result<(), RegistrationError> {
        config
            .validate()
            .map_err(|e| RegistrationError::IllegalArgument(e.to_string()))?;

        let mut current = self.config.write();
        let old = &current.registration_requirements;
        let new = &config.registration_requirements;

        if old.policy != new.policy {
            self.registrations.set_policy(self.policies.create(&new.policy)?);
            info!("Registration policy set to '{}'", new.policy.name);
        }
        if old.registration_properties != new.registration_properties {
            self.registrations.mark_registrations_pending()?;
        }
        *current = config;
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Resolve the registration of a call to a usable registration.
    fn resolve_registration(&self, context: Option<&RegistrationContext>) -> WSRPResult<Option<Registration>> {
        let required = self.config.read().registration_requirements.registration_required;
        let Some(context) = context else {
            if required {
                return Err(WSRPFault::invalid_registration("registration is required"));
            }
            return Ok(None);
        };

        let handle = &context.registration_handle;
        let registration = self
            .registrations
            .get_registration(handle)
            .ok_or_else(|| WSRPFault::invalid_registration(format!("unknown registration handle '{handle}'")))?;
        match registration.status {
            RegistrationStatus::Valid => Ok(Some(registration)),
            RegistrationStatus::Pending => Err(WSRPFault::modify_registration_required(format!(
                "registration '{handle}' must be modified before use"
            ))),
            RegistrationStatus::Invalid => {
                Err(WSRPFault::invalid_registration(format!("registration '{handle}' is invalid")))
            }
        }
    }

    fn scope(&self, context: Option<&RegistrationContext>) -> WSRPResult<RegistrationScope<'_>> {
        self.ensure_running()?;
        Ok(self.invoker.for_registration(self.resolve_registration(context)?))
    }

    fn ensure_registration_supported(&self) -> WSRPResult<()> {
        self.ensure_running()?;
        if self.config.read().registration_requirements.registration_required {
            Ok(())
        } else {
            Err(WSRPFault::operation_failed(
                "registration should not be attempted when the producer does not require it",
            ))
        }
    }

    fn session_expired(expires: i32, now: i64, session: &PortletSession) -> bool {
        expires >= 0 && now - session.last_access > i64::from(expires) * 1000
    }

    /// Reject an unknown, foreign or expired incoming session id before the
    /// portlet is invoked.
    fn check_session(&self, request: &MarkupRequest, registration: Option<&Registration>) -> WSRPResult<()> {
        let Some(session_id) = &request.session_id else {
            return Ok(());
        };
        let now = self.now();
        let expires = self.config.read().session_expiration_time;
        let registration_id = registration.map(|r| r.id.as_str());

        let expired = {
            let session = self
                .sessions
                .get(session_id)
                .ok_or_else(|| WSRPFault::invalid_session(format!("unknown session '{session_id}'")))?;
            if session.registration_id.as_deref() != registration_id {
                return Err(WSRPFault::invalid_session(format!(
                    "session '{session_id}' belongs to another registration"
                )));
            }
            Self::session_expired(expires, now, &session)
        };
        if expired {
            self.sessions.remove(session_id);
            return Err(WSRPFault::invalid_session(format!("session '{session_id}' expired")));
        }
        Ok(())
    }

    /// Record the access on the checked session, or open a new one, and
    /// return the session to report back. Expired sessions are dropped
    /// before a new one is opened.
    fn record_session(&self, request: &MarkupRequest, registration: Option<&Registration>) -> SessionContext {
        let now = self.now();
        let expires = self.config.read().session_expiration_time;
        let registration_id = registration.map(|r| r.id.clone());

        if let Some(session_id) = &request.session_id {
            if let Some(mut session) = self.sessions.get_mut(session_id) {
                session.last_access = now;
                return SessionContext {
                    session_id: session_id.clone(),
                    expires,
                };
            }
        }

        let before = self.sessions.len();
        self.sessions.retain(|_, s| !Self::session_expired(expires, now, s));
        let swept = before.saturating_sub(self.sessions.len());
        if swept > 0 {
            debug!("Dropped {} expired sessions", swept);
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(
            session_id.clone(),
            PortletSession {
                portlet_handle: request.portlet_context.id().to_string(),
                registration_id,
                last_access: now,
            },
        );
        debug!("Opened session {} for portlet {}", session_id, request.portlet_context.id());
        SessionContext { session_id, expires }
    }

    fn default_export_lifetime(&self, requested: Option<&Lifetime>, now: i64) -> Option<Lifetime> {
        if let Some(lifetime) = requested {
            return Some(*lifetime);
        }
        self.config.read().export.default_lifetime_ms.map(|ms| Lifetime {
            current_time: now,
            termination_time: Some(now + ms),
            refresh_duration: None,
        })
    }
}

fn push_failure(failures: &mut Vec<FailedPortlets>, handle: &str, fault: WSRPFault) {
    let reason = Some(fault.message);
    match failures
        .iter_mut()
        .find(|f| f.error_code == fault.code && f.reason == reason)
    {
        Some(group) => group.portlet_handles.push(handle.to_string()),
        None => failures.push(FailedPortlets {
            portlet_handles: vec![handle.to_string()],
            error_code: fault.code,
            reason,
        }),
    }
}

fn push_import_failure(failures: &mut Vec<ImportPortletsFailed>, import_id: &str, fault: WSRPFault) {
    let reason = Some(fault.message);
    match failures
        .iter_mut()
        .find(|f| f.error_code == fault.code && f.reason == reason)
    {
        Some(group) => group.import_ids.push(import_id.to_string()),
        None => failures.push(ImportPortletsFailed {
            import_ids: vec![import_id.to_string()],
            error_code: fault.code,
            reason,
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ports
// ─────────────────────────────────────────────────────────────────────────────

impl ServiceDescriptionPort for WsrpProducer {
    fn get_service_description(
        &self,
        registration: Option<&RegistrationContext>,
        _desired_locales: &[String],
    ) -> WSRPResult<ServiceDescription> {
        self.ensure_running()?;
        let config = self.configuration();
        let requirements = &config.registration_requirements;

        // An unusable registration only hides the offered portlets.
        let registration = registration
            .and_then(|r| self.registrations.get_registration(&r.registration_handle))
            .filter(|r| r.status == RegistrationStatus::Valid);
        let full = !requirements.registration_required_for_full_description || registration.is_some();

        let offered_portlets = if full {
            self.invoker
                .for_registration(registration)
                .get_portlets()
                .map_err(WSRPFault::from)?
                .into_iter()
                .filter(|p| p.status == PortletStatus::Offered)
                .map(|p| p.description)
                .collect()
        } else {
            Vec::new()
        };

        Ok(ServiceDescription {
            requires_registration: requirements.registration_required,
            requires_init_cookie: config.cookie_protocol,
            offered_portlets,
            registration_properties: requirements.registration_properties.clone(),
            supports_export_by_value: self.exports.supports_export_by_value(),
        })
    }
}

impl RegistrationPort for WsrpProducer {
    fn register(&self, data: &RegistrationData) -> WSRPResult<RegistrationContext> {
        self.ensure_registration_supported()?;
        if data.consumer_name.trim().is_empty() {
            return Err(WSRPFault::missing_parameters("consumer name is required"));
        }

        let expectations = self.config.read().registration_requirements.expectations();
        let registration = self.registrations.add_registration_to(
            &data.consumer_name,
            data.registration_properties.clone(),
            &expectations,
            true,
        )?;
        Ok(registration.context())
    }

    fn modify_registration(
        &self,
        registration: &RegistrationContext,
        data: &RegistrationData,
    ) -> WSRPResult<Option<Vec<u8>>> {
        self.ensure_registration_supported()?;
        let handle = &registration.registration_handle;

        let consumer = self
            .registrations
            .get_consumer_for(handle)
            .ok_or_else(|| WSRPFault::invalid_registration(format!("unknown registration handle '{handle}'")))?;
        let identity = self
            .registrations
            .policy()
            .get_consumer_id_from(&data.consumer_name, &data.registration_properties)?;
        if identity != consumer.id {
            return Err(WSRPFault::inconsistent_parameters(format!(
                "registration '{handle}' does not belong to consumer '{}'",
                data.consumer_name
            )));
        }

        let expectations = self.config.read().registration_requirements.expectations();
        self.registrations
            .modify_registration(handle, data.registration_properties.clone(), &expectations)?;
        Ok(None)
    }

    fn deregister(&self, registration: &RegistrationContext) -> WSRPResult<()> {
        self.ensure_registration_supported()?;
        let removed = self
            .registrations
            .remove_registration(&registration.registration_handle)?;
        self.sessions
            .retain(|_, s| s.registration_id.as_deref() != Some(removed.id.as_str()));
        Ok(())
    }
}

impl MarkupPort for WsrpProducer {
    fn get_markup(
        &self,
        registration: Option<&RegistrationContext>,
        request: &MarkupRequest,
    ) -> WSRPResult<MarkupResponse> {
        let scope = self.scope(registration)?;
        let mut invocation = PortletInvocation::render(request.portlet_context.clone());
        invocation.params = request.markup_params.clone();
        invocation.user_key = request.user_context.as_ref().map(|u| u.user_context_key.clone());

        self.check_session(request, scope.registration())?;
        match scope.invoke(&invocation)? {
            InvocationResponse::Content { markup, mime_type, title } => {
                let session_context = self.record_session(request, scope.registration());
                Ok(MarkupResponse {
                    markup,
                    mime_type,
                    title,
                    session_context: Some(session_context),
                })
            }
            InvocationResponse::Update { .. } => Err(WSRPFault::operation_failed(format!(
                "portlet {} answered a render request with a state update",
                request.portlet_context.id()
            ))),
        }
    }

    fn perform_blocking_interaction(
        &self,
        registration: Option<&RegistrationContext>,
        request: &MarkupRequest,
        interaction: &InteractionParams,
    ) -> WSRPResult<BlockingInteractionResponse> {
        let scope = self.scope(registration)?;
        let mut invocation = PortletInvocation::action(
            request.portlet_context.clone(),
            interaction.portlet_state_change,
            interaction.form_parameters.clone(),
        );
        invocation.params = request.markup_params.clone();
        invocation.user_key = request.user_context.as_ref().map(|u| u.user_context_key.clone());

        self.check_session(request, scope.registration())?;
        match scope.invoke(&invocation)? {
            InvocationResponse::Update {
                new_context,
                navigational_state,
                new_mode,
            } => {
                let session_context = self.record_session(request, scope.registration());
                Ok(BlockingInteractionResponse {
                    new_portlet_context: new_context,
                    navigational_state,
                    new_mode,
                    session_context: Some(session_context),
                })
            }
            InvocationResponse::Content { .. } => Err(WSRPFault::operation_failed(format!(
                "portlet {} answered an interaction with markup",
                request.portlet_context.id()
            ))),
        }
    }

    fn init_cookie(&self, registration: Option<&RegistrationContext>) -> WSRPResult<()> {
        self.ensure_running()?;
        self.resolve_registration(registration)?;
        debug!("initCookie ({:?})", self.config.read().cookie_protocol);
        Ok(())
    }

    fn release_sessions(
        &self,
        registration: Option<&RegistrationContext>,
        session_ids: &[String],
    ) -> WSRPResult<()> {
        self.ensure_running()?;
        let registration_id = self.resolve_registration(registration)?.map(|r| r.id);
        for session_id in session_ids {
            let removed = self
                .sessions
                .remove_if(session_id, |_, s| s.registration_id == registration_id);
            if let Some((id, session)) = removed {
                debug!("Released session {} of portlet {}", id, session.portlet_handle);
            }
        }
        Ok(())
    }
}

impl PortletManagementPort for WsrpProducer {
    fn get_portlet_description(
        &self,
        registration: Option<&RegistrationContext>,
        portlet: &PortletContext,
    ) -> WSRPResult<PortletDescription> {
        let scope = self.scope(registration)?;
        Ok(scope.get_portlet(portlet)?.description)
    }

    fn clone_portlet(
        &self,
        registration: Option<&RegistrationContext>,
        portlet: &PortletContext,
    ) -> WSRPResult<PortletContext> {
        let scope = self.scope(registration)?;
        Ok(scope.create_clone(portlet)?)
    }

    fn destroy_portlets(
        &self,
        registration: Option<&RegistrationContext>,
        portlet_handles: &[String],
    ) -> WSRPResult<Vec<FailedPortlets>> {
        let scope = self.scope(registration)?;
        if portlet_handles.is_empty() {
            return Err(WSRPFault::missing_parameters("no portlet handles to destroy"));
        }

        let mut failures = Vec::new();
        let mut clones = Vec::new();
        for handle in portlet_handles {
            let context = PortletContext::new(handle);
            match scope.get_status(&context)? {
                Some(PortletStatus::Cloned) => clones.push(context),
                Some(PortletStatus::Offered) => push_failure(
                    &mut failures,
                    handle,
                    WSRPFault::inconsistent_parameters("offered portlets cannot be destroyed"),
                ),
                None => push_failure(&mut failures, handle, WSRPFault::invalid_handle(handle)),
            }
        }

        if !clones.is_empty() {
            for failure in scope.destroy_clones(&clones)? {
                push_failure(
                    &mut failures,
                    &failure.portlet_id,
                    WSRPFault::operation_failed(failure.reason),
                );
            }
        }
        Ok(failures)
    }

    fn get_portlet_properties(
        &self,
        registration: Option<&RegistrationContext>,
        portlet: &PortletContext,
        names: Option<&[String]>,
    ) -> WSRPResult<PropertyMap> {
        let scope = self.scope(registration)?;
        Ok(scope.get_properties(portlet, names)?)
    }

    fn set_portlet_properties(
        &self,
        registration: Option<&RegistrationContext>,
        portlet: &PortletContext,
        changes: &[PropertyChange],
    ) -> WSRPResult<PortletContext> {
        let scope = self.scope(registration)?;
        if changes.is_empty() {
            return Err(WSRPFault::missing_parameters("no property changes"));
        }
        Ok(scope.set_properties(portlet, changes)?)
    }

    fn export_portlets(
        &self,
        registration: Option<&RegistrationContext>,
        portlets: &[PortletContext],
        export_by_value_required: bool,
        lifetime: Option<&Lifetime>,
    ) -> WSRPResult<ExportPortletsResponse> {
        let scope = self.scope(registration)?;
        if portlets.is_empty() {
            return Err(WSRPFault::missing_parameters("no portlets to export"));
        }

        let now = self.now();
        let lifetime = self.default_export_lifetime(lifetime, now);
        let mut context = self
            .exports
            .create_export_context(export_by_value_required, lifetime.as_ref(), now)?;

        let mut exported_portlets = Vec::new();
        let mut failed_portlets = Vec::new();
        for portlet in portlets {
            let exported = scope
                .export_portlet(portlet)
                .map_err(WSRPFault::from)
                .and_then(|exported| {
                    let state = exported.portlet_state.unwrap_or_default();
                    let data = ExportPortletData::new(portlet.id(), state);
                    Ok(self.exports.encode_portlet_data(&context, &data)?)
                });
            match exported {
                Ok(export_data) => {
                    context.portlet_handles.push(portlet.id().to_string());
                    exported_portlets.push(ExportedPortlet {
                        portlet_handle: portlet.id().to_string(),
                        export_data,
                    });
                }
                Err(fault) => {
                    debug!("Could not export portlet {}: {}", portlet.id(), fault);
                    push_failure(&mut failed_portlets, portlet.id(), fault);
                }
            }
        }

        let export_context = self.exports.encode_export_context(&context)?;
        let lifetime = context.reference_id.as_ref().map(|_| Lifetime {
            current_time: now,
            termination_time: context.termination_time,
            refresh_duration: lifetime.and_then(|l| l.refresh_duration),
        });
        info!(
            "Exported {} portlets ({} failed, {})",
            exported_portlets.len(),
            portlets.len() - exported_portlets.len(),
            if context.export_by_value { "by value" } else { "by reference" }
        );

        Ok(ExportPortletsResponse {
            export_context,
            exported_portlets,
            failed_portlets,
            lifetime,
        })
    }

    fn import_portlets(
        &self,
        registration: Option<&RegistrationContext>,
        export_context: &[u8],
        portlets: &[ImportPortlet],
        _lifetime: Option<&Lifetime>,
    ) -> WSRPResult<ImportPortletsResponse> {
        let scope = self.scope(registration)?;
        if portlets.is_empty() {
            return Err(WSRPFault::missing_parameters("no portlets to import"));
        }

        let context = self.exports.decode_export_context(export_context)?;
        self.exports.check_validity(&context, self.now())?;

        let mut response = ImportPortletsResponse::default();
        for import in portlets {
            let imported = self
                .exports
                .decode_portlet_data(&import.export_data)
                .map_err(WSRPFault::from)
                .and_then(|data| {
                    let exported = PortletContext::with_state(data.portlet_handle, data.state);
                    Ok(scope.import_portlet(&exported)?)
                });
            match imported {
                Ok(portlet_context) => response.import_results.push(ImportedPortlet {
                    import_id: import.import_id.clone(),
                    portlet_context,
                }),
                Err(fault) => {
                    warn!("Could not import {}: {}", import.import_id, fault);
                    push_import_failure(&mut response.import_failures, &import.import_id, fault);
                }
            }
        }
        info!(
            "Imported {} portlets ({} failed)",
            response.import_results.len(),
            portlets.len() - response.import_results.len()
        );
        Ok(response)
    }

    fn release_export(
        &self,
        registration: Option<&RegistrationContext>,
        export_context: &[u8],
    ) -> WSRPResult<()> {
        self.scope(registration)?;
        match self.exports.release_export(export_context) {
            Ok(()) | Err(ExportError::NoSuchExport(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn set_export_lifetime(
        &self,
        registration: Option<&RegistrationContext>,
        export_context: &[u8],
        lifetime: Option<&Lifetime>,
    ) -> WSRPResult<Option<Lifetime>> {
        self.scope(registration)?;
        Ok(self.exports.set_export_lifetime(export_context, lifetime, self.now())?)
    }
}
