//! WsrpConsumer: the consumer side of one producer.
//!
//! Markup calls run inside an interaction of the end user so that cookies
//! and portlet sessions follow the user across calls. Exports are recorded
//! in the migration service until they are imported, released or expire.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use wsrp_protocol::{
    BlockingInteractionResponse, ExportPortletsResponse, FailedPortlets, ImportPortlet, InteractionParams, Lifetime, MarkupRequest,
    MarkupResponse, Operations, PortletContext, PropertyChange, PropertyMap, RegistrationContext, SessionContext,
    UserContext, WSRPErrorCode, WSRPResult,
};

use crate::endpoint::ProducerEndpoint;
use crate::error::{ConsumerError, MigrationError};
use crate::handler::SessionHandler;
use crate::migration::{ExportInfo, ImportInfo, MigrationService};
use crate::producer_info::{ProducerInfo, RefreshResult};
use crate::{Clock, system_clock};

pub struct WsrpConsumer {
    info: RwLock<ProducerInfo>,
    endpoint: Arc<dyn ProducerEndpoint>,
    sessions: SessionHandler,
    migration: Arc<dyn MigrationService>,
    clock: Clock,
}

impl WsrpConsumer {
    pub fn new(info: ProducerInfo, endpoint: Arc<dyn ProducerEndpoint>, migration: Arc<dyn MigrationService>) -> Self {
        let sessions = SessionHandler::new(info.cookie_protocol());
        Self {
            info: RwLock::new(info),
            endpoint,
            sessions,
            migration,
            clock: system_clock,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.sessions = self.sessions.with_clock(clock);
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn producer_info(&self) -> ProducerInfo {
        self.info.read().clone()
    }

    pub fn producer_id(&self) -> String {
        self.info.read().id.clone()
    }

    pub fn session_handler(&self) -> &SessionHandler {
        &self.sessions
    }

    pub fn migration_service(&self) -> &Arc<dyn MigrationService> {
        &self.migration
    }

    pub fn registration_context(&self) -> Option<RegistrationContext> {
        self.info.read().registration_context().cloned()
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn ensure_active(&self) -> Result<(), ConsumerError> {
        let info = self.info.read();
        if info.active {
            Ok(())
        } else {
            Err(ConsumerError::Inactive(info.id.clone()))
        }
    }

    // ── Producer information & registration ─────────────────────────────

    /// Refresh the service description and pick up the producer's cookie
    /// protocol.
    pub fn refresh(&self, force: bool) -> Result<RefreshResult, ConsumerError> {
        let mut info = self.info.write();
        let result = info.refresh(force, self.now(), self.endpoint.service_description())?;
        self.sessions.set_cookie_protocol(info.cookie_protocol());
        Ok(result)
    }

    pub fn register(&self) -> Result<RegistrationContext, ConsumerError> {
        self.info.write().register(self.endpoint.registration())
    }

    pub fn modify_registration(&self) -> Result<(), ConsumerError> {
        self.info.write().modify_registration(self.endpoint.registration())
    }

    /// Deregister; every user session with the producer is dropped.
    pub fn deregister(&self) -> Result<(), ConsumerError> {
        self.info.write().deregister(self.endpoint.registration())?;
        self.sessions.clear();
        Ok(())
    }

    pub fn set_active(&self, active: bool) {
        self.info.write().active = active;
    }

    // ── Markup ───────────────────────────────────────────────────────────

    pub fn get_markup(
        &self,
        user_key: &str,
        portlet: &PortletContext,
        group_id: Option<&str>,
    ) -> Result<MarkupResponse, ConsumerError> {
        self.markup_call(
            user_key,
            portlet,
            group_id,
            Operations::GET_MARKUP,
            |endpoint, registration, request| endpoint.markup().get_markup(registration, request),
            |response| response.session_context.as_ref(),
        )
    }

    pub fn perform_blocking_interaction(
        &self,
        user_key: &str,
        portlet: &PortletContext,
        group_id: Option<&str>,
        interaction: &InteractionParams,
    ) -> Result<BlockingInteractionResponse, ConsumerError> {
        self.markup_call(
            user_key,
            portlet,
            group_id,
            Operations::PERFORM_BLOCKING_INTERACTION,
            |endpoint, registration, request| {
                endpoint
                    .markup()
                    .perform_blocking_interaction(registration, request, interaction)
            },
            |response| response.session_context.as_ref(),
        )
    }

    /// Release the producer sessions of `user_key` and forget its cookies.
    pub fn release_sessions(&self, user_key: &str) -> Result<(), ConsumerError> {
        let Some(info) = self.sessions.release(user_key) else {
            return Ok(());
        };
        let session_ids = info.lock().clear_sessions();
        if session_ids.is_empty() {
            return Ok(());
        }
        let registration = self.registration_context();
        self.endpoint
            .markup()
            .release_sessions(registration.as_ref(), &session_ids)?;
        debug!("Released {} sessions of user '{}'", session_ids.len(), user_key);
        Ok(())
    }

    /// One markup call within an interaction of `user_key`: runs initCookie
    /// when needed, reuses the portlet's session, and retries once after
    /// an invalid cookie or an invalid session.
    fn markup_call<T>(
        &self,
        user_key: &str,
        portlet: &PortletContext,
        group_id: Option<&str>,
        operation: &str,
        call: impl Fn(&dyn ProducerEndpoint, Option<&RegistrationContext>, &MarkupRequest) -> WSRPResult<T>,
        session_of: impl Fn(&T) -> Option<&SessionContext>,
    ) -> Result<T, ConsumerError> {
        self.ensure_active()?;
        let registration = self.registration_context();
        let registration = registration.as_ref();
        let endpoint = self.endpoint.as_ref();

        let mut guard = self.sessions.begin_interaction(user_key, group_id)?;
        self.sessions.init_cookie_if_needed(&mut guard, endpoint, registration)?;

        let mut request = MarkupRequest::new(portlet.clone());
        request.user_context = Some(UserContext {
            user_context_key: user_key.to_string(),
            user_categories: Vec::new(),
        });
        request.session_id = guard.session_info().lock().session_id_for(portlet.id(), self.now());

        let mut retried = false;
        let response = loop {
            let result = self
                .sessions
                .exchange(&mut guard, endpoint, operation, |e| call(e, registration, &request));
            match result {
                Err(ConsumerError::Fault(fault)) if !retried && fault.code == WSRPErrorCode::InvalidCookie => {
                    retried = true;
                    self.sessions.handle_invalid_cookie(&guard);
                    self.sessions.init_cookie_if_needed(&mut guard, endpoint, registration)?;
                }
                Err(ConsumerError::Fault(fault))
                    if !retried && fault.code == WSRPErrorCode::InvalidSession && request.session_id.is_some() =>
                {
                    retried = true;
                    debug!("Session of portlet {} is gone: {}", portlet.id(), fault);
                    guard.session_info().lock().remove_sessions_for(portlet.id());
                    request.session_id = None;
                }
                other => break other?,
            }
        };

        if let Some(session) = session_of(&response) {
            guard.session_info().lock().add_session(portlet.id(), session, self.now());
        }
        Ok(response)
    }

    // ── Portlet management ───────────────────────────────────────────────

    pub fn clone_portlet(&self, portlet: &PortletContext) -> Result<PortletContext, ConsumerError> {
        self.ensure_active()?;
        let registration = self.registration_context();
        Ok(self
            .endpoint
            .portlet_management()
            .clone_portlet(registration.as_ref(), portlet)?)
    }

    pub fn destroy_portlets(&self, portlet_handles: &[String]) -> Result<Vec<FailedPortlets>, ConsumerError> {
        self.ensure_active()?;
        let registration = self.registration_context();
        Ok(self
            .endpoint
            .portlet_management()
            .destroy_portlets(registration.as_ref(), portlet_handles)?)
    }

    pub fn get_portlet_properties(&self, portlet: &PortletContext) -> Result<PropertyMap, ConsumerError> {
        self.ensure_active()?;
        let registration = self.registration_context();
        Ok(self
            .endpoint
            .portlet_management()
            .get_portlet_properties(registration.as_ref(), portlet, None)?)
    }

    pub fn set_portlet_properties(
        &self,
        portlet: &PortletContext,
        changes: &[PropertyChange],
    ) -> Result<PortletContext, ConsumerError> {
        self.ensure_active()?;
        let registration = self.registration_context();
        Ok(self
            .endpoint
            .portlet_management()
            .set_portlet_properties(registration.as_ref(), portlet, changes)?)
    }

    // ── Migration ────────────────────────────────────────────────────────

    /// Export `portlets` and record the export.
    pub fn export_portlets(
        &self,
        portlets: &[PortletContext],
        export_by_value_required: bool,
        lifetime: Option<&Lifetime>,
    ) -> Result<ExportInfo, ConsumerError> {
        self.ensure_active()?;
        let registration = self.registration_context();
        let response = self.endpoint.portlet_management().export_portlets(
            registration.as_ref(),
            portlets,
            export_by_value_required,
            lifetime,
        )?;

        let export = self.record_export(&response, registration.as_ref())?;
        info!(
            "Exported {} of {} portlets from '{}'",
            response.exported_portlets.len(),
            portlets.len(),
            self.producer_id()
        );
        Ok(export)
    }

    /// Record an export under its export time, moved past any export
    /// already recorded for the same millisecond. The export is released on
    /// the producer when it cannot be recorded.
    fn record_export(
        &self,
        response: &ExportPortletsResponse,
        registration: Option<&RegistrationContext>,
    ) -> Result<ExportInfo, ConsumerError> {
        let mut export_time = self.now();
        loop {
            let export = ExportInfo::from_response(export_time, response);
            match self.migration.add(export.clone()) {
                Ok(()) => return Ok(export),
                Err(MigrationError::AlreadyExists(taken)) => export_time = taken + 1,
                Err(e) => {
                    if let Err(fault) = self
                        .endpoint
                        .portlet_management()
                        .release_export(registration, &response.export_context)
                    {
                        warn!("Could not release unrecorded export on '{}': {}", self.producer_id(), fault);
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// Import portlets of `export` into this consumer's producer.
    /// `selections` pairs an import id with an exported portlet handle.
    pub fn import_portlets(&self, export: &ExportInfo, selections: &[(&str, &str)]) -> Result<ImportInfo, ConsumerError> {
        self.ensure_active()?;
        let now = self.now();
        if export.is_expired_at(now) {
            return Err(ConsumerError::ExportExpired(export.export_time()));
        }

        let portlets = selections
            .iter()
            .map(|(import_id, handle)| -> Result<ImportPortlet, ConsumerError> {
                let export_data = export.portlet_state(handle).ok_or_else(|| ConsumerError::NotExported {
                    export_time: export.export_time(),
                    handle: handle.to_string(),
                })?;
                Ok(ImportPortlet {
                    import_id: import_id.to_string(),
                    export_data: export_data.to_vec(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let registration = self.registration_context();
        let response = self.endpoint.portlet_management().import_portlets(
            registration.as_ref(),
            export.export_context(),
            &portlets,
            None,
        )?;
        let imported = ImportInfo::from_response(now, &response);
        if !imported.errors().is_empty() {
            warn!("{} portlets could not be imported into '{}'", response.import_failures.len(), self.producer_id());
        }
        Ok(imported)
    }

    /// Tell the producer the export is no longer needed and forget it.
    pub fn release_export(&self, export_time: i64) -> Result<Option<ExportInfo>, ConsumerError> {
        self.ensure_active()?;
        let export = self
            .migration
            .get_export_info(export_time)
            .ok_or(MigrationError::NoSuchExport(export_time))?;
        let registration = self.registration_context();
        self.endpoint
            .portlet_management()
            .release_export(registration.as_ref(), export.export_context())?;
        Ok(self.migration.remove(&export))
    }

    pub fn set_export_lifetime(&self, export_time: i64, lifetime: Option<&Lifetime>) -> Result<ExportInfo, ConsumerError> {
        self.ensure_active()?;
        let export = self
            .migration
            .get_export_info(export_time)
            .ok_or(MigrationError::NoSuchExport(export_time))?;
        let registration = self.registration_context();
        let granted = self.endpoint.portlet_management().set_export_lifetime(
            registration.as_ref(),
            export.export_context(),
            lifetime,
        )?;

        let export = export.with_expiration_time(granted.and_then(|l| l.termination_time));
        self.migration.update(export.clone())?;
        Ok(export)
    }

    pub fn remove_expired_exports(&self) -> Vec<ExportInfo> {
        self.migration.remove_expired(self.now())
    }
}
