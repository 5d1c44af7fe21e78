//! RegistrationCheckingPortletInvoker: enforces which portlets a
//! registration may touch.
//!
//! The calling registration is passed explicitly: [`for_registration`]
//! returns a [`RegistrationScope`] which is itself a [`PortletInvoker`].
//! Without a registration every call passes straight through. With one,
//! a portlet is reachable when the registration policy allows it and the
//! registration either created the portlet or the portlet is offered.
//!
//! [`for_registration`]: RegistrationCheckingPortletInvoker::for_registration

use std::sync::Arc;

use tracing::{debug, warn};
use wsrp_protocol::{PortletContext, PortletStatus, PropertyChange, PropertyMap};

use crate::error::PortletInvokerError;
use crate::invoker::{DestroyCloneFailure, InvocationResponse, Portlet, PortletInvocation, PortletInvoker};
use crate::registration::{Registration, RegistrationDestructionListener, RegistrationManager, Vote};

pub struct RegistrationCheckingPortletInvoker {
    next: Arc<dyn PortletInvoker>,
    registrations: Arc<RegistrationManager>,
}

impl RegistrationCheckingPortletInvoker {
    /// Wrap `next` and subscribe to registration destruction so that a
    /// registration's clones go away with it.
    pub fn new(next: Arc<dyn PortletInvoker>, registrations: Arc<RegistrationManager>) -> Arc<Self> {
        let invoker = Arc::new(Self {
            next,
            registrations: registrations.clone(),
        });
        let listener: Arc<dyn RegistrationDestructionListener> = invoker.clone();
        registrations.add_destruction_listener(&listener);
        invoker
    }

    pub fn for_registration(&self, registration: Option<Registration>) -> RegistrationScope<'_> {
        RegistrationScope {
            invoker: self,
            registration,
        }
    }

    pub fn next(&self) -> &Arc<dyn PortletInvoker> {
        &self.next
    }
}

impl RegistrationDestructionListener for RegistrationCheckingPortletInvoker {
    fn on_registration_destruction(&self, registration: &Registration) -> Vote {
        let contexts = registration.known_portlet_contexts();
        if contexts.is_empty() {
            return Vote::Accept;
        }

        let failures = match self.next.destroy_clones(&contexts) {
            Ok(failures) => failures,
            Err(e) => return Vote::Reject(format!("could not destroy clones: {e}")),
        };
        if failures.is_empty() {
            debug!("Destroyed {} clones of registration {}", contexts.len(), registration.handle);
            return Vote::Accept;
        }

        // The registration survives; forget the clones that are gone.
        for context in &contexts {
            if failures.iter().all(|f| f.portlet_id != context.id()) {
                if let Err(e) = self.registrations.remove_portlet_context(&registration.id, context) {
                    warn!("Could not forget destroyed clone {}: {}", context.id(), e);
                }
            }
        }
        let failed: Vec<&str> = failures.iter().map(|f| f.portlet_id.as_str()).collect();
        Vote::Reject(format!("could not destroy clones {}", failed.join(", ")))
    }
}

/// The checking invoker bound to the registration (if any) of one call.
pub struct RegistrationScope<'a> {
    invoker: &'a RegistrationCheckingPortletInvoker,
    registration: Option<Registration>,
}

impl RegistrationScope<'_> {
    pub fn registration(&self) -> Option<&Registration> {
        self.registration.as_ref()
    }

    fn next(&self) -> &dyn PortletInvoker {
        self.invoker.next.as_ref()
    }

    /// Latest stored version of the scope's registration.
    fn current(&self) -> Option<Registration> {
        let registration = self.registration.as_ref()?;
        Some(
            self.invoker
                .registrations
                .get_registration_by_id(&registration.id)
                .unwrap_or_else(|| registration.clone()),
        )
    }

    fn check_operation_is_allowed(
        &self,
        portlet: &PortletContext,
        operation: &str,
    ) -> Result<(), PortletInvokerError> {
        let Some(registration) = self.current() else {
            return Ok(());
        };
        let policy = self.invoker.registrations.policy();
        let allowed = policy.allow_access_to(portlet, &registration, operation)
            && (registration.knows(portlet)
                || self.next().get_status(portlet)? == Some(PortletStatus::Offered));
        if allowed {
            Ok(())
        } else {
            debug!(
                "Registration {} denied {} on portlet {}",
                registration.handle,
                operation,
                portlet.id()
            );
            Err(PortletInvokerError::NoSuchPortlet(portlet.id().to_string()))
        }
    }

    fn remember(&self, portlet: &PortletContext) -> Result<(), PortletInvokerError> {
        if let Some(registration) = &self.registration {
            self.invoker
                .registrations
                .add_portlet_context(&registration.id, &PortletContext::new(portlet.id()))?;
        }
        Ok(())
    }

    fn forget(&self, portlet: &PortletContext) -> Result<(), PortletInvokerError> {
        if let Some(registration) = &self.registration {
            self.invoker
                .registrations
                .remove_portlet_context(&registration.id, portlet)?;
        }
        Ok(())
    }
}

impl PortletInvoker for RegistrationScope<'_> {
    fn get_portlet(&self, portlet: &PortletContext) -> Result<Portlet, PortletInvokerError> {
        self.check_operation_is_allowed(portlet, "getPortlet")?;
        self.next().get_portlet(portlet)
    }

    fn get_portlets(&self) -> Result<Vec<Portlet>, PortletInvokerError> {
        let offered = self.next().get_portlets()?;
        let Some(registration) = self.current() else {
            return Ok(offered);
        };

        let policy = self.invoker.registrations.policy();
        let mut portlets: Vec<Portlet> = offered
            .into_iter()
            .filter(|p| policy.allow_access_to(&p.context, &registration, "getPortlets"))
            .collect();

        for context in registration.known_portlet_contexts() {
            match self.next().get_portlet(&context) {
                Ok(portlet) => portlets.push(portlet),
                Err(e) => {
                    debug!(
                        "Registration {} referenced portlet {} which no longer resolves ({}), removing it",
                        registration.handle,
                        context.id(),
                        e
                    );
                    if let Err(e) = self.forget(&context) {
                        warn!("Could not prune stale portlet {}: {}", context.id(), e);
                    }
                }
            }
        }
        Ok(portlets)
    }

    fn get_status(&self, portlet: &PortletContext) -> Result<Option<PortletStatus>, PortletInvokerError> {
        let status = self.next().get_status(portlet)?;
        match (status, self.current()) {
            (Some(PortletStatus::Cloned), Some(registration)) if !registration.knows(portlet) => Ok(None),
            (status, _) => Ok(status),
        }
    }

    fn invoke(&self, invocation: &PortletInvocation) -> Result<InvocationResponse, PortletInvokerError> {
        self.check_operation_is_allowed(&invocation.target, "invoke")?;
        let response = self.next().invoke(invocation)?;
        if let InvocationResponse::Update {
            new_context: Some(context),
            ..
        } = &response
        {
            self.remember(context)?;
        }
        Ok(response)
    }

    fn create_clone(&self, portlet: &PortletContext) -> Result<PortletContext, PortletInvokerError> {
        self.check_operation_is_allowed(portlet, "createClone")?;
        let clone = self.next().create_clone(portlet)?;
        self.remember(&clone)?;
        Ok(clone)
    }

    fn destroy_clones(&self, portlets: &[PortletContext]) -> Result<Vec<DestroyCloneFailure>, PortletInvokerError> {
        for portlet in portlets {
            self.check_operation_is_allowed(portlet, "destroyClones")?;
        }
        let failures = self.next().destroy_clones(portlets)?;
        for portlet in portlets {
            if failures.iter().all(|f| f.portlet_id != portlet.id()) {
                self.forget(portlet)?;
            }
        }
        Ok(failures)
    }

    fn get_properties(
        &self,
        portlet: &PortletContext,
        names: Option<&[String]>,
    ) -> Result<PropertyMap, PortletInvokerError> {
        self.check_operation_is_allowed(portlet, "getProperties")?;
        self.next().get_properties(portlet, names)
    }

    fn set_properties(
        &self,
        portlet: &PortletContext,
        changes: &[PropertyChange],
    ) -> Result<PortletContext, PortletInvokerError> {
        self.check_operation_is_allowed(portlet, "setProperties")?;
        let updated = self.next().set_properties(portlet, changes)?;
        if updated.id() != portlet.id() {
            self.remember(&updated)?;
        }
        Ok(updated)
    }

    fn export_portlet(&self, portlet: &PortletContext) -> Result<PortletContext, PortletInvokerError> {
        self.check_operation_is_allowed(portlet, "exportPortlet")?;
        self.next().export_portlet(portlet)
    }

    fn import_portlet(&self, exported: &PortletContext) -> Result<PortletContext, PortletInvokerError> {
        let imported = self.next().import_portlet(exported)?;
        self.remember(&imported)?;
        Ok(imported)
    }
}
