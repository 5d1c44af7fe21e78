//! Portlet invocation: the invoker interface, a simple in-process portlet
//! container and the registration-checking wrapper placed in front of it.

use std::collections::BTreeMap;

use wsrp_protocol::{
    MarkupParams, PortletContext, PortletDescription, PortletStateChange, PortletStatus, PropertyChange,
    PropertyMap,
};

use crate::error::PortletInvokerError;

pub mod checking;
pub mod container;

pub use checking::{RegistrationCheckingPortletInvoker, RegistrationScope};
pub use container::{OfferedPortlet, SimplePortletContainer};

/// A portlet known to an invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portlet {
    pub context: PortletContext,
    pub status: PortletStatus,
    pub description: PortletDescription,
}

impl Portlet {
    pub fn id(&self) -> &str {
        self.context.id()
    }
}

/// What a portlet is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationKind {
    Render,
    Action {
        state_change: PortletStateChange,
        form: BTreeMap<String, Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortletInvocation {
    pub target: PortletContext,
    pub kind: InvocationKind,
    pub params: MarkupParams,
    pub user_key: Option<String>,
}

impl PortletInvocation {
    pub fn render(target: PortletContext) -> Self {
        Self {
            target,
            kind: InvocationKind::Render,
            params: MarkupParams::default(),
            user_key: None,
        }
    }

    pub fn action(
        target: PortletContext,
        state_change: PortletStateChange,
        form: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            target,
            kind: InvocationKind::Action { state_change, form },
            params: MarkupParams::default(),
            user_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationResponse {
    Content {
        markup: String,
        mime_type: String,
        title: Option<String>,
    },
    Update {
        /// Set when the portlet was cloned before its state was written.
        new_context: Option<PortletContext>,
        navigational_state: Option<String>,
        new_mode: Option<String>,
    },
}

/// A clone that could not be destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyCloneFailure {
    pub portlet_id: String,
    pub reason: String,
}

/// The operations a producer performs on its portlets.
pub trait PortletInvoker: Send + Sync {
    fn get_portlet(&self, portlet: &PortletContext) -> Result<Portlet, PortletInvokerError>;

    /// Every portlet visible to the caller.
    fn get_portlets(&self) -> Result<Vec<Portlet>, PortletInvokerError>;

    /// `None` when the context does not resolve.
    fn get_status(&self, portlet: &PortletContext) -> Result<Option<PortletStatus>, PortletInvokerError>;

    fn invoke(&self, invocation: &PortletInvocation) -> Result<InvocationResponse, PortletInvokerError>;

    fn create_clone(&self, portlet: &PortletContext) -> Result<PortletContext, PortletInvokerError>;

    /// Destroys as many of `portlets` as possible and reports the rest.
    fn destroy_clones(&self, portlets: &[PortletContext]) -> Result<Vec<DestroyCloneFailure>, PortletInvokerError>;

    fn get_properties(
        &self,
        portlet: &PortletContext,
        names: Option<&[String]>,
    ) -> Result<PropertyMap, PortletInvokerError>;

    /// Returns the context holding the new properties; it differs from
    /// `portlet` when the portlet had to be cloned first.
    fn set_properties(
        &self,
        portlet: &PortletContext,
        changes: &[PropertyChange],
    ) -> Result<PortletContext, PortletInvokerError>;

    /// Returns `portlet` with its exportable state attached.
    fn export_portlet(&self, portlet: &PortletContext) -> Result<PortletContext, PortletInvokerError>;

    /// Creates a portlet from previously exported state.
    fn import_portlet(&self, exported: &PortletContext) -> Result<PortletContext, PortletInvokerError>;
}
