//! Port traits mirroring the WSRP port types.
//!
//! A producer implements these; a consumer talks to a producer only through
//! them. Calls are synchronous and block the calling thread. A SOAP stub
//! layer implements the same traits for remote producers.

use crate::description::{PortletDescription, RegistrationData, ServiceDescription};
use crate::error::WSRPResult;
use crate::markup::{BlockingInteractionResponse, InteractionParams, MarkupRequest, MarkupResponse};
use crate::migration::{ExportPortletsResponse, FailedPortlets, ImportPortlet, ImportPortletsResponse};
use crate::types::{Lifetime, PortletContext, PropertyChange, PropertyMap, RegistrationContext};

pub trait ServiceDescriptionPort: Send + Sync {
    fn get_service_description(
        &self,
        registration: Option<&RegistrationContext>,
        desired_locales: &[String],
    ) -> WSRPResult<ServiceDescription>;
}

pub trait RegistrationPort: Send + Sync {
    fn register(&self, data: &RegistrationData) -> WSRPResult<RegistrationContext>;

    /// Returns the new registration state, if the producer keeps none itself.
    fn modify_registration(
        &self,
        registration: &RegistrationContext,
        data: &RegistrationData,
    ) -> WSRPResult<Option<Vec<u8>>>;

    fn deregister(&self, registration: &RegistrationContext) -> WSRPResult<()>;
}

pub trait MarkupPort: Send + Sync {
    fn get_markup(
        &self,
        registration: Option<&RegistrationContext>,
        request: &MarkupRequest,
    ) -> WSRPResult<MarkupResponse>;

    fn perform_blocking_interaction(
        &self,
        registration: Option<&RegistrationContext>,
        request: &MarkupRequest,
        interaction: &InteractionParams,
    ) -> WSRPResult<BlockingInteractionResponse>;

    fn init_cookie(&self, registration: Option<&RegistrationContext>) -> WSRPResult<()>;

    fn release_sessions(
        &self,
        registration: Option<&RegistrationContext>,
        session_ids: &[String],
    ) -> WSRPResult<()>;
}

pub trait PortletManagementPort: Send + Sync {
    fn get_portlet_description(
        &self,
        registration: Option<&RegistrationContext>,
        portlet: &PortletContext,
    ) -> WSRPResult<PortletDescription>;

    fn clone_portlet(
        &self,
        registration: Option<&RegistrationContext>,
        portlet: &PortletContext,
    ) -> WSRPResult<PortletContext>;

    /// Returns the handles that could not be destroyed, grouped by fault code.
    fn destroy_portlets(
        &self,
        registration: Option<&RegistrationContext>,
        portlet_handles: &[String],
    ) -> WSRPResult<Vec<FailedPortlets>>;

    /// `names == None` returns every property.
    fn get_portlet_properties(
        &self,
        registration: Option<&RegistrationContext>,
        portlet: &PortletContext,
        names: Option<&[String]>,
    ) -> WSRPResult<PropertyMap>;

    fn set_portlet_properties(
        &self,
        registration: Option<&RegistrationContext>,
        portlet: &PortletContext,
        changes: &[PropertyChange],
    ) -> WSRPResult<PortletContext>;

    fn export_portlets(
        &self,
        registration: Option<&RegistrationContext>,
        portlets: &[PortletContext],
        export_by_value_required: bool,
        lifetime: Option<&Lifetime>,
    ) -> WSRPResult<ExportPortletsResponse>;

    fn import_portlets(
        &self,
        registration: Option<&RegistrationContext>,
        export_context: &[u8],
        portlets: &[ImportPortlet],
        lifetime: Option<&Lifetime>,
    ) -> WSRPResult<ImportPortletsResponse>;

    fn release_export(
        &self,
        registration: Option<&RegistrationContext>,
        export_context: &[u8],
    ) -> WSRPResult<()>;

    fn set_export_lifetime(
        &self,
        registration: Option<&RegistrationContext>,
        export_context: &[u8],
        lifetime: Option<&Lifetime>,
    ) -> WSRPResult<Option<Lifetime>>;
}
