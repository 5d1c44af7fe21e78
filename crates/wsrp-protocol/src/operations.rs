//! WSRP operation names grouped by port type.
//!
//! Each constant is the exact operation name from the WSRP 1.0/2.0 WSDL.

/// All WSRP operation names, grouped by port type.
pub struct Operations;

impl Operations {
    // ── Service description ────────────────────────────────────────────
    pub const GET_SERVICE_DESCRIPTION: &str = "getServiceDescription";

    // ── Registration ───────────────────────────────────────────────────
    pub const REGISTER: &str = "register";
    pub const MODIFY_REGISTRATION: &str = "modifyRegistration";
    pub const DEREGISTER: &str = "deregister";
    pub const GET_REGISTRATION_LIFETIME: &str = "getRegistrationLifetime";
    pub const SET_REGISTRATION_LIFETIME: &str = "setRegistrationLifetime";

    // ── Markup ─────────────────────────────────────────────────────────
    pub const GET_MARKUP: &str = "getMarkup";
    pub const PERFORM_BLOCKING_INTERACTION: &str = "performBlockingInteraction";
    pub const HANDLE_EVENTS: &str = "handleEvents";
    pub const GET_RESOURCE: &str = "getResource";
    pub const INIT_COOKIE: &str = "initCookie";
    pub const RELEASE_SESSIONS: &str = "releaseSessions";

    // ── Portlet management ─────────────────────────────────────────────
    pub const GET_PORTLET_DESCRIPTION: &str = "getPortletDescription";
    pub const CLONE_PORTLET: &str = "clonePortlet";
    pub const DESTROY_PORTLETS: &str = "destroyPortlets";
    pub const GET_PORTLET_PROPERTY_DESCRIPTION: &str = "getPortletPropertyDescription";
    pub const GET_PORTLET_PROPERTIES: &str = "getPortletProperties";
    pub const SET_PORTLET_PROPERTIES: &str = "setPortletProperties";
    pub const GET_PORTLETS_LIFETIME: &str = "getPortletsLifetime";
    pub const SET_PORTLETS_LIFETIME: &str = "setPortletsLifetime";
    pub const COPY_PORTLETS: &str = "copyPortlets";
    pub const EXPORT_PORTLETS: &str = "exportPortlets";
    pub const IMPORT_PORTLETS: &str = "importPortlets";
    pub const RELEASE_EXPORT: &str = "releaseExport";
    pub const SET_EXPORT_LIFETIME: &str = "setExportLifetime";

    /// Operations defined by WSRP 1.0.
    pub const V1: &[&str] = &[
        Self::GET_SERVICE_DESCRIPTION,
        Self::REGISTER,
        Self::MODIFY_REGISTRATION,
        Self::DEREGISTER,
        Self::GET_MARKUP,
        Self::PERFORM_BLOCKING_INTERACTION,
        Self::INIT_COOKIE,
        Self::RELEASE_SESSIONS,
        Self::GET_PORTLET_DESCRIPTION,
        Self::CLONE_PORTLET,
        Self::DESTROY_PORTLETS,
        Self::GET_PORTLET_PROPERTY_DESCRIPTION,
        Self::GET_PORTLET_PROPERTIES,
        Self::SET_PORTLET_PROPERTIES,
    ];

    /// Operations added by WSRP 2.0.
    pub const V2_ONLY: &[&str] = &[
        Self::GET_REGISTRATION_LIFETIME,
        Self::SET_REGISTRATION_LIFETIME,
        Self::HANDLE_EVENTS,
        Self::GET_RESOURCE,
        Self::GET_PORTLETS_LIFETIME,
        Self::SET_PORTLETS_LIFETIME,
        Self::COPY_PORTLETS,
        Self::EXPORT_PORTLETS,
        Self::IMPORT_PORTLETS,
        Self::RELEASE_EXPORT,
        Self::SET_EXPORT_LIFETIME,
    ];
}

/// Returns true if the given string is a known WSRP operation.
pub fn is_known_operation(operation: &str) -> bool {
    Operations::V1.contains(&operation) || Operations::V2_ONLY.contains(&operation)
}

/// Returns true if the operation only exists in WSRP 2.0.
pub fn is_v2_only(operation: &str) -> bool {
    Operations::V2_ONLY.contains(&operation)
}

/// The operation name is always a `&str` at the protocol level.
pub type OperationName = &'static str;
