//! WSRP fault vocabulary.
//!
//! Every fault a producer may raise is identified by a QName in the WSRP
//! types namespace. Faults are modelled as a closed enum instead of an
//! exception hierarchy; callers match on [`WSRPErrorCode`] to decide on
//! remediation (e.g. re-register on `InvalidRegistration`).

use serde::{Deserialize, Serialize};

use crate::qname::QName;

/// Namespace of the WSRP 2.0 types (and fault elements).
pub const WSRP_TYPES_NS: &str = "urn:oasis:names:tc:wsrp:v2:types";

/// The standard WSRP 1.0/2.0 fault codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WSRPErrorCode {
    AccessDenied,
    ExportByValueNotSupported,
    ExportNoLongerValid,
    InconsistentParameters,
    InvalidCookie,
    InvalidHandle,
    InvalidRegistration,
    InvalidSession,
    InvalidUserCategory,
    MissingParameters,
    ModifyRegistrationRequired,
    OperationFailed,
    OperationNotSupported,
    PortletStateChangeRequired,
    ResourceSuspended,
    UnsupportedLocale,
    UnsupportedMimeType,
    UnsupportedMode,
    UnsupportedWindowState,
}

impl WSRPErrorCode {
    pub const ALL: [WSRPErrorCode; 19] = [
        Self::AccessDenied,
        Self::ExportByValueNotSupported,
        Self::ExportNoLongerValid,
        Self::InconsistentParameters,
        Self::InvalidCookie,
        Self::InvalidHandle,
        Self::InvalidRegistration,
        Self::InvalidSession,
        Self::InvalidUserCategory,
        Self::MissingParameters,
        Self::ModifyRegistrationRequired,
        Self::OperationFailed,
        Self::OperationNotSupported,
        Self::PortletStateChangeRequired,
        Self::ResourceSuspended,
        Self::UnsupportedLocale,
        Self::UnsupportedMimeType,
        Self::UnsupportedMode,
        Self::UnsupportedWindowState,
    ];

    /// Local part of the fault QName.
    pub fn local_part(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::ExportByValueNotSupported => "ExportByValueNotSupported",
            Self::ExportNoLongerValid => "ExportNoLongerValid",
            Self::InconsistentParameters => "InconsistentParameters",
            Self::InvalidCookie => "InvalidCookie",
            Self::InvalidHandle => "InvalidHandle",
            Self::InvalidRegistration => "InvalidRegistration",
            Self::InvalidSession => "InvalidSession",
            Self::InvalidUserCategory => "InvalidUserCategory",
            Self::MissingParameters => "MissingParameters",
            Self::ModifyRegistrationRequired => "ModifyRegistrationRequired",
            Self::OperationFailed => "OperationFailed",
            Self::OperationNotSupported => "OperationNotSupported",
            Self::PortletStateChangeRequired => "PortletStateChangeRequired",
            Self::ResourceSuspended => "ResourceSuspended",
            Self::UnsupportedLocale => "UnsupportedLocale",
            Self::UnsupportedMimeType => "UnsupportedMimeType",
            Self::UnsupportedMode => "UnsupportedMode",
            Self::UnsupportedWindowState => "UnsupportedWindowState",
        }
    }

    pub fn qname(&self) -> QName {
        QName::new(WSRP_TYPES_NS, self.local_part())
    }

    pub fn from_local_part(local: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.local_part() == local)
    }

    /// Resolve a fault QName. Only names in the WSRP types namespace match.
    pub fn from_qname(qname: &QName) -> Option<Self> {
        if qname.namespace() != WSRP_TYPES_NS {
            return None;
        }
        Self::from_local_part(qname.local_part())
    }
}

/// A WSRP fault as returned by a producer port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WSRPFault {
    pub code: WSRPErrorCode,
    pub message: String,
}

/// Result of a port operation.
pub type WSRPResult<T> = Result<T, WSRPFault>;

impl WSRPFault {
    pub fn new(code: WSRPErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(WSRPErrorCode::AccessDenied, message)
    }

    pub fn invalid_handle(handle: &str) -> Self {
        Self::new(WSRPErrorCode::InvalidHandle, format!("Unknown portlet handle: {handle}"))
    }

    pub fn invalid_registration(message: impl Into<String>) -> Self {
        Self::new(WSRPErrorCode::InvalidRegistration, message)
    }

    pub fn missing_parameters(message: impl Into<String>) -> Self {
        Self::new(WSRPErrorCode::MissingParameters, message)
    }

    pub fn inconsistent_parameters(message: impl Into<String>) -> Self {
        Self::new(WSRPErrorCode::InconsistentParameters, message)
    }

    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::new(WSRPErrorCode::OperationFailed, message)
    }

    pub fn operation_not_supported(message: impl Into<String>) -> Self {
        Self::new(WSRPErrorCode::OperationNotSupported, message)
    }

    pub fn modify_registration_required(message: impl Into<String>) -> Self {
        Self::new(WSRPErrorCode::ModifyRegistrationRequired, message)
    }

    pub fn export_no_longer_valid(message: impl Into<String>) -> Self {
        Self::new(WSRPErrorCode::ExportNoLongerValid, message)
    }

    pub fn invalid_cookie(message: impl Into<String>) -> Self {
        Self::new(WSRPErrorCode::InvalidCookie, message)
    }

    pub fn invalid_session(message: impl Into<String>) -> Self {
        Self::new(WSRPErrorCode::InvalidSession, message)
    }

    pub fn error_code(&self) -> WSRPErrorCode {
        self.code
    }

    pub fn qname(&self) -> QName {
        self.code.qname()
    }
}

impl std::fmt::Display for WSRPFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WSRP Fault [{}]: {}", self.code.local_part(), self.message)
    }
}

impl std::error::Error for WSRPFault {}
