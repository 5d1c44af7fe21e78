//! Producer error types and their mapping onto WSRP faults.

use wsrp_protocol::{WSRPErrorCode, WSRPFault};

/// Failure of the backing store behind a registration persistence manager.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored data is inconsistent: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("invalid consumer data: {0}")]
    InvalidConsumerData(String),
    #[error("a consumer with identity '{0}' already exists")]
    DuplicateConsumer(String),
    #[error("a consumer group named '{0}' already exists")]
    DuplicateConsumerGroup(String),
    #[error("no consumer with identity '{0}'")]
    NoSuchConsumer(String),
    #[error("no consumer group named '{0}'")]
    NoSuchConsumerGroup(String),
    #[error("no registration '{0}'")]
    NoSuchRegistration(String),
    #[error("destruction of registration '{handle}' was vetoed: {reason}")]
    DestructionVetoed { handle: String, reason: String },
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("registration persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl From<RegistrationError> for WSRPFault {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::NoSuchRegistration(_) => WSRPFault::invalid_registration(e.to_string()),
            RegistrationError::IllegalArgument(_) => WSRPFault::missing_parameters(e.to_string()),
            RegistrationError::InvalidConsumerData(_) => WSRPFault::missing_parameters(e.to_string()),
            _ => WSRPFault::operation_failed(e.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PortletInvokerError {
    #[error("no such portlet: {0}")]
    NoSuchPortlet(String),
    #[error("portlet '{0}' must be cloned before its state can change")]
    StateChangeRequired(String),
    #[error("invalid portlet state for '{0}'")]
    InvalidState(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("portlet invocation failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

impl From<PortletInvokerError> for WSRPFault {
    fn from(e: PortletInvokerError) -> Self {
        match e {
            PortletInvokerError::NoSuchPortlet(ref id) => WSRPFault::invalid_handle(id),
            PortletInvokerError::StateChangeRequired(_) => {
                WSRPFault::new(WSRPErrorCode::PortletStateChangeRequired, e.to_string())
            }
            PortletInvokerError::Unsupported(_) => WSRPFault::operation_not_supported(e.to_string()),
            PortletInvokerError::Registration(inner) => inner.into(),
            _ => WSRPFault::operation_failed(e.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("unknown export data type '{0}'")]
    UnknownType(String),
    #[error("expected export data of type '{expected}', found '{found}'")]
    UnexpectedType { expected: String, found: String },
    #[error("'{type_tag}' export data version mismatch: supported {expected}, found {found}")]
    VersionMismatch { type_tag: String, expected: f64, found: f64 },
    #[error("export data '{0}' is held by reference but no export persistence manager is configured")]
    MissingPersistenceManager(String),
    #[error("no persisted export data with id '{0}'")]
    NoSuchExport(String),
    #[error("export is no longer valid (terminated at {0})")]
    Expired(i64),
    #[error("export by value is not supported")]
    ExportByValueNotSupported,
    #[error("malformed export data: {0}")]
    Malformed(String),
}

impl From<ExportError> for WSRPFault {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::ExportByValueNotSupported => {
                WSRPFault::new(WSRPErrorCode::ExportByValueNotSupported, e.to_string())
            }
            ExportError::NoSuchExport(_) | ExportError::Expired(_) => {
                WSRPFault::export_no_longer_valid(e.to_string())
            }
            _ => WSRPFault::operation_failed(e.to_string()),
        }
    }
}
