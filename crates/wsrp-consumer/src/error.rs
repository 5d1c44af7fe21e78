//! Consumer error types.

use std::path::PathBuf;

use wsrp_protocol::{WSRPErrorCode, WSRPFault};

/// Cookie parsing, validation and cookie/session correlation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    #[error("malformed cookie: {0}")]
    Malformed(String),
    #[error("cookie '{name}' rejected: {reason}")]
    Rejected { name: String, reason: String },
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
}

impl CookieError {
    /// Malformed and rejected cookies are caller errors, like bad arguments.
    pub fn is_illegal_argument(&self) -> bool {
        !matches!(self, Self::IllegalState(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    #[error("an export taken at {0} is already recorded")]
    AlreadyExists(i64),
    #[error("no export taken at {0}")]
    NoSuchExport(i64),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid consumer registry file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("a producer with id '{0}' already exists")]
    DuplicateProducer(String),
    #[error("no producer with id '{0}'")]
    NoSuchProducer(String),
    #[error("invalid producer '{id}': {reason}")]
    InvalidProducer { id: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Fault(#[from] WSRPFault),
    #[error(transparent)]
    Cookie(#[from] CookieError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("producer '{0}' is not active")]
    Inactive(String),
    #[error("consumer is not registered with producer '{0}'")]
    NotRegistered(String),
    #[error("consumer is already registered with producer '{0}'")]
    AlreadyRegistered(String),
    #[error("export taken at {0} is no longer valid")]
    ExportExpired(i64),
    #[error("export taken at {export_time} has no portlet '{handle}'")]
    NotExported { export_time: i64, handle: String },
}

impl ConsumerError {
    /// The WSRP fault code, when the producer answered with a fault.
    pub fn fault_code(&self) -> Option<WSRPErrorCode> {
        match self {
            Self::Fault(fault) => Some(fault.code),
            _ => None,
        }
    }
}
