//! WSRP Producer Core
//!
//! The producer side of WSRP minus the SOAP layer:
//!
//! - `registration`: consumers, consumer groups and registrations, the
//!   pluggable registration policy and the persistence bridge to SQLite
//! - `invoker`: the portlet invoker interface, an in-process portlet
//!   container and the registration-checking wrapper in front of it
//! - `export`: export contexts and exported portlet data, encoded by value
//!   or held by reference
//! - `producer`: [`WsrpProducer`], implementing the WSRP ports on top of
//!   the above

pub mod config;
pub mod error;
pub mod export;
pub mod invoker;
pub mod producer;
pub mod registration;

pub use config::{ConfigError, ExportSettings, ProducerConfiguration, RegistrationRequirements};
pub use error::{ExportError, PersistenceError, PortletInvokerError, RegistrationError};
pub use export::{ExportContext, ExportManager, ExportPersistenceManager, ExportPortletData, InMemoryExportStore};
pub use invoker::{
    OfferedPortlet, Portlet, PortletInvocation, PortletInvoker, RegistrationCheckingPortletInvoker,
    SimplePortletContainer,
};
pub use producer::{ProducerState, WsrpProducer, system_clock};
pub use registration::{
    Consumer, ConsumerGroup, InMemoryRegistrationStore, PersistentRegistrationStore, PolicyRegistry, Registration,
    RegistrationManager, RegistrationPersistenceManager, RegistrationStatus,
};
