//! WSRP (Web Services for Remote Portlets) - Protocol Types
//!
//! Shared vocabulary for the producer and consumer crates: qualified names,
//! the standard fault codes, portlet and registration contexts, the
//! export/import records exchanged during portlet migration, operation names
//! and the port traits mirroring the WSRP v1/v2 port types.
//!
//! Wire marshaling (SOAP envelopes, WSDL bindings) is not part of this crate;
//! the port traits are the seam where a generated stub layer plugs in.

pub mod description;
pub mod error;
pub mod markup;
pub mod migration;
pub mod operations;
pub mod ports;
pub mod qname;
pub mod types;

pub use description::{PortletDescription, PropertyDescription, RegistrationData, ServiceDescription};
pub use error::{WSRPErrorCode, WSRPFault, WSRPResult};
pub use markup::{
    BlockingInteractionResponse, InteractionParams, MarkupParams, MarkupRequest, MarkupResponse,
    PortletStateChange, SessionContext,
};
pub use migration::{
    ExportPortletsResponse, ExportedPortlet, FailedPortlets, ImportPortlet, ImportPortletsFailed,
    ImportPortletsResponse, ImportedPortlet,
};
pub use operations::{OperationName, Operations};
pub use ports::{MarkupPort, PortletManagementPort, RegistrationPort, ServiceDescriptionPort};
pub use qname::QName;
pub use types::{
    CookieProtocol, Lifetime, PortletContext, PortletStatus, PropertyChange, PropertyMap,
    RegistrationContext, UserContext,
};
