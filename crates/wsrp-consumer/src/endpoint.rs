//! The consumer's view of a producer: its address and the four WSRP ports.
//!
//! A SOAP stub layer implements [`ProducerEndpoint`] for remote producers;
//! [`InProcessEndpoint`] wires a producer living in the same process.

use std::sync::Arc;

use hyper::header::HeaderMap;
use url::Url;
use wsrp_protocol::{MarkupPort, PortletManagementPort, RegistrationPort, ServiceDescriptionPort};

/// HTTP headers of one call to a producer.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub endpoint: Url,
    pub request_headers: HeaderMap,
    /// The outbound cookie as a single string, for transports that only
    /// read one `Cookie` property.
    pub legacy_cookie: Option<String>,
    pub response_headers: HeaderMap,
}

impl MessageContext {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            request_headers: HeaderMap::new(),
            legacy_cookie: None,
            response_headers: HeaderMap::new(),
        }
    }
}

pub trait ProducerEndpoint: Send + Sync {
    fn address(&self) -> &Url;

    fn service_description(&self) -> &dyn ServiceDescriptionPort;

    fn registration(&self) -> &dyn RegistrationPort;

    fn markup(&self) -> &dyn MarkupPort;

    fn portlet_management(&self) -> &dyn PortletManagementPort;

    /// Transport hook run around a call: receives the outbound headers and
    /// may fill in the response headers.
    fn exchange_headers(&self, _operation: &str, _message: &mut MessageContext) {}
}

/// A producer reachable through a direct function call.
pub struct InProcessEndpoint<P> {
    address: Url,
    producer: Arc<P>,
}

impl<P> InProcessEndpoint<P> {
    pub fn new(address: Url, producer: Arc<P>) -> Self {
        Self { address, producer }
    }

    pub fn producer(&self) -> &Arc<P> {
        &self.producer
    }
}

impl<P> ProducerEndpoint for InProcessEndpoint<P>
where
    P: ServiceDescriptionPort + RegistrationPort + MarkupPort + PortletManagementPort + Send + Sync + 'static,
{
    fn address(&self) -> &Url {
        &self.address
    }

    fn service_description(&self) -> &dyn ServiceDescriptionPort {
        self.producer.as_ref()
    }

    fn registration(&self) -> &dyn RegistrationPort {
        self.producer.as_ref()
    }

    fn markup(&self) -> &dyn MarkupPort {
        self.producer.as_ref()
    }

    fn portlet_management(&self) -> &dyn PortletManagementPort {
        self.producer.as_ref()
    }
}
