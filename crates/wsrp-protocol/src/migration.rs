//! Export/import records exchanged by exportPortlets / importPortlets.

use crate::error::WSRPErrorCode;
use crate::types::{Lifetime, PortletContext};

/// One successfully exported portlet: its handle and opaque export data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedPortlet {
    pub portlet_handle: String,
    pub export_data: Vec<u8>,
}

/// Handles that failed for the same reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPortlets {
    pub portlet_handles: Vec<String>,
    pub error_code: WSRPErrorCode,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPortletsResponse {
    pub export_context: Vec<u8>,
    pub exported_portlets: Vec<ExportedPortlet>,
    pub failed_portlets: Vec<FailedPortlets>,
    /// Present when the export is held by reference on the producer.
    pub lifetime: Option<Lifetime>,
}

/// A portlet to import, identified by a consumer-chosen import id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPortlet {
    pub import_id: String,
    pub export_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedPortlet {
    pub import_id: String,
    pub portlet_context: PortletContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPortletsFailed {
    pub import_ids: Vec<String>,
    pub error_code: WSRPErrorCode,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportPortletsResponse {
    pub import_results: Vec<ImportedPortlet>,
    pub import_failures: Vec<ImportPortletsFailed>,
}
