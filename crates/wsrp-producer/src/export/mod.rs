//! Portlet export/import support.

pub mod codec;
pub mod data;
pub mod manager;

pub use codec::{ExportReader, ExportWriter};
pub use data::{Encoded, ExportContext, ExportData, ExportHeader, ExportPortletData, INLINE_ID};
pub use manager::{ExportManager, ExportPersistenceManager, InMemoryExportStore};
