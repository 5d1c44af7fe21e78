//! Records of portlet exports and imports kept by the consumer.
//!
//! An [`ExportInfo`] is identified by its export time: a migration service
//! holds at most one export per millisecond.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::{debug, info};
use wsrp_protocol::{ExportPortletsResponse, ImportPortletsResponse, PortletContext, QName};

use crate::error::MigrationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportInfo {
    export_time: i64,
    expiration_time: Option<i64>,
    export_context: Vec<u8>,
    exported_portlets: BTreeMap<String, Vec<u8>>,
    errors: BTreeMap<QName, Vec<String>>,
}

impl ExportInfo {
    pub fn new(
        export_time: i64,
        expiration_time: Option<i64>,
        export_context: Vec<u8>,
        exported_portlets: BTreeMap<String, Vec<u8>>,
        errors: BTreeMap<QName, Vec<String>>,
    ) -> Self {
        Self {
            export_time,
            expiration_time,
            export_context,
            exported_portlets,
            errors,
        }
    }

    pub fn from_response(export_time: i64, response: &ExportPortletsResponse) -> Self {
        let exported_portlets = response
            .exported_portlets
            .iter()
            .map(|p| (p.portlet_handle.clone(), p.export_data.clone()))
            .collect();
        let mut errors: BTreeMap<QName, Vec<String>> = BTreeMap::new();
        for failed in &response.failed_portlets {
            errors
                .entry(failed.error_code.qname())
                .or_default()
                .extend(failed.portlet_handles.iter().cloned());
        }
        Self {
            export_time,
            expiration_time: response.lifetime.and_then(|l| l.termination_time),
            export_context: response.export_context.clone(),
            exported_portlets,
            errors,
        }
    }

    pub fn export_time(&self) -> i64 {
        self.export_time
    }

    pub fn expiration_time(&self) -> Option<i64> {
        self.expiration_time
    }

    pub fn with_expiration_time(mut self, expiration_time: Option<i64>) -> Self {
        self.expiration_time = expiration_time;
        self
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expiration_time.is_some_and(|t| t <= now)
    }

    pub fn export_context(&self) -> &[u8] {
        &self.export_context
    }

    /// Exported portlet handles, sorted.
    pub fn exported_handles(&self) -> impl Iterator<Item = &str> {
        self.exported_portlets.keys().map(String::as_str)
    }

    pub fn portlet_state(&self, handle: &str) -> Option<&[u8]> {
        self.exported_portlets.get(handle).map(Vec::as_slice)
    }

    pub fn errors(&self) -> &BTreeMap<QName, Vec<String>> {
        &self.errors
    }

    /// The fault that prevented `handle` from being exported.
    pub fn error_for(&self, handle: &str) -> Option<&QName> {
        self.errors
            .iter()
            .find(|(_, handles)| handles.iter().any(|h| h == handle))
            .map(|(code, _)| code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportInfo {
    import_time: i64,
    errors: BTreeMap<QName, Vec<String>>,
    imported: BTreeMap<String, PortletContext>,
}

impl ImportInfo {
    pub fn from_response(import_time: i64, response: &ImportPortletsResponse) -> Self {
        let imported = response
            .import_results
            .iter()
            .map(|r| (r.import_id.clone(), r.portlet_context.clone()))
            .collect();
        let mut errors: BTreeMap<QName, Vec<String>> = BTreeMap::new();
        for failed in &response.import_failures {
            errors
                .entry(failed.error_code.qname())
                .or_default()
                .extend(failed.import_ids.iter().cloned());
        }
        Self {
            import_time,
            errors,
            imported,
        }
    }

    pub fn import_time(&self) -> i64 {
        self.import_time
    }

    pub fn errors(&self) -> &BTreeMap<QName, Vec<String>> {
        &self.errors
    }

    /// The portlet created for `import_id`.
    pub fn imported(&self, import_id: &str) -> Option<&PortletContext> {
        self.imported.get(import_id)
    }

    pub fn imported_portlets(&self) -> &BTreeMap<String, PortletContext> {
        &self.imported
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration service
// ─────────────────────────────────────────────────────────────────────────────

pub trait MigrationService: Send + Sync {
    /// Record an export. Fails when an export with the same time exists.
    fn add(&self, info: ExportInfo) -> Result<(), MigrationError>;

    /// Replace a recorded export, e.g. after its lifetime changed.
    fn update(&self, info: ExportInfo) -> Result<(), MigrationError>;

    fn get_export_info(&self, export_time: i64) -> Option<ExportInfo>;

    /// Every recorded export, oldest first.
    fn get_available_export_infos(&self) -> Vec<ExportInfo>;

    fn is_available_export_infos_empty(&self) -> bool;

    /// Forget `info`. Removing an unknown export is not an error.
    fn remove(&self, info: &ExportInfo) -> Option<ExportInfo>;

    /// Forget every export expired at `now`.
    fn remove_expired(&self, now: i64) -> Vec<ExportInfo>;
}

#[derive(Default)]
pub struct InMemoryMigrationService {
    exports: RwLock<BTreeMap<i64, ExportInfo>>,
}

impl InMemoryMigrationService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MigrationService for InMemoryMigrationService {
    fn add(&self, info: ExportInfo) -> Result<(), MigrationError> {
        let mut exports = self.exports.write();
        if exports.contains_key(&info.export_time) {
            return Err(MigrationError::AlreadyExists(info.export_time));
        }
        debug!("Recorded export {} ({} portlets)", info.export_time, info.exported_portlets.len());
        exports.insert(info.export_time, info);
        Ok(())
    }

    fn update(&self, info: ExportInfo) -> Result<(), MigrationError> {
        let mut exports = self.exports.write();
        let slot = exports
            .get_mut(&info.export_time)
            .ok_or(MigrationError::NoSuchExport(info.export_time))?;
        *slot = info;
        Ok(())
    }

    fn get_export_info(&self, export_time: i64) -> Option<ExportInfo> {
        self.exports.read().get(&export_time).cloned()
    }

    fn get_available_export_infos(&self) -> Vec<ExportInfo> {
        self.exports.read().values().cloned().collect()
    }

    fn is_available_export_infos_empty(&self) -> bool {
        self.exports.read().is_empty()
    }

    fn remove(&self, info: &ExportInfo) -> Option<ExportInfo> {
        self.exports.write().remove(&info.export_time)
    }

    fn remove_expired(&self, now: i64) -> Vec<ExportInfo> {
        let mut exports = self.exports.write();
        let expired: Vec<i64> = exports
            .values()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.export_time)
            .collect();
        let removed: Vec<ExportInfo> = expired.iter().filter_map(|t| exports.remove(t)).collect();
        if !removed.is_empty() {
            info!("Removed {} expired exports", removed.len());
        }
        removed
    }
}
