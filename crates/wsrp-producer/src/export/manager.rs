//! ExportManager: creates export contexts and encodes/decodes export data,
//! by value or by reference.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};
use wsrp_protocol::Lifetime;

use crate::error::ExportError;
use crate::export::data::{self, Encoded, ExportContext, ExportPortletData};

/// Storage for exports held by reference.
pub trait ExportPersistenceManager: Send + Sync {
    /// Store a context and return its key.
    fn store_context(&self, context: &ExportContext) -> Result<String, ExportError>;
    fn load_context(&self, id: &str) -> Result<ExportContext, ExportError>;
    fn update_context(&self, id: &str, context: &ExportContext) -> Result<(), ExportError>;
    /// Remove a context and all portlet data stored under it.
    fn remove_context(&self, id: &str) -> Result<bool, ExportError>;

    fn store_portlet_data(&self, context_id: &str, data: &ExportPortletData) -> Result<String, ExportError>;
    fn load_portlet_data(&self, id: &str) -> Result<ExportPortletData, ExportError>;
}

#[derive(Default)]
pub struct InMemoryExportStore {
    contexts: DashMap<String, ExportContext>,
    /// data id → (context id, data)
    portlet_data: DashMap<String, (String, ExportPortletData)>,
}

impl InMemoryExportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }
}

impl ExportPersistenceManager for InMemoryExportStore {
    fn store_context(&self, context: &ExportContext) -> Result<String, ExportError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut stored = context.clone();
        stored.reference_id = Some(id.clone());
        self.contexts.insert(id.clone(), stored);
        Ok(id)
    }

    fn load_context(&self, id: &str) -> Result<ExportContext, ExportError> {
        self.contexts
            .get(id)
            .map(|c| c.value().clone())
            .ok_or_else(|| ExportError::NoSuchExport(id.to_string()))
    }

    fn update_context(&self, id: &str, context: &ExportContext) -> Result<(), ExportError> {
        let mut entry = self
            .contexts
            .get_mut(id)
            .ok_or_else(|| ExportError::NoSuchExport(id.to_string()))?;
        *entry = context.clone();
        entry.reference_id = Some(id.to_string());
        Ok(())
    }

    fn remove_context(&self, id: &str) -> Result<bool, ExportError> {
        let removed = self.contexts.remove(id).is_some();
        self.portlet_data.retain(|_, (context_id, _)| context_id != id);
        Ok(removed)
    }

    fn store_portlet_data(&self, context_id: &str, data: &ExportPortletData) -> Result<String, ExportError> {
        if !self.contexts.contains_key(context_id) {
            return Err(ExportError::NoSuchExport(context_id.to_string()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.portlet_data
            .insert(id.clone(), (context_id.to_string(), data.clone()));
        Ok(id)
    }

    fn load_portlet_data(&self, id: &str) -> Result<ExportPortletData, ExportError> {
        self.portlet_data
            .get(id)
            .map(|entry| entry.value().1.clone())
            .ok_or_else(|| ExportError::NoSuchExport(id.to_string()))
    }
}

pub struct ExportManager {
    persistence: Option<Arc<dyn ExportPersistenceManager>>,
}

impl ExportManager {
    /// Without a persistence manager every export is by value.
    pub fn new(persistence: Option<Arc<dyn ExportPersistenceManager>>) -> Self {
        Self { persistence }
    }

    pub fn persistence(&self) -> Option<&Arc<dyn ExportPersistenceManager>> {
        self.persistence.as_ref()
    }

    pub fn supports_export_by_value(&self) -> bool {
        true
    }

    fn require_persistence(&self, id: &str) -> Result<&Arc<dyn ExportPersistenceManager>, ExportError> {
        self.persistence
            .as_ref()
            .ok_or_else(|| ExportError::MissingPersistenceManager(id.to_string()))
    }

    /// Start a new export. Exports held by reference get the requested
    /// termination time; exports by value cannot be terminated.
    pub fn create_export_context(
        &self,
        export_by_value_required: bool,
        lifetime: Option<&Lifetime>,
        now: i64,
    ) -> Result<ExportContext, ExportError> {
        if export_by_value_required && !self.supports_export_by_value() {
            return Err(ExportError::ExportByValueNotSupported);
        }
        let by_value = export_by_value_required || self.persistence.is_none();
        let mut context = ExportContext::new(now, by_value);

        if let Some(persistence) = self.persistence.as_ref().filter(|_| !by_value) {
            context.termination_time = lifetime.and_then(|l| l.termination_time);
            let id = persistence.store_context(&context)?;
            context.reference_id = Some(id);
        }
        debug!(
            "Created export context at {} ({})",
            now,
            if by_value { "by value" } else { "by reference" }
        );
        Ok(context)
    }

    pub fn encode_export_context(&self, context: &ExportContext) -> Result<Vec<u8>, ExportError> {
        match &context.reference_id {
            Some(id) => {
                self.require_persistence(id)?.update_context(id, context)?;
                data::encode_reference::<ExportContext>(id)
            }
            None => data::encode_inline(context),
        }
    }

    pub fn decode_export_context(&self, bytes: &[u8]) -> Result<ExportContext, ExportError> {
        match data::decode::<ExportContext>(bytes)? {
            Encoded::Inline(context) => Ok(context),
            Encoded::Reference(id) => self.require_persistence(&id)?.load_context(&id),
        }
    }

    /// Encode one portlet's data in the mode of `context`.
    pub fn encode_portlet_data(
        &self,
        context: &ExportContext,
        portlet_data: &ExportPortletData,
    ) -> Result<Vec<u8>, ExportError> {
        match &context.reference_id {
            Some(context_id) => {
                let id = self
                    .require_persistence(context_id)?
                    .store_portlet_data(context_id, portlet_data)?;
                data::encode_reference::<ExportPortletData>(&id)
            }
            None => data::encode_inline(portlet_data),
        }
    }

    pub fn decode_portlet_data(&self, bytes: &[u8]) -> Result<ExportPortletData, ExportError> {
        match data::decode::<ExportPortletData>(bytes)? {
            Encoded::Inline(portlet_data) => Ok(portlet_data),
            Encoded::Reference(id) => self.require_persistence(&id)?.load_portlet_data(&id),
        }
    }

    /// Fail with [`ExportError::Expired`] once the context's termination
    /// time has passed.
    pub fn check_validity(&self, context: &ExportContext, now: i64) -> Result<(), ExportError> {
        match context.termination_time {
            Some(t) if context.is_expired_at(now) => Err(ExportError::Expired(t)),
            _ => Ok(()),
        }
    }

    /// Drop a by-reference export. Releasing a by-value export is a no-op.
    pub fn release_export(&self, bytes: &[u8]) -> Result<(), ExportError> {
        let context = self.decode_export_context(bytes)?;
        if let Some(id) = &context.reference_id {
            if self.require_persistence(id)?.remove_context(id)? {
                info!("Released export {}", id);
            }
        }
        Ok(())
    }

    /// Change the termination time of a by-reference export. By-value
    /// exports have no lifetime and yield `None`.
    pub fn set_export_lifetime(
        &self,
        bytes: &[u8],
        lifetime: Option<&Lifetime>,
        now: i64,
    ) -> Result<Option<Lifetime>, ExportError> {
        let mut context = self.decode_export_context(bytes)?;
        let Some(id) = context.reference_id.clone() else {
            return Ok(None);
        };
        self.check_validity(&context, now)?;

        context.termination_time = lifetime.and_then(|l| l.termination_time);
        self.require_persistence(&id)?.update_context(&id, &context)?;
        debug!("Export {} now terminates at {:?}", id, context.termination_time);

        Ok(Some(Lifetime {
            current_time: now,
            termination_time: context.termination_time,
            refresh_duration: lifetime.and_then(|l| l.refresh_duration),
        }))
    }
}
