//! SimplePortletContainer: in-process portlets backed by preference maps.
//!
//! Offered portlets are published by the producer; clones copy the
//! preferences of the offered portlet they descend from and can then be
//! modified independently. Exported state is the JSON form of a clone's
//! parent handle and preferences.

use std::collections::BTreeMap;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wsrp_protocol::{PortletContext, PortletDescription, PortletStateChange, PortletStatus, PropertyChange, PropertyMap};

use crate::error::PortletInvokerError;
use crate::invoker::{DestroyCloneFailure, InvocationKind, InvocationResponse, Portlet, PortletInvocation, PortletInvoker};

/// Form parameters with this prefix update the preference of the same name.
pub const PREFERENCE_PARAM_PREFIX: &str = "pref.";
pub const MODE_PARAM: &str = "mode";
pub const NAVIGATIONAL_STATE_PARAM: &str = "navigationalState";

const CLONE_PREFIX: &str = "clone-";

/// A portlet published by the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferedPortlet {
    pub description: PortletDescription,
    pub preferences: PropertyMap,
}

impl OfferedPortlet {
    pub fn new(handle: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            description: PortletDescription {
                portlet_handle: handle.into(),
                title: Some(title.into()),
                group_id: None,
                markup_types: vec!["text/html".into()],
            },
            preferences: PropertyMap::new(),
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.description.group_id = Some(group_id.into());
        self
    }

    pub fn with_preference(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.preferences.insert(name.into(), value.into());
        self
    }

    pub fn handle(&self) -> &str {
        &self.description.portlet_handle
    }
}

#[derive(Debug, Clone)]
struct CloneRecord {
    parent: String,
    preferences: PropertyMap,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportedState {
    parent: String,
    preferences: PropertyMap,
}

pub struct SimplePortletContainer {
    offered: RwLock<BTreeMap<String, OfferedPortlet>>,
    clones: DashMap<String, CloneRecord>,
}

impl Default for SimplePortletContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimplePortletContainer {
    pub fn new() -> Self {
        Self {
            offered: RwLock::new(BTreeMap::new()),
            clones: DashMap::new(),
        }
    }

    pub fn with_portlets(portlets: impl IntoIterator<Item = OfferedPortlet>) -> Self {
        let container = Self::new();
        for portlet in portlets {
            container.offer(portlet);
        }
        container
    }

    pub fn offer(&self, portlet: OfferedPortlet) {
        debug!("Offering portlet {}", portlet.handle());
        self.offered.write().insert(portlet.handle().to_string(), portlet);
    }

    pub fn offered_descriptions(&self) -> Vec<PortletDescription> {
        self.offered.read().values().map(|p| p.description.clone()).collect()
    }

    pub fn clone_count(&self) -> usize {
        self.clones.len()
    }

    /// Status, offered ancestor and current preferences of a handle.
    fn resolve(&self, handle: &str) -> Result<(PortletStatus, OfferedPortlet, PropertyMap), PortletInvokerError> {
        let offered = self.offered.read();
        if let Some(portlet) = offered.get(handle) {
            return Ok((PortletStatus::Offered, portlet.clone(), portlet.preferences.clone()));
        }
        let record = self
            .clones
            .get(handle)
            .map(|r| r.value().clone())
            .ok_or_else(|| PortletInvokerError::NoSuchPortlet(handle.to_string()))?;
        let parent = offered.get(&record.parent).cloned().ok_or_else(|| {
            PortletInvokerError::InvalidState(format!("clone {handle} outlived its parent {}", record.parent))
        })?;
        Ok((PortletStatus::Cloned, parent, record.preferences))
    }

    fn new_clone(&self, parent: &str, preferences: PropertyMap) -> PortletContext {
        let id = format!("{CLONE_PREFIX}{}", uuid::Uuid::new_v4());
        self.clones.insert(
            id.clone(),
            CloneRecord {
                parent: parent.to_string(),
                preferences,
            },
        );
        PortletContext::new(id)
    }

    fn apply_changes(&self, handle: &str, defaults: &PropertyMap, changes: &[PropertyChange]) -> Result<(), PortletInvokerError> {
        let mut record = self
            .clones
            .get_mut(handle)
            .ok_or_else(|| PortletInvokerError::NoSuchPortlet(handle.to_string()))?;
        for change in changes {
            match change {
                PropertyChange::Update { name, value } => {
                    record.preferences.insert(name.clone(), value.clone());
                }
                PropertyChange::Reset { name } => match defaults.get(name) {
                    Some(default) => {
                        record.preferences.insert(name.clone(), default.clone());
                    }
                    None => {
                        record.preferences.remove(name);
                    }
                },
            }
        }
        Ok(())
    }

    /// Write `changes` to `portlet`, cloning first when required. Returns
    /// the new context if a clone was made.
    fn write(
        &self,
        portlet: &PortletContext,
        changes: &[PropertyChange],
        state_change: PortletStateChange,
    ) -> Result<Option<PortletContext>, PortletInvokerError> {
        let (status, parent, preferences) = self.resolve(portlet.id())?;
        let clone_first = match (state_change, status) {
            (PortletStateChange::ReadOnly, _) => {
                return Err(PortletInvokerError::StateChangeRequired(portlet.id().to_string()));
            }
            (PortletStateChange::ReadWrite, PortletStatus::Offered) => {
                return Err(PortletInvokerError::StateChangeRequired(portlet.id().to_string()));
            }
            (PortletStateChange::ReadWrite, PortletStatus::Cloned) => false,
            (PortletStateChange::CloneBeforeWrite, _) => true,
        };

        if clone_first {
            let clone = self.new_clone(parent.handle(), preferences);
            self.apply_changes(clone.id(), &parent.preferences, changes)?;
            debug!("Cloned {} into {} before write", portlet.id(), clone.id());
            Ok(Some(clone))
        } else {
            self.apply_changes(portlet.id(), &parent.preferences, changes)?;
            Ok(None)
        }
    }
}

fn render(portlet: &Portlet, preferences: &PropertyMap, invocation: &PortletInvocation) -> String {
    let prefs: Vec<String> = preferences.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!(
        "<div class=\"wsrp-portlet\" data-handle=\"{}\" data-mode=\"{}\" data-window-state=\"{}\">{}</div>",
        portlet.id(),
        invocation.params.mode,
        invocation.params.window_state,
        prefs.join(";")
    )
}

impl PortletInvoker for SimplePortletContainer {
    fn get_portlet(&self, portlet: &PortletContext) -> Result<Portlet, PortletInvokerError> {
        let (status, parent, _) = self.resolve(portlet.id())?;
        let mut description = parent.description;
        description.portlet_handle = portlet.id().to_string();
        Ok(Portlet {
            context: PortletContext::new(portlet.id()),
            status,
            description,
        })
    }

    fn get_portlets(&self) -> Result<Vec<Portlet>, PortletInvokerError> {
        Ok(self
            .offered
            .read()
            .values()
            .map(|p| Portlet {
                context: PortletContext::new(p.handle()),
                status: PortletStatus::Offered,
                description: p.description.clone(),
            })
            .collect())
    }

    fn get_status(&self, portlet: &PortletContext) -> Result<Option<PortletStatus>, PortletInvokerError> {
        if self.offered.read().contains_key(portlet.id()) {
            Ok(Some(PortletStatus::Offered))
        } else if self.clones.contains_key(portlet.id()) {
            Ok(Some(PortletStatus::Cloned))
        } else {
            Ok(None)
        }
    }

    fn invoke(&self, invocation: &PortletInvocation) -> Result<InvocationResponse, PortletInvokerError> {
        match &invocation.kind {
            InvocationKind::Render => {
                let portlet = self.get_portlet(&invocation.target)?;
                let (_, _, preferences) = self.resolve(invocation.target.id())?;
                let mime_type = invocation
                    .params
                    .mime_types
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "text/html".into());
                Ok(InvocationResponse::Content {
                    markup: render(&portlet, &preferences, invocation),
                    mime_type,
                    title: portlet.description.title.clone(),
                })
            }
            InvocationKind::Action { state_change, form } => {
                let first = |key: &str| form.get(key).and_then(|values| values.first()).cloned();
                let changes: Vec<PropertyChange> = form
                    .iter()
                    .filter_map(|(key, values)| {
                        key.strip_prefix(PREFERENCE_PARAM_PREFIX).map(|name| PropertyChange::Update {
                            name: name.to_string(),
                            value: values.first().cloned().unwrap_or_default(),
                        })
                    })
                    .collect();

                let new_context = if changes.is_empty() {
                    self.resolve(invocation.target.id())?;
                    None
                } else {
                    self.write(&invocation.target, &changes, *state_change)?
                };

                Ok(InvocationResponse::Update {
                    new_context,
                    navigational_state: first(NAVIGATIONAL_STATE_PARAM),
                    new_mode: first(MODE_PARAM),
                })
            }
        }
    }

    fn create_clone(&self, portlet: &PortletContext) -> Result<PortletContext, PortletInvokerError> {
        let (_, parent, preferences) = self.resolve(portlet.id())?;
        let clone = self.new_clone(parent.handle(), preferences);
        info!("Cloned portlet {} into {}", portlet.id(), clone.id());
        Ok(clone)
    }

    fn destroy_clones(&self, portlets: &[PortletContext]) -> Result<Vec<DestroyCloneFailure>, PortletInvokerError> {
        let mut failures = Vec::new();
        for portlet in portlets {
            if self.clones.remove(portlet.id()).is_some() {
                debug!("Destroyed clone {}", portlet.id());
                continue;
            }
            let reason = if self.offered.read().contains_key(portlet.id()) {
                "offered portlets cannot be destroyed"
            } else {
                "no such portlet"
            };
            failures.push(DestroyCloneFailure {
                portlet_id: portlet.id().to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(failures)
    }

    fn get_properties(
        &self,
        portlet: &PortletContext,
        names: Option<&[String]>,
    ) -> Result<PropertyMap, PortletInvokerError> {
        let (_, _, preferences) = self.resolve(portlet.id())?;
        Ok(match names {
            None => preferences,
            Some(names) => preferences
                .into_iter()
                .filter(|(name, _)| names.contains(name))
                .collect(),
        })
    }

    fn set_properties(
        &self,
        portlet: &PortletContext,
        changes: &[PropertyChange],
    ) -> Result<PortletContext, PortletInvokerError> {
        let state_change = match self.get_status(portlet)? {
            Some(PortletStatus::Offered) => PortletStateChange::CloneBeforeWrite,
            Some(PortletStatus::Cloned) => PortletStateChange::ReadWrite,
            None => return Err(PortletInvokerError::NoSuchPortlet(portlet.id().to_string())),
        };
        let cloned = self.write(portlet, changes, state_change)?;
        Ok(cloned.unwrap_or_else(|| PortletContext::new(portlet.id())))
    }

    fn export_portlet(&self, portlet: &PortletContext) -> Result<PortletContext, PortletInvokerError> {
        let (_, parent, preferences) = self.resolve(portlet.id())?;
        let state = serde_json::to_vec(&ExportedState {
            parent: parent.handle().to_string(),
            preferences,
        })
        .map_err(|e| PortletInvokerError::Failed(e.to_string()))?;
        Ok(PortletContext::with_state(portlet.id(), state))
    }

    fn import_portlet(&self, exported: &PortletContext) -> Result<PortletContext, PortletInvokerError> {
        let state = exported
            .state()
            .ok_or_else(|| PortletInvokerError::InvalidState(exported.id().to_string()))?;
        let state: ExportedState = serde_json::from_slice(state)
            .map_err(|e| PortletInvokerError::InvalidState(format!("{}: {e}", exported.id())))?;

        if !self.offered.read().contains_key(&state.parent) {
            return Err(PortletInvokerError::NoSuchPortlet(state.parent));
        }
        let clone = self.new_clone(&state.parent, state.preferences);
        info!("Imported portlet {} as {}", exported.id(), clone.id());
        Ok(clone)
    }
}
