//! Markup and interaction messages.

use std::collections::BTreeMap;

use crate::types::{PortletContext, UserContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupParams {
    pub mode: String,
    pub window_state: String,
    pub navigational_state: Option<String>,
    pub locales: Vec<String>,
    pub mime_types: Vec<String>,
}

impl Default for MarkupParams {
    fn default() -> Self {
        Self {
            mode: "wsrp:view".into(),
            window_state: "wsrp:normal".into(),
            navigational_state: None,
            locales: vec!["en".into()],
            mime_types: vec!["text/html".into()],
        }
    }
}

/// Common part of getMarkup and performBlockingInteraction requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupRequest {
    pub portlet_context: PortletContext,
    /// Producer session id previously handed out in a [`SessionContext`].
    pub session_id: Option<String>,
    pub portlet_instance_key: Option<String>,
    pub user_context: Option<UserContext>,
    pub markup_params: MarkupParams,
}

impl MarkupRequest {
    pub fn new(portlet_context: PortletContext) -> Self {
        Self {
            portlet_context,
            session_id: None,
            portlet_instance_key: None,
            user_context: None,
            markup_params: MarkupParams::default(),
        }
    }
}

/// A portlet session established by the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: String,
    /// Seconds of inactivity after which the producer drops the session;
    /// negative means never.
    pub expires: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupResponse {
    pub markup: String,
    pub mime_type: String,
    pub title: Option<String>,
    pub session_context: Option<SessionContext>,
}

/// How the producer may treat portlet state during an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortletStateChange {
    ReadWrite,
    #[default]
    CloneBeforeWrite,
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InteractionParams {
    pub portlet_state_change: PortletStateChange,
    pub form_parameters: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockingInteractionResponse {
    /// Set when the interaction cloned the portlet (clone-before-write).
    pub new_portlet_context: Option<PortletContext>,
    pub navigational_state: Option<String>,
    pub new_mode: Option<String>,
    pub session_context: Option<SessionContext>,
}
