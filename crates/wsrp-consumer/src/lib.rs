//! WSRP Consumer Core
//!
//! The consumer side of WSRP minus the SOAP layer:
//!
//! - `cookie`: RFC 2109 cookie parsing, validation and coalescing
//! - `session` / `handler`: per-user producer session information and the
//!   request/response handlers correlating cookies with interactions
//! - `producer_info` / `registry`: the producers a consumer knows about,
//!   persisted as `wsrp-consumers-config.json`
//! - `migration`: export and import records
//! - `consumer`: [`WsrpConsumer`], driving one producer through its ports

pub mod consumer;
pub mod cookie;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod migration;
pub mod producer_info;
pub mod registry;
pub mod session;

pub use consumer::WsrpConsumer;
pub use cookie::{Cookie, coalesce_cookies, parse_set_cookie, split_cookies};
pub use endpoint::{InProcessEndpoint, MessageContext, ProducerEndpoint};
pub use error::{ConsumerError, CookieError, MigrationError, RegistryError};
pub use handler::{InteractionContext, InteractionGuard, RequestHeaderClientHandler, SessionHandler};
pub use migration::{ExportInfo, ImportInfo, InMemoryMigrationService, MigrationService};
pub use producer_info::{ProducerInfo, RefreshResult, RegistrationInfo};
pub use registry::ConsumerRegistry;
pub use session::{PortletSession, ProducerSessionInformation, SharedSessionInfo};

/// Milliseconds since the epoch.
pub type Clock = fn() -> i64;

pub fn system_clock() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
