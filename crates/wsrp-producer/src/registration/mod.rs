//! Producer-side registration subsystem.

pub mod manager;
pub mod model;
pub mod persistence;
pub mod policy;
pub mod sqlite;

pub use manager::{RegistrationDestructionListener, RegistrationManager, Vote};
pub use model::{Consumer, ConsumerGroup, Registration, RegistrationStatus};
pub use persistence::{InMemoryRegistrationStore, RegistrationPersistenceManager};
pub use policy::{DefaultRegistrationPolicy, PolicyConfig, PolicyRegistry, RegistrationPolicy, DEFAULT_POLICY};
pub use sqlite::PersistentRegistrationStore;
