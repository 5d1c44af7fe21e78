//! SQLite-backed registration persistence.
//!
//! The in-memory graph stays authoritative for reads. Every mutation is
//! applied to memory first and then mirrored to SQLite inside one
//! transaction. When the SQLite side fails, the in-memory graph is put back
//! to the snapshot taken before the mutation and the failure is returned as
//! [`RegistrationError::Persistence`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, params};
use tracing::{info, warn};
use wsrp_protocol::QName;

use crate::error::{PersistenceError, RegistrationError};
use crate::registration::model::{Consumer, ConsumerGroup, Registration, RegistrationStatus};
use crate::registration::persistence::{InMemoryRegistrationStore, RegistrationPersistenceManager, StoreState};

// ─────────────────────────────────────────────────────────────────────────────
// Database wrapper
// ─────────────────────────────────────────────────────────────────────────────

struct RegistrationDb {
    conn: Connection,
}

impl RegistrationDb {
    fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self::init(Connection::open(path)?)
    }

    fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        let db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS consumer_groups (
                name        TEXT PRIMARY KEY,
                status      TEXT NOT NULL DEFAULT 'pending'
            );

            CREATE TABLE IF NOT EXISTS consumers (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                group_name  TEXT,
                status      TEXT NOT NULL DEFAULT 'pending'
            );

            CREATE TABLE IF NOT EXISTS registrations (
                id              TEXT PRIMARY KEY,
                handle          TEXT NOT NULL DEFAULT '',
                consumer_id     TEXT NOT NULL REFERENCES consumers(id) ON DELETE CASCADE,
                status          TEXT NOT NULL DEFAULT 'pending',
                properties      TEXT NOT NULL DEFAULT '{}',
                known_portlets  TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_registrations_consumer ON registrations(consumer_id);
            CREATE INDEX IF NOT EXISTS idx_registrations_handle ON registrations(handle);
            ",
        )?;
        Ok(())
    }

    fn load(&self) -> Result<StoreState, PersistenceError> {
        let mut state = StoreState::default();

        let mut stmt = self.conn.prepare("SELECT name, status FROM consumer_groups")?;
        let groups = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for group in groups {
            let (name, status) = group?;
            let mut group = ConsumerGroup::new(&name);
            group.status = parse_status(&status)?;
            state.groups.insert(name, group);
        }

        let mut stmt = self.conn.prepare("SELECT id, name, group_name, status FROM consumers")?;
        let consumers = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        for consumer in consumers {
            let (id, name, group_name, status) = consumer?;
            let mut consumer = Consumer::new(&id, name);
            consumer.status = parse_status(&status)?;
            if let Some(group_name) = group_name {
                let group = state.groups.get_mut(&group_name).ok_or_else(|| {
                    PersistenceError::Corrupt(format!("consumer '{id}' references missing group '{group_name}'"))
                })?;
                group.consumers.insert(id.clone());
                consumer.group = Some(group_name);
            }
            state.consumers.insert(id, consumer);
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, handle, consumer_id, status, properties, known_portlets FROM registrations",
        )?;
        let registrations = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        for registration in registrations {
            let (id, handle, consumer_id, status, properties, known) = registration?;
            let properties: BTreeMap<QName, String> = serde_json::from_str(&properties)?;
            let mut registration = Registration::new(&id, &consumer_id, properties);
            registration.handle = handle;
            registration.status = parse_status(&status)?;
            registration.known_portlet_handles = serde_json::from_str::<BTreeSet<String>>(&known)?;

            let consumer = state.consumers.get_mut(&consumer_id).ok_or_else(|| {
                PersistenceError::Corrupt(format!("registration '{id}' references missing consumer '{consumer_id}'"))
            })?;
            consumer.registrations.insert(id.clone());
            state.registrations.insert(id, registration);
        }

        Ok(state)
    }
}

fn parse_status(raw: &str) -> Result<RegistrationStatus, PersistenceError> {
    raw.parse().map_err(PersistenceError::Corrupt)
}

// ── Row writers ──────────────────────────────────────────────────────────

fn upsert_consumer(conn: &Connection, consumer: &Consumer) -> Result<(), PersistenceError> {
    conn.execute(
        "INSERT INTO consumers (id, name, group_name, status) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET name = ?2, group_name = ?3, status = ?4",
        params![consumer.id, consumer.name, consumer.group, consumer.status.as_str()],
    )?;
    Ok(())
}

fn upsert_group(conn: &Connection, group: &ConsumerGroup) -> Result<(), PersistenceError> {
    conn.execute(
        "INSERT INTO consumer_groups (name, status) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET status = ?2",
        params![group.name, group.status.as_str()],
    )?;
    Ok(())
}

fn upsert_registration(conn: &Connection, registration: &Registration) -> Result<(), PersistenceError> {
    let properties = serde_json::to_string(&registration.properties)?;
    let known = serde_json::to_string(&registration.known_portlet_handles)?;
    conn.execute(
        "INSERT INTO registrations (id, handle, consumer_id, status, properties, known_portlets)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET handle = ?2, consumer_id = ?3, status = ?4, properties = ?5, known_portlets = ?6",
        params![
            registration.id,
            registration.handle,
            registration.consumer_id,
            registration.status.as_str(),
            properties,
            known
        ],
    )?;
    Ok(())
}

fn expect_one_row(changed: usize, what: &str) -> Result<(), PersistenceError> {
    if changed == 1 {
        Ok(())
    } else {
        Err(PersistenceError::Corrupt(format!("expected to change one {what} row, changed {changed}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory registration graph mirrored to SQLite.
pub struct PersistentRegistrationStore {
    memory: InMemoryRegistrationStore,
    /// Also serializes mutations so snapshots and restores cannot interleave.
    db: Mutex<RegistrationDb>,
}

impl PersistentRegistrationStore {
    /// Open (or create) the database at `path` and load its contents.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let db = RegistrationDb::open(path)?;
        let store = Self::from_db(db)?;
        info!(
            "Loaded registration store {} ({} consumers, {} registrations)",
            path.display(),
            store.memory.get_consumers().len(),
            store.memory.get_registrations().len()
        );
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::from_db(RegistrationDb::open_in_memory()?)
    }

    fn from_db(db: RegistrationDb) -> Result<Self, PersistenceError> {
        let state = db.load()?;
        Ok(Self {
            memory: InMemoryRegistrationStore::from_state(state),
            db: Mutex::new(db),
        })
    }

    fn apply<T>(
        &self,
        mutate: impl FnOnce(&InMemoryRegistrationStore) -> Result<T, RegistrationError>,
        persist: impl FnOnce(&Connection, &T) -> Result<(), PersistenceError>,
    ) -> Result<T, RegistrationError> {
        let mut db = self.db.lock();
        let before = self.memory.snapshot();
        let value = mutate(&self.memory)?;

        let written = db.conn.transaction().map_err(PersistenceError::from).and_then(|tx| {
            persist(&tx, &value)?;
            tx.commit()?;
            Ok(())
        });

        if let Err(e) = written {
            warn!("Registration persistence failed, reverting in-memory change: {e}");
            self.memory.restore(before);
            return Err(e.into());
        }
        Ok(value)
    }
}

impl RegistrationPersistenceManager for PersistentRegistrationStore {
    fn create_consumer(&self, id: &str, name: &str) -> Result<Consumer, RegistrationError> {
        self.apply(|m| m.create_consumer(id, name), |conn, consumer| upsert_consumer(conn, consumer))
    }

    fn get_consumer_by_id(&self, id: &str) -> Option<Consumer> {
        self.memory.get_consumer_by_id(id)
    }

    fn get_consumers(&self) -> Vec<Consumer> {
        self.memory.get_consumers()
    }

    fn save_consumer(&self, consumer: &Consumer) -> Result<(), RegistrationError> {
        self.apply(|m| m.save_consumer(consumer), |conn, _| upsert_consumer(conn, consumer))
    }

    fn remove_consumer(&self, id: &str) -> Result<Consumer, RegistrationError> {
        self.apply(
            |m| m.remove_consumer(id),
            |conn, _| expect_one_row(conn.execute("DELETE FROM consumers WHERE id = ?1", params![id])?, "consumer"),
        )
    }

    fn create_consumer_group(&self, name: &str) -> Result<ConsumerGroup, RegistrationError> {
        self.apply(|m| m.create_consumer_group(name), |conn, group| upsert_group(conn, group))
    }

    fn get_consumer_group(&self, name: &str) -> Option<ConsumerGroup> {
        self.memory.get_consumer_group(name)
    }

    fn get_consumer_groups(&self) -> Vec<ConsumerGroup> {
        self.memory.get_consumer_groups()
    }

    fn save_consumer_group(&self, group: &ConsumerGroup) -> Result<(), RegistrationError> {
        self.apply(|m| m.save_consumer_group(group), |conn, _| upsert_group(conn, group))
    }

    fn remove_consumer_group(&self, name: &str) -> Result<ConsumerGroup, RegistrationError> {
        self.apply(
            |m| m.remove_consumer_group(name),
            |conn, _| {
                conn.execute("UPDATE consumers SET group_name = NULL WHERE group_name = ?1", params![name])?;
                expect_one_row(
                    conn.execute("DELETE FROM consumer_groups WHERE name = ?1", params![name])?,
                    "consumer group",
                )
            },
        )
    }

    fn add_consumer_to_group_named(&self, consumer_id: &str, group_name: &str) -> Result<(), RegistrationError> {
        self.apply(
            |m| m.add_consumer_to_group_named(consumer_id, group_name),
            |conn, _| {
                expect_one_row(
                    conn.execute(
                        "UPDATE consumers SET group_name = ?2 WHERE id = ?1",
                        params![consumer_id, group_name],
                    )?,
                    "consumer",
                )
            },
        )
    }

    fn add_registration_for(
        &self,
        consumer_id: &str,
        properties: BTreeMap<QName, String>,
    ) -> Result<Registration, RegistrationError> {
        self.apply(
            |m| m.add_registration_for(consumer_id, properties),
            |conn, registration| upsert_registration(conn, registration),
        )
    }

    fn get_registration(&self, id: &str) -> Option<Registration> {
        self.memory.get_registration(id)
    }

    fn get_registrations(&self) -> Vec<Registration> {
        self.memory.get_registrations()
    }

    fn save_registration(&self, registration: &Registration) -> Result<(), RegistrationError> {
        self.apply(
            |m| m.save_registration(registration),
            |conn, _| upsert_registration(conn, registration),
        )
    }

    fn remove_registration(&self, id: &str) -> Result<Registration, RegistrationError> {
        self.apply(
            |m| m.remove_registration(id),
            |conn, _| {
                expect_one_row(
                    conn.execute("DELETE FROM registrations WHERE id = ?1", params![id])?,
                    "registration",
                )
            },
        )
    }

    fn get_registration_by_handle(&self, handle: &str) -> Option<Registration> {
        self.memory.get_registration_by_handle(handle)
    }
}

impl PersistentRegistrationStore {
    /// Number of registrations currently stored in SQLite.
    pub fn persisted_registration_count(&self) -> Result<usize, PersistenceError> {
        let db = self.db.lock();
        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM registrations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
