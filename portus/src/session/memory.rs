use super::SessionBackend;
use crate::pool::Manage;

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Tables {
    identities: HashMap<String, String>,
    sessions: HashMap<String, String>,
}

/// Opens [`MemoryBackend`] handles onto one shared in-process store.
///
/// Cloning the manager shares the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryManager {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an identity.
    pub fn with_identity(self, identity: &str, secret: &str) -> Self {
        lock(&self.tables)
            .identities
            .insert(identity.to_owned(), secret.to_owned());
        self
    }

    /// Number of open sessions.
    pub fn sessions(&self) -> usize {
        lock(&self.tables).sessions.len()
    }
}

fn lock(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Manage for MemoryManager {
    type Resource = MemoryBackend;

    fn open(&self) -> io::Result<MemoryBackend> {
        Ok(MemoryBackend {
            tables: self.tables.clone(),
        })
    }
}

/// A handle onto the in-process store.
#[derive(Debug)]
pub struct MemoryBackend {
    tables: Arc<Mutex<Tables>>,
}

impl SessionBackend for MemoryBackend {
    fn secret_of(&mut self, identity: &str) -> io::Result<Option<String>> {
        Ok(lock(&self.tables).identities.get(identity).cloned())
    }

    fn insert_identity(&mut self, identity: &str, secret: &str) -> io::Result<bool> {
        let mut tables = lock(&self.tables);

        if tables.identities.contains_key(identity) {
            return Ok(false);
        }

        tables
            .identities
            .insert(identity.to_owned(), secret.to_owned());
        Ok(true)
    }

    fn put_session(&mut self, token: &str, identity: &str) -> io::Result<()> {
        lock(&self.tables)
            .sessions
            .insert(token.to_owned(), identity.to_owned());
        Ok(())
    }

    fn remove_session(&mut self, token: &str) -> io::Result<bool> {
        Ok(lock(&self.tables).sessions.remove(token).is_some())
    }

    fn session_owner(&mut self, token: &str) -> io::Result<Option<String>> {
        Ok(lock(&self.tables).sessions.get(token).cloned())
    }
}
