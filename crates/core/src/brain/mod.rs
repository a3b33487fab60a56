use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard,
    },
};

use crate::{network::Address, Result, TransportError};

/// A discovered panel controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteBrain {
    pub address: Address,
    pub panel_name: String,
}

impl RemoteBrain {
    pub fn new(address: Address, panel_name: impl Into<String>) -> Self {
        Self {
            address,
            panel_name: panel_name.into(),
        }
    }
}

/// Thread-safe set of known Brains, keyed by address.
///
/// Entries are never removed during a session. Every registration raises the
/// dirty flag, which the control loop clears when it rebuilds the show.
#[derive(Debug)]
pub struct BrainRegistry {
    inner: Mutex<Entries>,
    dirty: AtomicBool,
}

#[derive(Debug, Default)]
struct Entries {
    order: Vec<Address>,
    brains: HashMap<Address, RemoteBrain>,
}

impl BrainRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Entries::default()),
            dirty: AtomicBool::new(true),
        }
    }

    /// Adds or replaces the Brain at `brain.address`. Returns `true` when the
    /// address was not known before.
    pub fn register(&self, brain: RemoteBrain) -> Result<bool> {
        let is_new = {
            let mut entries = self.lock()?;
            let address = brain.address;
            let previous = entries.brains.insert(address, brain);
            if previous.is_none() {
                entries.order.push(address);
            }
            previous.is_none()
        };
        self.dirty.store(true, Ordering::Release);
        Ok(is_new)
    }

    /// Point-in-time copy in first-registration order.
    pub fn snapshot(&self) -> Result<Vec<RemoteBrain>> {
        let entries = self.lock()?;
        Ok(entries
            .order
            .iter()
            .filter_map(|address| entries.brains.get(address).cloned())
            .collect())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.brains.len())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clears the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        self.inner
            .lock()
            .map_err(|_| TransportError::Poisoned("brain registry").into())
    }
}

impl Default for BrainRegistry {
    fn default() -> Self {
        Self::new()
    }
}
