//! Fixed-size pool of gateway connections.
//!
//! Connections live in a preallocated slot array. A queue of free slot
//! indices and a semaphore with one permit per slot decide who may take
//! which slot; the array itself never grows or shrinks.

use std::{
    collections::VecDeque,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use herald_common::internal;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::{
    connection::{Connection, ConnectionState},
    tls::Dialer,
};

/// Default number of connections per gateway.
pub const DEFAULT_POOL_SIZE: usize = 20;

pub struct Pool {
    slots: Box<[Mutex<Option<Connection>>]>,
    free: Mutex<VecDeque<usize>>,
    permits: Semaphore,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size())
            .field("available", &self.available())
            .finish()
    }
}

impl Pool {
    /// Allocates `size` unconnected connections to the dialer's address.
    ///
    /// Nothing is dialed here; each connection dials on first use. A size of
    /// zero is treated as one.
    #[must_use]
    pub fn new(size: usize, dialer: &Arc<dyn Dialer>) -> Self {
        let size = size.max(1);

        Self {
            slots: (0..size)
                .map(|_| Mutex::new(Some(Connection::new(Arc::clone(dialer)))))
                .collect(),
            free: Mutex::new((0..size).collect()),
            permits: Semaphore::new(size),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Number of connections not currently checked out.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Takes a connection, waiting for one to be released if all are in use.
    ///
    /// Never fails and never times out. The connection goes back to the pool
    /// when the returned guard is dropped. A broken connection, including one
    /// whose exchange was abandoned halfway, goes back without its socket.
    pub async fn acquire(&self) -> PooledConnection<'_> {
        let Ok(permit) = self.permits.acquire().await else {
            unreachable!("pool semaphore is never closed")
        };

        // Holding a permit guarantees a free index and a filled slot
        let index = self.free.lock().pop_front();
        let (Some(index), Some(connection)) =
            (index, index.and_then(|index| self.slots[index].lock().take()))
        else {
            unreachable!("permit held without a free connection")
        };

        internal!(slot = index, available = self.available(), "Connection acquired");

        PooledConnection {
            pool: self,
            index,
            connection: Some(connection),
            _permit: permit,
        }
    }

    fn release(&self, index: usize, connection: Connection) {
        *self.slots[index].lock() = Some(connection);
        self.free.lock().push_back(index);
    }
}

/// A connection checked out of a [`Pool`].
///
/// Dropping the guard returns the connection to its slot before the permit
/// is released, so a woken waiter always finds a free index.
#[derive(Debug)]
pub struct PooledConnection<'a> {
    pool: &'a Pool,
    index: usize,
    connection: Option<Connection>,
    _permit: SemaphorePermit<'a>,
}

impl PooledConnection<'_> {
    /// Slot this connection occupies in the pool.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.index
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        match &self.connection {
            Some(connection) => connection,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.connection {
            Some(connection) => connection,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if connection.state() == ConnectionState::Broken {
                connection.mark_broken();
            }
            internal!(slot = self.index, state = ?connection.state(), "Connection released");
            self.pool.release(self.index, connection);
        }
    }
}
