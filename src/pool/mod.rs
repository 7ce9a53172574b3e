//! TCP connection recycling
//!
//! A thin layer that maps queue slots onto live TCP connections: borrowed
//! handles come out of a [`PackedQueue`] of idle connection ids, and a side
//! map tracks which id owns which socket and whether it is currently idle or
//! borrowed. The queue engine never learns any TCP semantics; it only moves
//! opaque nonzero 64-bit ids.
//!
//! The pool performs no health checking: a connection that died externally
//! stays eligible for reuse until the caller [`discard`]s it.
//!
//! [`discard`]: ConnectionPool::discard
//!
//! ## Example
//!
//! ```rust,no_run
//! use cycleq::pool::{ConnectionPool, PoolConfig};
//!
//! let pool = ConnectionPool::new(PoolConfig::new("127.0.0.1", 6379, 4))?;
//!
//! let conn = pool.acquire()?;       // dials, nothing idle yet
//! // ... use the connection ...
//! pool.release(conn)?;              // back into circulation
//!
//! let again = pool.acquire()?;      // recycled, no new dial
//! pool.discard(again)?;             // gone for good
//! # Ok::<(), cycleq::Error>(())
//! ```

use crate::queue::PackedQueue;
use crate::{Error, Result};
use std::collections::HashMap;
use std::net::TcpStream;
use std::num::NonZeroU64;
use std::string::String;
use std::sync::{Mutex, MutexGuard};

/// Configuration for a [`ConnectionPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Host to dial new connections against
    pub host: String,
    /// Port to dial new connections against
    pub port: u16,
    /// Maximum number of connections the pool will ever track at once
    pub capacity: usize,
}

impl PoolConfig {
    /// Convenience constructor.
    pub fn new(host: impl Into<String>, port: u16, capacity: usize) -> Self {
        Self {
            host: host.into(),
            port,
            capacity,
        }
    }
}

/// Opaque identifier for a pooled connection.
///
/// Handles are never reused: each dialed connection gets a fresh id, and a
/// discarded handle stays invalid forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(NonZeroU64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Idle,
    Borrowed,
}

#[derive(Debug)]
struct Tracked {
    stream: TcpStream,
    state: ConnState,
}

#[derive(Debug)]
struct SideMap {
    entries: HashMap<u64, Tracked>,
    next_id: NonZeroU64,
}

/// A fixed-size pool that recycles TCP connections through a lock-free
/// queue.
///
/// `acquire` prefers an idle recycled connection and only dials when the
/// queue is empty and the pool is below capacity. `release` returns a
/// borrowed connection to circulation; `discard` retires one permanently.
/// The hot path (recycling) touches the side map only to flip the
/// idle/borrowed state; the queue itself is the [`PackedQueue`] engine.
#[derive(Debug)]
pub struct ConnectionPool {
    config: PoolConfig,
    idle: PackedQueue,
    conns: Mutex<SideMap>,
}

impl ConnectionPool {
    /// Create a pool that dials `config.host:config.port` on demand.
    ///
    /// No connection is opened up front.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidCapacity`] when `config.capacity` is zero.
    pub fn new(config: PoolConfig) -> Result<Self> {
        Ok(Self {
            idle: PackedQueue::new(config.capacity)?,
            conns: Mutex::new(SideMap {
                entries: HashMap::with_capacity(config.capacity),
                next_id: NonZeroU64::MIN,
            }),
            config,
        })
    }

    /// Borrow a connection, recycling an idle one when possible.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::OutOfCapacity`] when nothing is idle and the pool
    /// already tracks `capacity` connections, or with [`Error::Io`] when the
    /// dial itself fails (propagated unmodified, not retried).
    pub fn acquire(&self) -> Result<Handle> {
        loop {
            match self.idle.pop() {
                Ok(id) => {
                    let mut conns = self.lock_map();
                    if let Some(tracked) = conns.entries.get_mut(&id.get()) {
                        tracked.state = ConnState::Borrowed;
                        return Ok(Handle(id));
                    }
                    // The id was discarded while it sat in the idle queue;
                    // skip the stale entry and keep looking.
                }
                Err(Error::Empty) => return self.dial(),
                Err(err) => return Err(err),
            }
        }
    }

    /// Return a borrowed connection to circulation.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ResourceNotFound`] when the handle is untracked
    /// or not currently borrowed.
    pub fn release(&self, handle: Handle) -> Result<()> {
        {
            let mut conns = self.lock_map();
            match conns.entries.get_mut(&handle.0.get()) {
                Some(tracked) if tracked.state == ConnState::Borrowed => {
                    tracked.state = ConnState::Idle;
                }
                _ => return Err(Error::ResourceNotFound),
            }
        }

        // The queue and the pool share one capacity and each tracked
        // connection occupies at most one slot, so a released handle always
        // fits.
        self.idle.push(handle.0)
    }

    /// Permanently remove a connection from the pool and close its socket.
    ///
    /// Works on borrowed and idle handles alike; an idle handle's stale
    /// queue entry is skipped by later `acquire` calls.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ResourceNotFound`] when the handle is untracked.
    pub fn discard(&self, handle: Handle) -> Result<()> {
        let mut conns = self.lock_map();
        match conns.entries.remove(&handle.0.get()) {
            // Dropping the stream closes the connection.
            Some(_) => Ok(()),
            None => Err(Error::ResourceNotFound),
        }
    }

    /// Run `f` against the socket behind a handle.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ResourceNotFound`] for untracked handles;
    /// `f`'s own I/O errors come back as [`Error::Io`].
    pub fn with_stream<F, R>(&self, handle: Handle, f: F) -> Result<R>
    where
        F: FnOnce(&mut TcpStream) -> std::io::Result<R>,
    {
        let mut conns = self.lock_map();
        let tracked = conns
            .entries
            .get_mut(&handle.0.get())
            .ok_or(Error::ResourceNotFound)?;
        f(&mut tracked.stream).map_err(Error::from)
    }

    /// Number of connections the pool currently tracks (idle + borrowed).
    pub fn tracked(&self) -> usize {
        self.lock_map().entries.len()
    }

    /// Number of connections currently idle in the queue (approximate under
    /// concurrent acquire/release traffic).
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    /// Configured maximum number of tracked connections.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    fn dial(&self) -> Result<Handle> {
        let mut conns = self.lock_map();
        if conns.entries.len() >= self.config.capacity {
            return Err(Error::OutOfCapacity);
        }

        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port))?;

        let id = conns.next_id;
        // Ids are never recycled; u64 exhaustion is out of reach in practice
        // but OutOfCapacity is the honest answer if it ever happens.
        conns.next_id = id.checked_add(1).ok_or(Error::OutOfCapacity)?;
        conns.entries.insert(
            id.get(),
            Tracked {
                stream,
                state: ConnState::Borrowed,
            },
        );
        Ok(Handle(id))
    }

    fn lock_map(&self) -> MutexGuard<'_, SideMap> {
        match self.conns.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
