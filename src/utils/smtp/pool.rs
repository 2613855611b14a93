//! Reuses open SMTP sessions per (domain, mail host) within a verification run.

use super::session::{MailSession, SessionConnector};
use crate::core::error::{AppError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Sessions are never shared across domains, so the domain is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    domain: String,
    host: String,
}

struct HostSlot {
    idle: Vec<Box<dyn MailSession>>,
    permits: Arc<Semaphore>,
}

/// A session checked out of the pool.
///
/// Hand it back with [`ConnectionPool::release`] or [`ConnectionPool::invalidate`].
/// Dropping it instead closes the underlying connection without QUIT.
pub struct PooledSession {
    key: PoolKey,
    session: Box<dyn MailSession>,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    pub fn host(&self) -> &str {
        &self.key.host
    }

    pub fn session(&mut self) -> &mut dyn MailSession {
        self.session.as_mut()
    }
}

/// Pool of open sessions keyed by domain and mail host.
///
/// Each checked-out session has exactly one user. `max_per_host` bounds how
/// many sessions all runs on a domain may hold against one host at once.
/// Runs register with [`ConnectionPool::begin_domain`]; a domain's slots are
/// drained only when its last registered run ends.
pub struct ConnectionPool {
    connector: Arc<dyn SessionConnector>,
    max_per_host: usize,
    slots: Mutex<HashMap<PoolKey, HostSlot>>,
    runs: Mutex<HashMap<String, usize>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn SessionConnector>, max_per_host: usize) -> Self {
        Self {
            connector,
            max_per_host: max_per_host.max(1),
            slots: Mutex::new(HashMap::new()),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a run on `domain`.
    pub fn begin_domain(&self, domain: &str) {
        let mut runs = self.runs.lock();
        let active = runs.entry(domain.to_string()).or_insert(0);
        *active += 1;
        tracing::trace!(target: "pool_task", "Run started on {} ({} active)", domain, active);
    }

    /// Returns a healthy idle session for `host`, or opens a new one.
    pub async fn acquire(&self, domain: &str, host: &str) -> Result<PooledSession> {
        let key = PoolKey {
            domain: domain.to_string(),
            host: host.to_string(),
        };
        let permits = {
            let mut slots = self.slots.lock();
            slots
                .entry(key.clone())
                .or_insert_with(|| HostSlot {
                    idle: Vec::new(),
                    permits: Arc::new(Semaphore::new(self.max_per_host)),
                })
                .permits
                .clone()
        };
        let permit = permits
            .acquire_owned()
            .await
            .map_err(|e| AppError::Initialization(e.to_string()))?;

        loop {
            let candidate = {
                let mut slots = self.slots.lock();
                slots.get_mut(&key).and_then(|slot| slot.idle.pop())
            };
            match candidate {
                Some(session) if !session.is_broken() => {
                    tracing::trace!(target: "pool_task", "Reusing pooled session to {} for {}", host, domain);
                    return Ok(PooledSession {
                        key,
                        session,
                        _permit: permit,
                    });
                }
                Some(_) => {
                    tracing::debug!(target: "pool_task", "Discarding broken idle session to {}", host);
                }
                None => break,
            }
        }

        tracing::debug!(target: "pool_task", "Opening new session to {} for {}", host, domain);
        let session = self.connector.connect(host).await?;
        Ok(PooledSession {
            key,
            session,
            _permit: permit,
        })
    }

    /// Returns a session to the pool without closing it. Broken sessions are closed instead.
    pub async fn release(&self, mut pooled: PooledSession) {
        if pooled.session.is_broken() {
            pooled.session.close().await;
            return;
        }
        let mut slots = self.slots.lock();
        match slots.get_mut(&pooled.key) {
            Some(slot) => slot.idle.push(pooled.session),
            // The run already drained this key; nothing will reuse the session.
            None => drop(pooled.session),
        }
    }

    /// Removes and closes a session the caller found to be broken.
    pub async fn invalidate(&self, mut pooled: PooledSession) {
        tracing::debug!(target: "pool_task", "Invalidating session to {} for {}", pooled.key.host, pooled.key.domain);
        pooled.session.close().await;
    }

    fn take_domain(&self, domain: &str) -> Vec<Box<dyn MailSession>> {
        let mut slots = self.slots.lock();
        let keys: Vec<PoolKey> = slots
            .keys()
            .filter(|k| k.domain == domain)
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|k| slots.remove(&k))
            .flat_map(|slot| slot.idle)
            .collect()
    }

    /// Ends one run on `domain`. Returns the domain's idle sessions once no run
    /// remains, and nothing while other runs still use the slots. A domain with
    /// no registered run is drained immediately.
    fn end_domain(&self, domain: &str) -> Vec<Box<dyn MailSession>> {
        // Held across the drain so a concurrent begin_domain cannot slip in between.
        let mut runs = self.runs.lock();
        if let Some(active) = runs.get_mut(domain) {
            *active = active.saturating_sub(1);
            if *active > 0 {
                tracing::trace!(target: "pool_task", "Run ended on {} ({} still active)", domain, active);
                return Vec::new();
            }
            runs.remove(domain);
        }
        self.take_domain(domain)
    }

    /// Ends a run and gracefully closes the domain's idle sessions if it was the last one.
    pub async fn close_domain(&self, domain: &str) {
        let sessions = self.end_domain(domain);
        if !sessions.is_empty() {
            tracing::debug!(target: "pool_task", "Closing {} pooled sessions for {}", sessions.len(), domain);
        }
        for mut session in sessions {
            session.close().await;
        }
    }

    /// Synchronous variant for cancellation paths: drops the sockets without QUIT.
    pub fn discard_domain(&self, domain: &str) {
        let dropped = self.end_domain(domain).len();
        if dropped > 0 {
            tracing::debug!(target: "pool_task", "Dropped {} pooled sessions for abandoned run on {}", dropped, domain);
        }
    }

    /// Number of idle sessions currently pooled for `domain`.
    pub fn idle_count(&self, domain: &str) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|(k, _)| k.domain == domain)
            .map(|(_, slot)| slot.idle.len())
            .sum()
    }
}
