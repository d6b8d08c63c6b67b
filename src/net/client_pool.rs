//! Outbound client pool keyed by execution context.
//!
//! # Responsibilities
//! - Hand out one reusable upstream client per execution context
//! - Build clients lazily on first use
//! - Purge entries whose execution context has ended
//! - Dispose clients explicitly on release and at shutdown
//!
//! # Design Decisions
//! - A client's connection pool is bound to the runtime that created it, so
//!   handles are never shared across contexts
//! - Liveness is a `Weak` on the context's token: dropping the
//!   [`ExecutionContext`] is what ends it
//! - Lookup-or-create happens under a single shard lock

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::UpstreamConfig;
use crate::relay::error::RelayError;

/// Using relaxed ordering is sufficient since we only need uniqueness.
static CONTEXT_KEY_COUNTER: AtomicU64 = AtomicU64::new(1);
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextKey(u64);

impl ContextKey {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A concurrency unit that owns outbound clients.
///
/// Create one per runtime (`HttpServer::new` creates one). Clones share
/// the same key; the context ends when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    key: ContextKey,
    token: Arc<()>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            key: ContextKey(CONTEXT_KEY_COUNTER.fetch_add(1, Ordering::Relaxed)),
            token: Arc::new(()),
        }
    }

    pub fn key(&self) -> ContextKey {
        self.key
    }

    fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.token)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings every pooled client is built with.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

impl ClientSettings {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            pool_idle_timeout: config.pool_idle_timeout(),
            pool_max_idle_per_host: config.pool_max_idle_per_host,
            ..Self::default()
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            user_agent: concat!("openai-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// A live upstream client.
#[derive(Debug)]
pub struct UpstreamClient {
    id: u64,
    owner: ContextKey,
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn owner(&self) -> ContextKey {
        self.owner
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Shared handle to a pooled client.
pub type ClientHandle = Arc<UpstreamClient>;

#[derive(Debug)]
struct ClientPoolEntry {
    client: ClientHandle,
    owner: Weak<()>,
}

impl ClientPoolEntry {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

/// Pool of upstream clients, one per live execution context.
#[derive(Debug)]
pub struct ClientPool {
    settings: ClientSettings,
    entries: DashMap<ContextKey, ClientPoolEntry>,
}

impl ClientPool {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            entries: DashMap::new(),
        }
    }

    /// Return the live client for `ctx`, building one if needed.
    pub fn acquire(&self, ctx: &ExecutionContext) -> Result<ClientHandle, RelayError> {
        self.sweep();

        // Keys are never reused, and `ctx` being borrowed keeps it live.
        match self.entries.entry(ctx.key()) {
            Entry::Occupied(occupied) => Ok(occupied.get().client.clone()),
            Entry::Vacant(vacant) => {
                let fresh = self.build_entry(ctx)?;
                let client = fresh.client.clone();
                vacant.insert(fresh);
                tracing::debug!(context = %ctx.key(), client_id = client.id(), "Upstream client created");
                Ok(client)
            }
        }
    }

    /// Dispose the client registered for `key`. Returns false if there was none.
    ///
    /// Calls already holding the handle finish normally; the connection pool
    /// is freed once the last of them drops it.
    pub fn release(&self, key: ContextKey) -> bool {
        match self.entries.remove(&key) {
            Some((_, entry)) => {
                tracing::debug!(context = %key, client_id = entry.client.id(), "Upstream client released");
                true
            }
            None => false,
        }
    }

    /// Purge entries whose execution context has ended. Returns how many.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let live = entry.is_live();
            if !live {
                tracing::debug!(context = %key, client_id = entry.client.id(), "Stale upstream client purged");
            }
            live
        });
        before.saturating_sub(self.entries.len())
    }

    /// Dispose every client. Used at shutdown.
    pub fn release_all(&self) {
        let count = self.entries.len();
        self.entries.clear();
        tracing::info!(clients = count, "Upstream clients released");
    }

    /// Number of registered entries, stale ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn build_entry(&self, ctx: &ExecutionContext) -> Result<ClientPoolEntry, RelayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .pool_idle_timeout(self.settings.pool_idle_timeout)
            .pool_max_idle_per_host(self.settings.pool_max_idle_per_host)
            .user_agent(self.settings.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RelayError::Internal(format!("cannot build upstream client: {e}")))?;

        Ok(ClientPoolEntry {
            client: Arc::new(UpstreamClient {
                id: CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                owner: ctx.key(),
                client,
            }),
            owner: ctx.liveness(),
        })
    }
}

impl Default for ClientPool {
    fn default() -> Self {
        Self::new(ClientSettings::default())
    }
}
