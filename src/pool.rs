//! Connection admission: bounds how many sessions are live at once and broadcasts shutdown to
//! them.
//!
//! The pool never drives I/O on its own. A coordinating loop (see [`crate::server`]) consumes the
//! [`PoolEvents`] the pool produces: accept requests, admitted sessions and accept errors.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type SessionId = Uuid;

/// What the pool keeps about a live session: its identity and the token used to ask it to stop.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn new() -> SessionHandle {
        SessionHandle {
            id: Uuid::new_v4(),
            shutdown: CancellationToken::new(),
        }
    }

    /// The token the session watches between commands.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A freshly accepted and registered connection, waiting to be driven by a session.
pub struct Admitted {
    pub handle: SessionHandle,
    pub stream: TcpStream,
    pub addr: SocketAddr,
    /// Frees the admission slot when dropped.
    pub guard: SessionGuard,
}

/// The receiving ends of the pool's signals. Owned by the single coordinating loop.
pub struct PoolEvents {
    pub accept_requests: mpsc::Receiver<()>,
    pub sessions: mpsc::Receiver<Admitted>,
    pub errors: mpsc::Receiver<io::Error>,
}

/// Bounds the number of concurrently live sessions and coordinates shutdown.
///
/// Cloning is cheap, every clone refers to the same pool.
#[derive(Clone)]
pub struct AdmissionPool {
    inner: Arc<Inner>,
}

struct Inner {
    /// The ceiling consulted before asking for and performing an accept.
    max_connections: usize,
    /// The capacity `register` enforces. Kept apart from `max_connections`, the two are not
    /// reconciled.
    register_limit: usize,
    state: RwLock<State>,
    // Set while an accept request is queued or an accept is in flight.
    accept_pending: AtomicBool,
    closed: CancellationToken,
    accept_requests: mpsc::Sender<()>,
    sessions: mpsc::Sender<Admitted>,
    errors: mpsc::Sender<io::Error>,
}

#[derive(Default)]
struct State {
    sessions: HashMap<SessionId, SessionHandle>,
    shutting_down: bool,
}

impl AdmissionPool {
    pub fn new(max_connections: usize, register_limit: usize) -> (AdmissionPool, PoolEvents) {
        let (accept_tx, accept_rx) = mpsc::channel(1);
        let (sessions_tx, sessions_rx) = mpsc::channel(1);
        let (errors_tx, errors_rx) = mpsc::channel(16);

        let inner = Arc::new(Inner {
            max_connections,
            register_limit,
            state: RwLock::new(State::default()),
            accept_pending: AtomicBool::new(false),
            closed: CancellationToken::new(),
            accept_requests: accept_tx,
            sessions: sessions_tx,
            errors: errors_tx,
        });

        let events = PoolEvents {
            accept_requests: accept_rx,
            sessions: sessions_rx,
            errors: errors_rx,
        };

        (AdmissionPool { inner }, events)
    }

    pub fn max_connections(&self) -> usize {
        self.inner.max_connections
    }

    /// Asks for one more connection to be accepted.
    ///
    /// A no-op when a request is already outstanding, when the pool is shutting down or when the
    /// ceiling is reached. Returns whether a request was queued.
    pub fn request_accept(&self) -> bool {
        if self.is_shutting_down() || !self.more_connections_allowed() {
            return false;
        }

        if self
            .inner
            .accept_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        match self.inner.accept_requests.try_send(()) {
            Ok(()) => {
                debug!("Queued up request for connection");
                true
            }
            Err(_) => {
                self.inner.accept_pending.store(false, Ordering::Release);
                false
            }
        }
    }

    /// Serves one accept request.
    ///
    /// Blocks on the listener only while there is capacity. An accepted connection is registered
    /// and handed to the dispatch channel, a refused one is closed right away. Accept failures are
    /// surfaced on the error channel. Either way a follow-up request is queued.
    pub async fn accept(&self, listener: &TcpListener) {
        if !self.more_connections_allowed() {
            self.accept_served();
            return;
        }

        debug!("Listening for connections...");
        let res = listener.accept().await;
        self.handle_accept(res).await;
    }

    async fn handle_accept(&self, res: io::Result<(TcpStream, SocketAddr)>) {
        match res {
            Ok((stream, addr)) => self.admit(stream, addr).await,
            Err(e) => {
                // Only fails once the coordinating loop is gone.
                let _ = self.inner.errors.send(e).await;
            }
        }

        self.accept_served();
    }

    fn accept_served(&self) {
        self.inner.accept_pending.store(false, Ordering::Release);
        self.request_accept();
    }

    async fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        let handle = SessionHandle::new();

        if !self.register(&handle) {
            warn!("Connection limit reached, refusing connection from {}", addr);
            return;
        }

        info!("Accepted connection from {}", addr);

        let admitted = Admitted {
            guard: SessionGuard::new(self.clone(), handle.id),
            handle,
            stream,
            addr,
        };

        // The coordinating loop is gone, the guard releases the slot as `admitted` drops.
        if self.inner.sessions.send(admitted).await.is_err() {
            debug!("Dropping connection from {}, nothing is dispatching sessions", addr);
        }
    }

    /// Adds a session to the live set. Returns false when the pool is full or shutting down, the
    /// caller must then refuse the session.
    pub fn register(&self, handle: &SessionHandle) -> bool {
        let mut state = self.exclusive();

        if state.shutting_down || state.sessions.len() >= self.inner.register_limit {
            return false;
        }

        state.sessions.insert(handle.id, handle.clone());
        true
    }

    /// Removes a session from the live set. Unknown sessions are ignored.
    ///
    /// The freed slot resumes the accept loop if it had stopped at the ceiling.
    pub fn deregister(&self, id: &SessionId) {
        let removed = self.exclusive().sessions.remove(id).is_some();

        if removed {
            debug!("Deregistered session {}", id);
            self.request_accept();
        }
    }

    /// Stops accepting connections and tells every live session to terminate.
    ///
    /// Idempotent, only the first call signals anything. Does not wait for sessions to finish.
    pub fn shutdown(&self) {
        let mut state = self.exclusive();

        if state.shutting_down {
            return;
        }
        state.shutting_down = true;

        for (id, handle) in state.sessions.iter() {
            info!("Pool: shutting down session {}", id);
            handle.shutdown.cancel();
        }

        self.inner.closed.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared().shutting_down
    }

    pub fn more_connections_allowed(&self) -> bool {
        self.shared().sessions.len() < self.inner.max_connections
    }

    pub fn active_count(&self) -> usize {
        self.shared().sessions.len()
    }

    /// Completes once `shutdown` has been called.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    fn shared(&self) -> RwLockReadGuard<'_, State> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn exclusive(&self) -> RwLockWriteGuard<'_, State> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deregisters a session from the pool when dropped, whichever way the session ends.
pub struct SessionGuard {
    pool: AdmissionPool,
    id: SessionId,
}

impl SessionGuard {
    pub fn new(pool: AdmissionPool, id: SessionId) -> SessionGuard {
        SessionGuard { pool, id }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.pool.deregister(&self.id);
    }
}
