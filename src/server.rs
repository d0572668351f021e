use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use crate::codec::LineCodec;
use crate::config::Config;
use crate::connection::Connection;
use crate::pool::{Admitted, AdmissionPool, PoolEvents};
use crate::session::Session;
use crate::store::Store;
use crate::Error;

/// A bound listener plus everything needed to serve it: the shared store and the admission pool.
pub struct Server {
    listener: Arc<TcpListener>,
    store: Store,
    pool: AdmissionPool,
    events: PoolEvents,
    config: Config,
}

impl Server {
    /// Binds the listener. Failing to bind is fatal, there is no retry.
    pub async fn bind(config: Config) -> Result<Server, Error> {
        config.validate()?;

        if config.register_limit != config.max_connections {
            warn!(
                "register_limit ({}) differs from max_connections ({}), sessions may be refused after being accepted",
                config.register_limit, config.max_connections
            );
        }

        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let (pool, events) = AdmissionPool::new(config.max_connections, config.register_limit);

        Ok(Server {
            listener: Arc::new(listener),
            store: Store::new(),
            pool,
            events,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle to the pool, e.g. for a signal handler to call [`AdmissionPool::shutdown`].
    pub fn pool(&self) -> AdmissionPool {
        self.pool.clone()
    }

    /// Runs the coordinating loop until the pool is shut down.
    ///
    /// The loop waits on the pool's signals: an accept request spawns an accept worker, an
    /// admitted connection spawns a session, an accept error is logged. Once the pool is shut down
    /// no more connections are accepted and open sessions get `drain_timeout` to finish.
    pub async fn run(self) -> Result<(), Error> {
        let Server {
            listener,
            store,
            pool,
            mut events,
            config,
        } = self;

        info!(
            "Server listening on {} (max {} connections)",
            listener.local_addr()?,
            pool.max_connections()
        );

        let mut accepts = JoinSet::new();
        let mut sessions = JoinSet::new();

        pool.request_accept();

        loop {
            tokio::select! {
                biased;

                _ = pool.closed() => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }

                Some(()) = events.accept_requests.recv() => {
                    let pool = pool.clone();
                    let listener = listener.clone();
                    accepts.spawn(async move { pool.accept(&listener).await });
                }

                Some(admitted) = events.sessions.recv() => {
                    sessions.spawn(handle_connection(admitted, store.clone(), config.max_line_length));
                }

                Some(e) = events.errors.recv() => {
                    warn!("Failed to accept connection: {}", e);
                }

                Some(res) = sessions.join_next() => {
                    if let Err(e) = res {
                        if e.is_panic() {
                            error!("A session panicked: {:?}", e);
                        }
                    }
                }

                Some(_) = accepts.join_next() => {}
            }
        }

        accepts.shutdown().await;
        // Connections admitted but never dispatched release their slot here.
        drop(events);

        info!("Waiting for {} open sessions to close...", sessions.len());
        let drained = timeout(config.drain_timeout(), async {
            while sessions.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "Timed out waiting for sessions, aborting {} of them",
                sessions.len()
            );
            sessions.shutdown().await;
        }

        info!("Server shutdown complete");
        Ok(())
    }
}

#[instrument(
    name = "session",
    skip(admitted, store, max_line_length),
    fields(session_id = %admitted.handle.id, client_address = %admitted.addr)
)]
async fn handle_connection(admitted: Admitted, store: Store, max_line_length: usize) {
    let Admitted {
        handle,
        stream,
        addr: _,
        guard: _guard,
    } = admitted;

    let conn = Connection::with_codec(stream, LineCodec::with_max_length(max_line_length));
    let mut session = Session::new(conn, store, handle.shutdown_token());

    if let Err(e) = session.run().await {
        error!("Fatal: problem handling input: {}", e);
    }
}
