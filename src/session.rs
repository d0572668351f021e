use bytes::Bytes;
use std::ops::ControlFlow;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::executable::Executable;
use crate::commands::{Command, CommandParserError};
use crate::connection::Connection;
use crate::frame::{self, Frame};
use crate::store::Store;
use crate::Error;

/// Drives one client connection: reads a top level token, decodes the command it starts, runs it
/// against the store and writes the reply, until the peer hangs up or shutdown is requested.
///
/// Shutdown is only observed between commands. A command that has started decoding runs to
/// completion first.
pub struct Session<T = TcpStream> {
    conn: Connection<T>,
    store: Store,
    shutdown: CancellationToken,
    // Set once "not supported" has been sent, so a run of bad input gets a single error reply.
    reported_unsupported: bool,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(conn: Connection<T>, store: Store, shutdown: CancellationToken) -> Session<T> {
        Session {
            conn,
            store,
            shutdown,
            reported_unsupported: false,
        }
    }

    /// Runs the session to completion. An error means the connection failed, protocol problems
    /// are answered on the connection and never end up here.
    pub async fn run(&mut self) -> Result<(), Error> {
        loop {
            let token = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
                token = self.conn.read_token() => token?,
            };

            let Some(token) = token else {
                info!("Connection closed");
                return Ok(());
            };

            if self.handle_token(token).await?.is_break() {
                return Ok(());
            }
        }
    }

    async fn handle_token(&mut self, token: Bytes) -> Result<ControlFlow<()>, Error> {
        debug!("Received token from client: {:?}", token);

        if frame::is_framing(&token) {
            return Ok(ControlFlow::Continue(()));
        }

        let command = match Command::read(token, &mut self.conn).await {
            Ok(command) => command,
            Err(CommandParserError::EndOfStream) => {
                info!("Connection closed in the middle of a command");
                return Ok(ControlFlow::Break(()));
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                warn!("Rejected command: {}", err);
                if let Some(frame) = err.reply() {
                    self.write(frame).await?;
                }
                return Ok(ControlFlow::Continue(()));
            }
        };

        match command {
            Command::Unknown(cmd) => {
                warn!("Received unsupported input {:?}", cmd.raw);
                if !self.reported_unsupported {
                    let res = cmd.exec(&self.store)?;
                    self.write(res).await?;
                    self.reported_unsupported = true;
                }
            }
            Command::Command(cmd) => {
                let res = cmd.exec(&self.store)?;
                self.write(res).await?;
            }
            cmd => {
                let res = cmd.exec(&self.store)?;
                self.write(res).await?;
                self.reported_unsupported = false;
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    async fn write(&mut self, frame: Frame) -> Result<(), Error> {
        debug!("Sending response to client: {}", frame);
        self.conn.write_frame(frame).await?;
        Ok(())
    }
}
