pub mod command;
pub mod del;
pub mod executable;
pub mod get;
pub mod set;
pub mod unknown;

use bytes::Bytes;
use std::str::FromStr;
use strum_macros::EnumString;
use thiserror::Error as ThisError;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::CodecError;
use crate::commands::executable::Executable;
use crate::connection::Connection;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

use command::Command as Command_;
use del::Del;
use get::Get;
use set::Set;
use unknown::Unknown;

/// Type markers must announce a bulk string, any other first character is rejected.
const BULK_STRING_MARKER: u8 = b'$';

/// The top level tokens the server understands. Matching is exact, `SET` is not `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum Verb {
    #[strum(serialize = "set")]
    Set,
    #[strum(serialize = "get")]
    Get,
    #[strum(serialize = "del")]
    Del,
    #[strum(serialize = "COMMAND")]
    Command,
}

impl Verb {
    /// Whether a rejected type marker is answered with an error frame. Only SET does so, GET and
    /// DEL drop the command without replying.
    pub fn reports_invalid_type(self) -> bool {
        matches!(self, Verb::Set)
    }
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Set(Set),
    Get(Get),
    Del(Del),
    Command(Command_),
    Unknown(Unknown),
}

impl Command {
    /// Decodes a command whose verb is `token`, pulling any arguments it needs from `conn`.
    ///
    /// Each argument is exactly one token. Reading stops at the first rejected type marker, the
    /// tokens that follow it are left on the connection.
    pub async fn read<T>(
        token: Bytes,
        conn: &mut Connection<T>,
    ) -> Result<Self, CommandParserError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        // Verbs are ASCII, a token that isn't UTF-8 can't be one.
        let verb = std::str::from_utf8(&token)
            .ok()
            .and_then(|token| Verb::from_str(token).ok());

        let Some(verb) = verb else {
            return Ok(Command::Unknown(Unknown { raw: token }));
        };

        let parser = &mut CommandParser { conn, verb };

        match verb {
            Verb::Set => Set::parse(parser).await.map(Command::Set),
            Verb::Get => Get::parse(parser).await.map(Command::Get),
            Verb::Del => Del::parse(parser).await.map(Command::Del),
            Verb::Command => Ok(Command::Command(Command_ {})),
        }
    }
}

impl Executable for Command {
    fn exec(self, store: &Store) -> Result<Frame, Error> {
        match self {
            Command::Set(cmd) => cmd.exec(store),
            Command::Get(cmd) => cmd.exec(store),
            Command::Del(cmd) => cmd.exec(store),
            Command::Command(cmd) => cmd.exec(store),
            Command::Unknown(cmd) => cmd.exec(store),
        }
    }
}

pub struct CommandParser<'a, T> {
    conn: &'a mut Connection<T>,
    verb: Verb,
}

impl<'a, T> CommandParser<'a, T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    async fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        self.conn
            .read_token()
            .await?
            .ok_or(CommandParserError::EndOfStream)
    }

    /// Reads a type marker and checks it announces a bulk string.
    async fn next_type_marker(&mut self) -> Result<Bytes, CommandParserError> {
        let marker = self.next_bytes().await?;

        match marker.first() {
            Some(&BULK_STRING_MARKER) => Ok(marker),
            Some(&byte) => Err(CommandParserError::UnsupportedType {
                command: self.verb,
                marker: byte,
            }),
            None => Err(CommandParserError::EmptyTypeMarker { command: self.verb }),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum CommandParserError {
    #[error("{marker:b} type not supported")]
    UnsupportedType { command: Verb, marker: u8 },
    #[error("empty type marker")]
    EmptyTypeMarker { command: Verb },
    #[error("protocol error; the stream ended in the middle of a command")]
    EndOfStream,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl CommandParserError {
    /// The frame owed to the client for this failure, if any.
    pub fn reply(&self) -> Option<Frame> {
        match self {
            CommandParserError::UnsupportedType { command, .. }
            | CommandParserError::EmptyTypeMarker { command }
                if command.reports_invalid_type() =>
            {
                Some(Frame::Error(self.to_string()))
            }
            _ => None,
        }
    }

    /// Whether the connection is unusable after this failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CommandParserError::EndOfStream | CommandParserError::Codec(_)
        )
    }
}
