use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Get the value of `key`. If the key does not exist the null bulk string is returned.
#[derive(Debug, PartialEq)]
pub struct Get {
    pub key: Bytes,
}

impl Get {
    pub(crate) async fn parse<T>(
        parser: &mut CommandParser<'_, T>,
    ) -> Result<Self, CommandParserError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        parser.next_type_marker().await?;
        let key = parser.next_bytes().await?;
        Ok(Self { key })
    }
}

impl Executable for Get {
    fn exec(self, store: &Store) -> Result<Frame, Error> {
        debug!(key = ?self.key, "GET");

        match store.read(&self.key) {
            Some(value) => Ok(Frame::Value(value)),
            None => Ok(Frame::Null),
        }
    }
}
