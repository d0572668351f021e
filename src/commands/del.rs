use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Removes `key`. Replies with the number of removed keys, or with the null bulk string when
/// nothing was removed.
#[derive(Debug, PartialEq)]
pub struct Del {
    pub key: Bytes,
}

impl Del {
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

impl Executable for Del {
    fn exec(self, store: &Store) -> Result<Frame, Error> {
        debug!(key = ?self.key, "DEL");

        match store.delete(&self.key) {
            0 => Ok(Frame::Null),
            count => Ok(Frame::Integer(count as i64)),
        }
    }
}
