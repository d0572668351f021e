use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, StoredValue};
use crate::Error;

/// Set `key` to hold `value`, tagged with the kind its type marker announces.
///
/// Wire shape: `set`, key type, key, value type, value. Both type markers must announce a bulk
/// string. An empty key or value is not stored, the reply is `OK` regardless.
#[derive(Debug, PartialEq)]
pub struct Set {
    pub key: Bytes,
    pub value_type: Bytes,
    pub value: Bytes,
}

impl Set {
    pub(crate) async fn parse<T>(
        parser: &mut CommandParser<'_, T>,
    ) -> Result<Self, CommandParserError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        parser.next_type_marker().await?;
        let key = parser.next_bytes().await?;
        let value_type = parser.next_type_marker().await?;
        let value = parser.next_bytes().await?;

        Ok(Self {
            key,
            value_type,
            value,
        })
    }
}

impl Executable for Set {
    fn exec(self, store: &Store) -> Result<Frame, Error> {
        if self.key.is_empty() || self.value.is_empty() {
            debug!(
                key = ?self.key,
                value = ?self.value,
                "Ignoring SET with an empty key or value"
            );
        } else {
            debug!(key = ?self.key, "SET");
            let value = StoredValue::from_marker(&self.value_type, self.value);
            store.write(self.key, value);
        }

        Ok(Frame::Simple("OK".to_string()))
    }
}
