use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::codec::{CodecError, LineCodec};
use crate::frame::Frame;

/// A client connection. Incoming bytes are split into tokens by the [`LineCodec`], replies are
/// written back as frames.
///
/// The read half keeps whatever was buffered but not yet tokenized, so dropping a pending
/// `read_token` future (e.g. when it loses a `select!`) never loses data.
pub struct Connection<T = TcpStream> {
    framed: Framed<T, LineCodec>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: T) -> Connection<T> {
        Connection::with_codec(stream, LineCodec::new())
    }

    pub fn with_codec(stream: T, codec: LineCodec) -> Connection<T> {
        Connection {
            framed: Framed::new(stream, codec),
        }
    }

    /// Reads the next token. `None` means the peer closed the stream and every buffered byte has
    /// been consumed.
    pub async fn read_token(&mut self) -> Result<Option<Bytes>, CodecError> {
        self.framed.next().await.transpose()
    }

    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), CodecError> {
        self.framed.send(frame).await
    }
}
