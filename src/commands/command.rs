use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// `COMMAND`, sent by clients on connect to discover what the server supports. The server
/// declares nothing and answers with the null bulk string.
#[derive(Debug, PartialEq)]
pub struct Command {}

impl Executable for Command {
    fn exec(self, _store: &Store) -> Result<Frame, Error> {
        Ok(Frame::Null)
    }
}
