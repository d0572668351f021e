use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Any top level token that isn't a known verb.
#[derive(Debug, PartialEq)]
pub struct Unknown {
    pub raw: Bytes,
}

impl Executable for Unknown {
    fn exec(self, _store: &Store) -> Result<Frame, Error> {
        Ok(Frame::Error("not supported".to_string()))
    }
}
