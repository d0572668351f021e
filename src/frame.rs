// Replies loosely follow https://redis.io/docs/reference/protocol-spec, only the single line types
// are ever written back.

use std::fmt;

use crate::store::StoredValue;

pub(crate) static CRLF: &[u8; 2] = b"\r\n";

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    /// The null bulk string, `$-1`. Means "no value".
    Null,
    /// A value pulled straight out of the store, written in its own canonical form.
    Value(StoredValue),
}

impl Frame {
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.serialize_into(&mut bytes);
        bytes
    }

    pub fn serialize_into(&self, dst: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                dst.push(u8::from(DataType::SimpleString));
                dst.extend_from_slice(s.as_bytes());
            }
            Frame::Error(s) => {
                dst.push(u8::from(DataType::SimpleError));
                dst.extend_from_slice(s.as_bytes());
            }
            Frame::Integer(i) => {
                dst.push(u8::from(DataType::Integer));
                dst.extend_from_slice(i.to_string().as_bytes());
            }
            Frame::Null => {
                dst.push(u8::from(DataType::BulkString));
                dst.extend_from_slice(b"-1");
            }
            Frame::Value(value) => value.encode_into(dst),
        }
        dst.extend_from_slice(CRLF);
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Null => write!(f, "$-1"),
            Frame::Value(value) => write!(f, "{}", value),
        }
    }
}

/// Array headers and bulk string headers show up as whole lines when a client frames its request
/// the RESP way. They are not parsed, the session skips them.
pub fn is_framing(line: &[u8]) -> bool {
    matches!(
        line.first().copied().map(DataType::try_from),
        Some(Ok(DataType::Array | DataType::BulkString))
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(byte),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ValueKind;

    #[test]
    fn serialize_simple_string() {
        assert_eq!(Frame::Simple("OK".to_string()).serialize(), b"+OK\r\n");
    }

    #[test]
    fn serialize_error() {
        assert_eq!(
            Frame::Error("not supported".to_string()).serialize(),
            b"-not supported\r\n"
        );
    }

    #[test]
    fn serialize_integer() {
        assert_eq!(Frame::Integer(1).serialize(), b":1\r\n");
        assert_eq!(Frame::Integer(-42).serialize(), b":-42\r\n");
    }

    #[test]
    fn serialize_null() {
        assert_eq!(Frame::Null.serialize(), b"$-1\r\n");
    }

    #[test]
    fn serialize_stored_value() {
        let bulk = StoredValue::new(ValueKind::BulkString, "bar");
        assert_eq!(Frame::Value(bulk).serialize(), b"+bar\r\n");

        let integer = StoredValue::new(ValueKind::Integer, "12");
        assert_eq!(Frame::Value(integer).serialize(), b":12\r\n");

        let error = StoredValue::new(ValueKind::Error, "oops");
        assert_eq!(Frame::Value(error).serialize(), b"-oops\r\n");

        let binary = StoredValue::new(ValueKind::BulkString, &b"\xfe\x00"[..]);
        assert_eq!(Frame::Value(binary).serialize(), b"+\xfe\x00\r\n");
    }

    #[test]
    fn framing_lines() {
        assert!(is_framing(b"*3"));
        assert!(is_framing(b"$5"));
        assert!(is_framing(b"$"));
        assert!(!is_framing(b"+OK"));
        assert!(!is_framing(b"set"));
        assert!(!is_framing(b""));
    }
}
