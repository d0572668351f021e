use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The tag a stored value carries. Mirrors the single character type prefixes of the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    SimpleString, // '+'
    Integer,      // ':'
    // Bulk strings are kept as their own tag but are written back as simple strings.
    BulkString, // '$'
    Error,      // '-'
}

impl ValueKind {
    /// Normalizes a type marker token into a kind.
    ///
    /// This never fails: an empty or unrecognized marker becomes [`ValueKind::Error`], so the
    /// "unsupported type" ends up as the tag of the stored payload instead of a store failure.
    pub fn from_marker(marker: &[u8]) -> ValueKind {
        match marker.first() {
            Some(b'+') => ValueKind::SimpleString,
            Some(b':') => ValueKind::Integer,
            Some(b'$') => ValueKind::BulkString,
            _ => ValueKind::Error,
        }
    }

    /// The prefix used when a value of this kind is written back to a client.
    pub fn prefix(self) -> u8 {
        match self {
            ValueKind::SimpleString | ValueKind::BulkString => b'+',
            ValueKind::Integer => b':',
            ValueKind::Error => b'-',
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredValue {
    pub kind: ValueKind,
    /// The payload exactly as it arrived, it doesn't have to be valid UTF-8.
    pub raw: Bytes,
}

impl StoredValue {
    pub fn new(kind: ValueKind, raw: impl Into<Bytes>) -> StoredValue {
        StoredValue {
            kind,
            raw: raw.into(),
        }
    }

    /// Builds a value from the type marker token that preceded it on the wire.
    pub fn from_marker(marker: impl AsRef<[u8]>, raw: impl Into<Bytes>) -> StoredValue {
        StoredValue::new(ValueKind::from_marker(marker.as_ref()), raw)
    }

    /// The canonical form of a value: its tag followed by the payload, without the line
    /// terminator.
    pub fn encode_into(&self, dst: &mut Vec<u8>) {
        dst.push(self.kind.prefix());
        dst.extend_from_slice(&self.raw);
    }
}

// For logs only, invalid UTF-8 in the payload is shown replaced.
impl fmt::Display for StoredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            char::from(self.kind.prefix()),
            String::from_utf8_lossy(&self.raw)
        )
    }
}

/// The Store maps keys to typed values. Keys are raw bytes, two keys are equal only when their
/// bytes are. It is shared by every session and can be cloned cheaply,
/// all clones point to the same map.
///
/// Reads take a shared lock and may run concurrently with each other, writes and deletes take the
/// exclusive lock. There is no eviction, no expiration and no size limit.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<HashMap<Bytes, StoredValue>>>,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    pub fn read(&self, key: impl AsRef<[u8]>) -> Option<StoredValue> {
        self.shared().get(key.as_ref()).cloned()
    }

    /// Unconditional upsert.
    pub fn write(&self, key: impl Into<Bytes>, value: StoredValue) {
        self.exclusive().insert(key.into(), value);
    }

    /// Returns how many keys were removed, 0 or 1. Removing an absent key is not an error.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> usize {
        match self.exclusive().remove(key.as_ref()) {
            Some(_) => 1,
            None => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.shared().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Every operation leaves the map consistent, so a panic in another holder doesn't invalidate it.
    fn shared(&self) -> RwLockReadGuard<'_, HashMap<Bytes, StoredValue>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn exclusive(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, StoredValue>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn write_then_read() {
        let store = Store::new();
        let value = StoredValue::from_marker("$", "bar");

        store.write("foo".to_string(), value.clone());

        assert_eq!(store.read("foo"), Some(value));
    }

    #[test]
    fn read_missing_key() {
        let store = Store::new();
        assert_eq!(store.read("missing"), None);
    }

    #[test]
    fn write_overwrites() {
        let store = Store::new();
        store.write("foo".to_string(), StoredValue::from_marker("$", "one"));
        store.write("foo".to_string(), StoredValue::from_marker(":", "2"));

        assert_eq!(store.read("foo"), Some(StoredValue::new(ValueKind::Integer, "2")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_present_key() {
        let store = Store::new();
        store.write("foo".to_string(), StoredValue::from_marker("$", "bar"));

        assert_eq!(store.delete("foo"), 1);
        assert_eq!(store.read("foo"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn delete_absent_key() {
        let store = Store::new();
        store.write("foo".to_string(), StoredValue::from_marker("$", "bar"));

        assert_eq!(store.delete("other"), 0);
        assert_eq!(store.len(), 1);
        assert!(store.read("foo").is_some());
    }

    #[test]
    fn unknown_marker_is_stored_as_error() {
        assert_eq!(ValueKind::from_marker(b"?"), ValueKind::Error);
        assert_eq!(ValueKind::from_marker(b""), ValueKind::Error);
        assert_eq!(ValueKind::from_marker(b"+"), ValueKind::SimpleString);
        assert_eq!(ValueKind::from_marker(b":"), ValueKind::Integer);
        assert_eq!(ValueKind::from_marker(b"$5"), ValueKind::BulkString);
    }

    #[test]
    fn display() {
        assert_eq!(StoredValue::from_marker("$", "bar").to_string(), "+bar");
        assert_eq!(StoredValue::from_marker("+", "ok").to_string(), "+ok");
        assert_eq!(StoredValue::from_marker(":", "42").to_string(), ":42");
        assert_eq!(StoredValue::from_marker("!", "boom").to_string(), "-boom");
    }

    #[test]
    fn keys_are_compared_byte_for_byte() {
        let store = Store::new();
        store.write(&b"k\xff"[..], StoredValue::from_marker("$", &b"v\xfe"[..]));

        assert_eq!(store.read(b"k\xfe"), None);
        assert_eq!(store.read(b"k\xff").unwrap().raw, &b"v\xfe"[..]);
    }

    #[test]
    fn encode_keeps_payload_bytes() {
        let mut dst = vec![];
        StoredValue::from_marker("$", &b"v\xfe"[..]).encode_into(&mut dst);
        assert_eq!(dst, b"+v\xfe");
    }

    #[test]
    fn clones_share_state() {
        let store = Store::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    store.write(format!("key{}", i), StoredValue::from_marker(":", i.to_string()));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 8);
        assert_eq!(store.read("key3"), Some(StoredValue::new(ValueKind::Integer, "3")));
    }
}
