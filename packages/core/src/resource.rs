//! Host-owned resources referenced from script by correlation id.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::id::CorrelationId;

/// An open, not yet consumed byte source such as a response body.
///
/// Clones share the same underlying reader. Reading drains it and closes the
/// stream; a closed stream reads as empty.
#[derive(Clone)]
pub struct ByteStream {
    inner: Arc<Mutex<Option<Box<dyn Read + Send>>>>,
}

impl ByteStream {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(reader)))),
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(io::Cursor::new(bytes.into()))
    }

    /// Drain the remaining bytes and close the stream.
    pub fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let reader = self.inner.lock().take();
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            reader.read_to_end(&mut buf)?;
        }
        Ok(buf)
    }

    /// Drop the reader without consuming it.
    pub fn close(&self) {
        self.inner.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Which half of an asymmetric key pair a handle holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Public,
    Private,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Public => f.write_str("public"),
            KeyKind::Private => f.write_str("private"),
        }
    }
}

/// Native key material owned by a key management implementation.
///
/// The store only carries it around; the owning crate downcasts through
/// [`KeyMaterial::as_any`].
pub trait KeyMaterial: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

/// A stored key: its kind, export policy and material.
#[derive(Debug, Clone)]
pub struct KeyHandle {
    pub kind: KeyKind,
    pub extractable: bool,
    pub material: Arc<dyn KeyMaterial>,
}

impl KeyHandle {
    pub fn new(kind: KeyKind, extractable: bool, material: impl KeyMaterial) -> Self {
        Self {
            kind,
            extractable,
            material: Arc::new(material),
        }
    }

    pub fn material<T: KeyMaterial>(&self) -> Option<&T> {
        self.material.as_any().downcast_ref::<T>()
    }
}

#[derive(Debug, Clone)]
pub enum StoredResource {
    ByteStream(ByteStream),
    Key(KeyHandle),
}

impl StoredResource {
    pub fn kind(&self) -> &'static str {
        match self {
            StoredResource::ByteStream(_) => "stream",
            StoredResource::Key(_) => "key",
        }
    }

    pub fn as_stream(&self) -> Option<&ByteStream> {
        match self {
            StoredResource::ByteStream(stream) => Some(stream),
            StoredResource::Key(_) => None,
        }
    }

    pub fn as_key(&self) -> Option<&KeyHandle> {
        match self {
            StoredResource::Key(key) => Some(key),
            StoredResource::ByteStream(_) => None,
        }
    }

    /// Release whatever the resource holds open.
    pub fn release(&self) {
        if let StoredResource::ByteStream(stream) = self {
            stream.close();
        }
    }
}

impl From<ByteStream> for StoredResource {
    fn from(stream: ByteStream) -> Self {
        StoredResource::ByteStream(stream)
    }
}

impl From<KeyHandle> for StoredResource {
    fn from(key: KeyHandle) -> Self {
        StoredResource::Key(key)
    }
}

/// Concurrent map from correlation id to host-owned resource.
///
/// Cheap to clone; all clones see the same entries. Entries live until they
/// are removed, there is no expiry.
#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
    entries: Arc<Mutex<HashMap<CorrelationId, StoredResource>>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `id`.
    pub fn put(&self, id: CorrelationId, resource: impl Into<StoredResource>) {
        let previous = self.entries.lock().insert(id, resource.into());
        if let Some(previous) = previous {
            tracing::debug!(kind = previous.kind(), "replaced stored resource");
        }
    }

    /// Shared handle to the entry, which stays in the store.
    pub fn get(&self, id: &CorrelationId) -> Option<StoredResource> {
        self.entries.lock().get(id).cloned()
    }

    /// Take the entry out of the store.
    pub fn remove(&self, id: &CorrelationId) -> Option<StoredResource> {
        self.entries.lock().remove(id)
    }

    /// Remove and release the entry. Returns whether it existed.
    pub fn delete(&self, id: &CorrelationId) -> bool {
        match self.remove(id) {
            Some(resource) => {
                resource.release();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<CorrelationId> {
        self.entries.lock().keys().cloned().collect()
    }
}
