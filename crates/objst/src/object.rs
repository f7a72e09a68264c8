//! The stored entity: identity, name, owner, metadata and payload.

use crate::metadata::{CONTENT_TYPE, Metadata, SystemKey};
use objst_common::{Error, ObjectId, Result, ValidationError, is_valid_object_name, validate_owner};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// An object staged in memory or read back from a bucket.
///
/// A new object is mutable: payload can be appended and user metadata
/// changed. It becomes immutable once a bucket persists it, and every
/// object returned by a bucket is immutable from the start.
#[derive(Clone)]
pub struct Object {
    id: ObjectId,
    name: String,
    owner: String,
    meta: Metadata,
    payload: Vec<u8>,
    read_pos: usize,
    mutable: bool,
}

/// On-disk record held by the payload store
#[derive(Serialize, Deserialize)]
struct StoredObject {
    id: ObjectId,
    name: String,
    owner: String,
    meta: Metadata,
    payload: Vec<u8>,
}

impl Object {
    /// Create a mutable object with a fresh id.
    ///
    /// The name pattern is only enforced by [`Object::validate`].
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let owner = owner.into();
        if name.is_empty() {
            return Err(Error::invalid_argument("object name cannot be empty"));
        }
        validate_owner(&owner)?;

        let id = ObjectId::new();
        let mut meta = Metadata::new();
        meta.set_system(SystemKey::Id, id.to_key());
        meta.set_system(SystemKey::Name, name.clone());
        meta.set_system(SystemKey::Owner, owner.clone());
        meta.set_system(SystemKey::CreatedAt, chrono::Utc::now().to_rfc3339());

        Ok(Self {
            id,
            name,
            owner,
            meta,
            payload: Vec::new(),
            read_pos: 0,
            mutable: true,
        })
    }

    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub const fn meta(&self) -> &Metadata {
        &self.meta
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    #[must_use]
    pub const fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Content type recorded in the metadata, if any
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.meta.get(CONTENT_TYPE)
    }

    /// Append bytes to the payload
    pub fn write_payload(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.mutable {
            return Err(Error::ObjectImmutable);
        }
        self.payload.extend_from_slice(buf);
        Ok(buf.len())
    }

    /// Append everything `reader` yields to the payload
    pub fn read_from(&mut self, reader: &mut impl io::Read) -> Result<u64> {
        if !self.mutable {
            return Err(Error::ObjectImmutable);
        }
        Ok(io::copy(reader, &mut self.payload)?)
    }

    /// Move the read cursor back to the start of the payload
    pub const fn rewind(&mut self) {
        self.read_pos = 0;
    }

    /// Set a user metadata key. System keys and immutable objects are
    /// ignored; returns whether the value was written.
    pub fn set_meta_key(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        if !self.mutable {
            return false;
        }
        self.meta.set(key, value)
    }

    #[must_use]
    pub fn get_meta_key(&self, key: &str) -> Option<&str> {
        self.meta.get(key)
    }

    #[must_use]
    pub fn has_meta_key(&self, key: &str) -> bool {
        self.meta.has(key)
    }

    pub fn del_meta_key(&mut self, key: &str) -> Option<String> {
        if !self.mutable {
            return None;
        }
        self.meta.del(key)
    }

    /// Check the object can be persisted
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if !self.meta.has(CONTENT_TYPE) {
            return Err(ValidationError::MissingContentType);
        }
        if self.payload.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }
        if !is_valid_object_name(&self.name) {
            return Err(ValidationError::InvalidNamePattern(self.name.clone()));
        }
        Ok(())
    }

    pub(crate) const fn mark_immutable(&mut self) {
        self.mutable = false;
    }

    /// Encode id, name, owner, metadata and payload into one record
    pub fn marshal(&self) -> Result<Vec<u8>> {
        let stored = StoredObject {
            id: self.id,
            name: self.name.clone(),
            owner: self.owner.clone(),
            meta: self.meta.clone(),
            payload: self.payload.clone(),
        };
        bincode::serialize(&stored).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode a record produced by [`Object::marshal`].
    ///
    /// The result is immutable.
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        let stored: StoredObject = bincode::deserialize(data)
            .map_err(|e| Error::Deserialization(format!("object record: {e}")))?;
        Ok(Self {
            id: stored.id,
            name: stored.name,
            owner: stored.owner,
            meta: stored.meta,
            payload: stored.payload,
            read_pos: 0,
            mutable: false,
        })
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("meta", &self.meta)
            .field("payload_len", &self.payload.len())
            .field("mutable", &self.mutable)
            .finish_non_exhaustive()
    }
}

impl io::Write for Object {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_payload(buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for Object {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.payload[self.read_pos.min(self.payload.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.read_pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn sample() -> Object {
        let mut obj = Object::new("photo.jpg", "u1").unwrap();
        obj.set_meta_key(CONTENT_TYPE, "image/jpeg");
        obj.write_all(&[0xFF, 0xD8]).unwrap();
        obj
    }

    #[test]
    fn test_new_requires_name_and_owner() {
        assert!(matches!(
            Object::new("", "u1"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Object::new("a.txt", ""),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_new_seeds_system_metadata() {
        let obj = Object::new("a.txt", "u1").unwrap();
        assert_eq!(obj.get_meta_key("id"), Some(obj.id().to_key().as_str()));
        assert_eq!(obj.get_meta_key("name"), Some("a.txt"));
        assert_eq!(obj.get_meta_key("owner"), Some("u1"));
        assert!(obj.has_meta_key("createdAt"));
        assert!(obj.is_mutable());
    }

    #[test]
    fn test_system_keys_not_writable() {
        let mut obj = Object::new("a.txt", "u1").unwrap();
        assert!(!obj.set_meta_key("owner", "u2"));
        assert_eq!(obj.del_meta_key("name"), None);
        assert_eq!(obj.owner(), "u1");
        assert_eq!(obj.get_meta_key("owner"), Some("u1"));
    }

    #[test]
    fn test_validate_order() {
        let mut obj = Object::new("bad name", "u1").unwrap();
        assert_eq!(obj.validate(), Err(ValidationError::MissingContentType));
        obj.set_meta_key(CONTENT_TYPE, "text/plain");
        assert_eq!(obj.validate(), Err(ValidationError::EmptyPayload));
        obj.write_payload(b"x").unwrap();
        assert_eq!(
            obj.validate(),
            Err(ValidationError::InvalidNamePattern("bad name".into()))
        );
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_read_is_stateful() {
        let mut obj = Object::new("a.txt", "u1").unwrap();
        obj.write_all(b"hello world").unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(obj.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        let mut rest = String::new();
        obj.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, " world");
        assert_eq!(obj.read(&mut buf).unwrap(), 0);

        obj.rewind();
        assert_eq!(obj.read(&mut buf).unwrap(), 5);
    }

    #[test]
    fn test_read_from_reader() {
        let mut obj = Object::new("a.bin", "u1").unwrap();
        let n = obj.read_from(&mut &b"streamed"[..]).unwrap();
        assert_eq!(n, 8);
        assert_eq!(obj.payload(), b"streamed");
        assert_eq!(obj.len(), 8);
    }

    #[test]
    fn test_immutable_rejects_writes() {
        let mut obj = sample();
        obj.mark_immutable();
        assert!(matches!(obj.write_payload(b"x"), Err(Error::ObjectImmutable)));
        assert!(obj.write(b"x").is_err());
        assert!(obj.read_from(&mut &b"x"[..]).is_err());
        assert!(!obj.set_meta_key("k", "v"));
        assert_eq!(obj.payload(), &[0xFF, 0xD8]);
    }

    #[test]
    fn test_marshal_round_trip() {
        let mut obj = sample();
        obj.set_meta_key("k", "v");
        let decoded = Object::unmarshal(&obj.marshal().unwrap()).unwrap();

        assert_eq!(decoded.id(), obj.id());
        assert_eq!(decoded.name(), obj.name());
        assert_eq!(decoded.owner(), obj.owner());
        assert_eq!(decoded.meta(), obj.meta());
        assert_eq!(decoded.payload(), obj.payload());
        assert!(!decoded.is_mutable());
    }

    #[test]
    fn test_unmarshal_garbage() {
        assert!(matches!(
            Object::unmarshal(b"nope"),
            Err(Error::Deserialization(_))
        ));
    }
}
