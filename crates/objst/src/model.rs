//! Canonical external representation of an object.
//!
//! Used by the HTTP facade and any other transport boundary. The payload is
//! carried as standard base64 in JSON.

use crate::object::Object;
use objst_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transfer record: `{ id, name, owner, metadata, payload }`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectModel {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u8>,
}

impl ObjectModel {
    /// Same record with the payload dropped
    #[must_use]
    pub fn without_payload(mut self) -> Self {
        self.payload = Vec::new();
        self
    }

    /// Build a fresh mutable object from this record.
    ///
    /// The object gets a newly generated id; `id` and any system keys in
    /// `metadata` are ignored.
    pub fn into_object(self) -> Result<Object> {
        let mut obj = Object::new(self.name, self.owner)?;
        for (key, value) in self.metadata {
            obj.set_meta_key(key, value);
        }
        obj.write_payload(&self.payload)?;
        Ok(obj)
    }
}

impl Object {
    #[must_use]
    pub fn to_model(&self) -> ObjectModel {
        ObjectModel {
            id: self.id().to_key(),
            name: self.name().to_string(),
            owner: self.owner().to_string(),
            metadata: self.meta().clone().into(),
            payload: self.payload().to_vec(),
        }
    }
}

impl From<&Object> for ObjectModel {
    fn from(obj: &Object) -> Self {
        obj.to_model()
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::CONTENT_TYPE;

    #[test]
    fn test_model_json_shape() {
        let mut obj = Object::new("photo.jpg", "u1").unwrap();
        obj.set_meta_key(CONTENT_TYPE, "image/jpeg");
        obj.write_payload(&[0xFF, 0xD8]).unwrap();

        let json = serde_json::to_value(obj.to_model()).unwrap();
        assert_eq!(json["id"], obj.id().to_key());
        assert_eq!(json["name"], "photo.jpg");
        assert_eq!(json["owner"], "u1");
        assert_eq!(json["metadata"][CONTENT_TYPE], "image/jpeg");
        assert_eq!(json["payload"], "/9g=");

        let bare = serde_json::to_value(obj.to_model().without_payload()).unwrap();
        assert!(bare.get("payload").is_none());
    }

    #[test]
    fn test_into_object_gets_fresh_identity() {
        let model: ObjectModel = serde_json::from_str(
            r#"{
                "id": "not-used",
                "name": "notes.txt",
                "owner": "u7",
                "metadata": {"contentType": "text/plain", "owner": "mallory", "tag": "a"},
                "payload": "aGVsbG8="
            }"#,
        )
        .unwrap();

        let obj = model.into_object().unwrap();
        assert_eq!(obj.owner(), "u7");
        assert_eq!(obj.get_meta_key("owner"), Some("u7"));
        assert_eq!(obj.get_meta_key("tag"), Some("a"));
        assert_eq!(obj.payload(), b"hello");
        assert!(obj.is_mutable());
        assert!(obj.validate().is_ok());
    }

    #[test]
    fn test_bad_base64_rejected() {
        let res: std::result::Result<ObjectModel, _> =
            serde_json::from_str(r#"{"name": "a.txt", "payload": "***"}"#);
        assert!(res.is_err());
    }
}
