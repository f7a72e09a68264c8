//! Bucket: one logical object store over three key-value stores.
//!
//! - payload store: id -> full object record
//! - name index:    owner \0 name -> id
//! - meta index:    id -> metadata (scanned by predicate queries)
//!
//! The stores share no transaction. Create and delete run their store
//! writes in a fixed order while holding the `(name, owner)` stripe lock;
//! a failure after the first write is reported as
//! [`Error::IndexInconsistency`] and can be fixed by [`Bucket::repair`].

use crate::locks::NameLocks;
use crate::maintenance::{CycleReport, MaintenanceHandle, NamedStore, run_cycle};
use crate::metadata::{Metadata, SystemKey};
use crate::object::Object;
use objst_common::{BucketConfig, Error, IndexStep, ObjectId, Result};
use objst_store::{KvStore, StoreOptions};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Name index key for `(name, owner)`
pub(crate) fn name_key(name: &str, owner: &str) -> String {
    format!("{owner}\0{name}")
}

/// Object store over a payload store and two secondary indexes
pub struct Bucket {
    pub(crate) payload: Arc<KvStore>,
    pub(crate) names: Arc<KvStore>,
    pub(crate) metas: Arc<KvStore>,
    pub(crate) locks: NameLocks,
    maintenance: Mutex<Option<MaintenanceHandle>>,
    config: BucketConfig,
}

impl Bucket {
    /// Open (or create) the three stores under `config.data_dir` and start
    /// background maintenance if enabled.
    pub fn open(config: BucketConfig) -> Result<Self> {
        let options = StoreOptions::from(&config.store);
        let payload = Arc::new(KvStore::open(config.payload_dir(), &options)?);
        let names = Arc::new(KvStore::open(config.names_dir(), &options)?);
        let metas = Arc::new(KvStore::open(config.metas_dir(), &options)?);

        let bucket = Self {
            payload,
            names,
            metas,
            locks: NameLocks::new(),
            maintenance: Mutex::new(None),
            config,
        };

        if bucket.config.maintenance.enabled {
            let handle = MaintenanceHandle::spawn(bucket.named_stores(), &bucket.config.maintenance)?;
            *bucket.maintenance.lock() = Some(handle);
        }

        info!("Opened bucket at {:?}", bucket.config.data_dir);
        Ok(bucket)
    }

    #[must_use]
    pub const fn config(&self) -> &BucketConfig {
        &self.config
    }

    fn named_stores(&self) -> Vec<NamedStore> {
        vec![
            ("payload", Arc::clone(&self.payload)),
            ("names", Arc::clone(&self.names)),
            ("metas", Arc::clone(&self.metas)),
        ]
    }

    /// Persist a new object and mark it immutable.
    ///
    /// Fails with [`Error::NameAlreadyExists`] without writing anything when
    /// the owner already has an object with that name.
    #[instrument(skip_all, fields(id = %obj.id(), name = obj.name(), owner = obj.owner()))]
    pub fn create(&self, obj: &mut Object) -> Result<()> {
        if !obj.is_mutable() {
            return Err(Error::ObjectImmutable);
        }
        obj.validate()?;

        let key = name_key(obj.name(), obj.owner());
        let _guard = self.locks.lock(&key);
        self.ensure_name_free(obj)?;

        let id = obj.id().to_key();
        let record = obj.marshal()?;
        let meta = obj.meta().marshal()?;

        self.payload.set(&id, &record)?;
        self.write_indexes(&id, &key, &meta)?;

        obj.mark_immutable();
        debug!("Created object ({} bytes)", obj.len());
        Ok(())
    }

    /// Persist several objects; payload records go in one write batch.
    ///
    /// Every object is validated and checked for name conflicts (against
    /// the bucket and within the batch) before anything is written. Index
    /// failures after the batch is committed are not rolled back.
    #[instrument(skip_all, fields(count = objs.len()))]
    pub fn batch_create(&self, objs: &mut [Object]) -> Result<()> {
        if objs.is_empty() {
            return Ok(());
        }

        let mut keys = Vec::with_capacity(objs.len());
        let mut seen_names = HashSet::with_capacity(objs.len());
        let mut seen_ids = HashSet::with_capacity(objs.len());
        for obj in objs.iter() {
            if !obj.is_mutable() {
                return Err(Error::ObjectImmutable);
            }
            obj.validate()?;
            let key = name_key(obj.name(), obj.owner());
            if !seen_names.insert(key.clone()) {
                return Err(Error::NameAlreadyExists {
                    name: obj.name().to_string(),
                    owner: obj.owner().to_string(),
                });
            }
            if !seen_ids.insert(obj.id()) {
                return Err(Error::invalid_argument(format!(
                    "object {} appears twice in the batch",
                    obj.id()
                )));
            }
            keys.push(key);
        }

        let _guards = self.locks.lock_many(keys.iter().map(String::as_str));
        let mut encoded = Vec::with_capacity(objs.len());
        for obj in objs.iter() {
            self.ensure_name_free(obj)?;
            encoded.push((obj.marshal()?, obj.meta().marshal()?));
        }

        let mut batch = self.payload.write_batch();
        for (obj, (record, _)) in objs.iter().zip(&encoded) {
            batch.put(obj.id().to_key(), record.clone());
        }
        batch.commit()?;

        for ((obj, key), (_, meta)) in objs.iter_mut().zip(&keys).zip(&encoded) {
            self.write_indexes(&obj.id().to_key(), key, meta)?;
            obj.mark_immutable();
        }
        debug!("Created {} objects", objs.len());
        Ok(())
    }

    fn ensure_name_free(&self, obj: &Object) -> Result<()> {
        if self.names.contains(&name_key(obj.name(), obj.owner()))? {
            return Err(Error::NameAlreadyExists {
                name: obj.name().to_string(),
                owner: obj.owner().to_string(),
            });
        }
        Ok(())
    }

    fn write_indexes(&self, id: &str, key: &str, meta: &[u8]) -> Result<()> {
        self.names
            .set(key, id.as_bytes())
            .map_err(|e| Error::inconsistency(id, IndexStep::NameIndex, e.into()))?;
        self.metas
            .set(id, meta)
            .map_err(|e| Error::inconsistency(id, IndexStep::MetaIndex, e.into()))?;
        Ok(())
    }

    /// Fetch an object by id. The returned copy is immutable.
    pub fn get_by_id(&self, id: &ObjectId) -> Result<Object> {
        let raw = self
            .payload
            .get(&id.to_key())?
            .ok_or_else(|| Error::not_found(format!("object {id}")))?;
        Object::unmarshal(&raw)
    }

    /// Fetch an object by `(name, owner)`
    pub fn get_by_name(&self, name: &str, owner: &str) -> Result<Object> {
        let id = self
            .resolve_name(name, owner)?
            .ok_or_else(|| Error::not_found(format!("object `{name}` of owner `{owner}`")))?;
        self.get_by_id(&id)
    }

    /// Look up the id registered for `(name, owner)`
    pub fn resolve_name(&self, name: &str, owner: &str) -> Result<Option<ObjectId>> {
        self.names
            .get(&name_key(name, owner))?
            .map(|raw| parse_id_bytes(&raw))
            .transpose()
    }

    /// Remove an object from all three stores.
    ///
    /// The name index entry is located through the meta index, falling back
    /// to the payload record when the meta entry is gone.
    #[instrument(skip(self))]
    pub fn delete_by_id(&self, id: &ObjectId) -> Result<()> {
        let key = id.to_key();
        let (name, owner) = self.resolve_identity(id)?;
        let nkey = name_key(&name, &owner);
        let _guard = self.locks.lock(&nkey);

        if !self.payload.contains(&key)? && !self.metas.contains(&key)? {
            return Err(Error::not_found(format!("object {id}")));
        }

        self.payload.delete(&key)?;

        let step = (|| -> Result<()> {
            if self.names.get(&nkey)?.is_some_and(|raw| raw == key.as_bytes()) {
                self.names.delete(&nkey)?;
            }
            Ok(())
        })();
        step.map_err(|e| Error::inconsistency(&key, IndexStep::NameIndex, e))?;

        self.metas
            .delete(&key)
            .map_err(|e| Error::inconsistency(&key, IndexStep::MetaIndex, e.into()))?;

        debug!("Deleted object {} ({} / {})", id, owner, name);
        Ok(())
    }

    /// Remove the object registered for `(name, owner)`
    pub fn delete_by_name(&self, name: &str, owner: &str) -> Result<()> {
        let id = self
            .resolve_name(name, owner)?
            .ok_or_else(|| Error::not_found(format!("object `{name}` of owner `{owner}`")))?;
        self.delete_by_id(&id)
    }

    /// `(name, owner)` of `id`, from the meta index or else the payload record.
    ///
    /// An unreadable meta entry is not fatal as long as the payload record
    /// can stand in for it.
    fn resolve_identity(&self, id: &ObjectId) -> Result<(String, String)> {
        let key = id.to_key();
        let mut unreadable = None;
        if let Some(raw) = self.metas.get(&key)? {
            match Metadata::unmarshal(&raw) {
                Ok(meta) => {
                    if let (Some(name), Some(owner)) = (
                        meta.get_system(SystemKey::Name),
                        meta.get_system(SystemKey::Owner),
                    ) {
                        return Ok((name.to_string(), owner.to_string()));
                    }
                    warn!("Meta entry of {} lacks name/owner, using payload record", id);
                }
                Err(e) => {
                    warn!("Meta entry of {} is unreadable ({}), using payload record", id, e);
                    unreadable = Some(e);
                }
            }
        }
        match (self.get_by_id(id), unreadable) {
            (Ok(obj), _) => Ok((obj.name().to_string(), obj.owner().to_string())),
            (Err(_), Some(e)) => Err(Error::inconsistency(key, IndexStep::MetaIndex, e)),
            (Err(e), None) => Err(e),
        }
    }

    /// Fetch an object and check it belongs to `owner`
    pub fn is_authorized(&self, owner: &str, id: &ObjectId) -> Result<Object> {
        let obj = self.get_by_id(id)?;
        if obj.owner() != owner {
            return Err(Error::Unauthorized);
        }
        Ok(obj)
    }

    /// Number of records in the payload store
    pub fn object_count(&self) -> Result<u64> {
        Ok(self.payload.len()?)
    }

    /// Run one compaction cycle over all stores right away
    pub fn compact_now(&self, threshold: f64) -> CycleReport {
        run_cycle(&self.named_stores(), threshold)
    }

    /// Stop maintenance and close the stores
    pub fn close(self) {
        self.stop_maintenance();
        info!("Closed bucket at {:?}", self.config.data_dir);
    }

    fn stop_maintenance(&self) {
        if let Some(handle) = self.maintenance.lock().take() {
            handle.shutdown();
        }
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        self.stop_maintenance();
    }
}

pub(crate) fn parse_id_bytes(raw: &[u8]) -> Result<ObjectId> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Deserialization("name index value is not an object id".into()))
}
