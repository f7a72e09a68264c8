//! Cross-store consistency check and repair.
//!
//! Create and delete touch three stores without a shared transaction, so a
//! crash or store failure can leave index entries missing or dangling.
//! [`Bucket::verify`] reports such entries; [`Bucket::repair`] rebuilds
//! missing ones from the payload records and drops dangling ones.

use crate::bucket::{Bucket, name_key};
use crate::context::OpContext;
use crate::metadata::Metadata;
use crate::object::Object;
use objst_common::{ObjectId, Result};
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument, warn};

/// Name index entry that does not point at a matching payload record
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct NameEntry {
    pub owner: String,
    pub name: String,
    pub id: String,
}

impl NameEntry {
    fn from_key(key: &str, id: &str) -> Self {
        let (owner, name) = key.split_once('\0').unwrap_or(("", key));
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            id: id.to_string(),
        }
    }
}

/// Findings of a verify or repair pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Payload records scanned
    pub objects: usize,
    /// Payload records without their name index entry
    pub missing_name_entries: Vec<ObjectId>,
    /// Payload records whose `(name, owner)` slot is held by another live object
    pub name_conflicts: Vec<ObjectId>,
    /// Payload records without a meta index entry
    pub missing_meta_entries: Vec<ObjectId>,
    /// Meta index entries of live objects that do not decode
    pub corrupt_meta_entries: Vec<ObjectId>,
    /// Name index entries pointing at an absent or different object
    pub dangling_name_entries: Vec<NameEntry>,
    /// Meta index keys without a payload record
    pub dangling_meta_entries: Vec<String>,
    /// Payload store keys that are not object ids or whose record does not
    /// decode. Reported only; repair leaves them and their index entries.
    pub unreadable_records: Vec<String>,
    /// Entries fixed by [`Bucket::repair`]
    pub repaired: usize,
}

impl ConsistencyReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.missing_name_entries.is_empty()
            && self.name_conflicts.is_empty()
            && self.missing_meta_entries.is_empty()
            && self.corrupt_meta_entries.is_empty()
            && self.dangling_name_entries.is_empty()
            && self.dangling_meta_entries.is_empty()
            && self.unreadable_records.is_empty()
    }
}

/// Decoded payload record: parsed id and its name index key
struct Record {
    id: ObjectId,
    name_key: String,
}

impl Bucket {
    /// Compare the three stores and report what does not line up.
    ///
    /// Read-only. Results taken while writers are active may include
    /// entries of in-flight operations.
    #[instrument(skip_all)]
    pub fn verify(&self, ctx: &OpContext) -> Result<ConsistencyReport> {
        let mut records: HashMap<String, Record> = HashMap::new();
        let mut unreadable: HashSet<String> = HashSet::new();
        self.payload.scan(|key, raw| -> Result<()> {
            ctx.check()?;
            let decoded = key
                .parse::<ObjectId>()
                .and_then(|id| Object::unmarshal(raw).map(|obj| (id, obj)));
            match decoded {
                Ok((id, obj)) => {
                    let record = Record {
                        id,
                        name_key: name_key(obj.name(), obj.owner()),
                    };
                    records.insert(key.to_string(), record);
                }
                Err(e) => {
                    warn!("Payload record `{}` is unreadable: {}", key, e);
                    unreadable.insert(key.to_string());
                }
            }
            Ok(())
        })?;

        let mut names: HashMap<String, String> = HashMap::new();
        self.names.scan(|key, raw| -> Result<()> {
            ctx.check()?;
            names.insert(key.to_string(), String::from_utf8_lossy(raw).into_owned());
            Ok(())
        })?;

        let mut metas: HashSet<String> = HashSet::new();
        let mut undecodable: HashSet<String> = HashSet::new();
        self.metas.scan(|key, raw| -> Result<()> {
            ctx.check()?;
            if Metadata::unmarshal(raw).is_err() {
                undecodable.insert(key.to_string());
            }
            metas.insert(key.to_string());
            Ok(())
        })?;

        let mut report = ConsistencyReport {
            objects: records.len() + unreadable.len(),
            ..ConsistencyReport::default()
        };

        for (key, record) in &records {
            match names.get(&record.name_key) {
                Some(indexed) if indexed == key => {}
                Some(other)
                    if records
                        .get(other)
                        .is_some_and(|r| r.name_key == record.name_key) =>
                {
                    report.name_conflicts.push(record.id);
                }
                _ => report.missing_name_entries.push(record.id),
            }
            if !metas.contains(key) {
                report.missing_meta_entries.push(record.id);
            } else if undecodable.contains(key) {
                report.corrupt_meta_entries.push(record.id);
            }
        }
        for (nkey, id) in &names {
            let points_home = records.get(id).is_some_and(|r| &r.name_key == nkey);
            if !points_home && !unreadable.contains(id) {
                report.dangling_name_entries.push(NameEntry::from_key(nkey, id));
            }
        }
        report.dangling_meta_entries = metas
            .into_iter()
            .filter(|id| !records.contains_key(id) && !unreadable.contains(id))
            .collect();
        report.unreadable_records = unreadable.into_iter().collect();

        report.missing_name_entries.sort_unstable();
        report.name_conflicts.sort_unstable();
        report.missing_meta_entries.sort_unstable();
        report.corrupt_meta_entries.sort_unstable();
        report.dangling_name_entries.sort_unstable();
        report.dangling_meta_entries.sort_unstable();
        report.unreadable_records.sort_unstable();

        if !report.is_consistent() {
            warn!("Bucket inconsistency found: {:?}", report);
        }
        Ok(report)
    }

    /// Verify, then drop dangling index entries and rebuild missing or
    /// corrupt ones from the payload records.
    ///
    /// Each fix is re-checked under the `(name, owner)` lock. A missing name
    /// entry whose slot is now taken by another object is left alone, as
    /// are unreadable payload records.
    #[instrument(skip_all)]
    pub fn repair(&self, ctx: &OpContext) -> Result<ConsistencyReport> {
        let mut report = self.verify(ctx)?;
        let mut repaired = 0;

        for entry in &report.dangling_name_entries {
            ctx.check()?;
            let nkey = name_key(&entry.name, &entry.owner);
            let _guard = self.locks.lock(&nkey);
            let still_dangling = match self.names.get(&nkey)? {
                Some(raw) if raw == entry.id.as_bytes() => !self.record_has_name(&entry.id, &nkey)?,
                _ => false,
            };
            if still_dangling && self.names.delete(&nkey)? {
                repaired += 1;
            }
        }

        for id in &report.missing_name_entries {
            ctx.check()?;
            let Some(obj) = self.live_record(id)? else {
                continue;
            };
            let nkey = name_key(obj.name(), obj.owner());
            let _guard = self.locks.lock(&nkey);
            if self.names.contains(&nkey)? {
                warn!(
                    "Cannot restore name of {}: `{}` of `{}` is taken",
                    id,
                    obj.name(),
                    obj.owner()
                );
                continue;
            }
            self.names.set(&nkey, id.to_key().as_bytes())?;
            repaired += 1;
        }

        for id in report
            .missing_meta_entries
            .iter()
            .chain(&report.corrupt_meta_entries)
        {
            ctx.check()?;
            if self.restore_meta(id)? {
                repaired += 1;
            }
        }

        for key in &report.dangling_meta_entries {
            ctx.check()?;
            if !self.payload.contains(key)? && self.metas.delete(key)? {
                repaired += 1;
            }
        }

        for key in &report.unreadable_records {
            warn!("Leaving unreadable payload record `{}` in place", key);
        }

        report.repaired = repaired;
        info!("Repair pass fixed {} entries", repaired);
        Ok(report)
    }

    /// Rewrite the meta entry of `id` from its payload record unless it is
    /// present and decodes by now.
    fn restore_meta(&self, id: &ObjectId) -> Result<bool> {
        let Some(obj) = self.live_record(id)? else {
            return Ok(false);
        };
        let key = id.to_key();
        let _guard = self.locks.lock(&name_key(obj.name(), obj.owner()));
        if !self.payload.contains(&key)? {
            return Ok(false);
        }
        let intact = self
            .metas
            .get(&key)?
            .is_some_and(|raw| Metadata::unmarshal(&raw).is_ok());
        if intact {
            return Ok(false);
        }
        self.metas.set(&key, &obj.meta().marshal()?)?;
        Ok(true)
    }

    fn live_record(&self, id: &ObjectId) -> Result<Option<Object>> {
        match self.get_by_id(id) {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn record_has_name(&self, id: &str, nkey: &str) -> Result<bool> {
        match self.payload.get(id)? {
            Some(raw) => {
                let obj = Object::unmarshal(&raw)?;
                Ok(name_key(obj.name(), obj.owner()) == nkey)
            }
            None => Ok(false),
        }
    }
}
