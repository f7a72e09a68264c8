//! Query execution: point lookups and meta index scans.

use crate::bucket::Bucket;
use crate::context::OpContext;
use crate::metadata::Metadata;
use crate::object::Object;
use crate::query::{Operation, Plan, Query};
use objst_common::{Error, ObjectId, Result};
use tracing::{debug, instrument, warn};

/// Result of [`Bucket::execute`]
#[derive(Debug)]
pub enum QueryResult {
    /// Matched objects, for [`Operation::Get`]
    Objects(Vec<Object>),
    /// Number of removed objects, for [`Operation::Delete`]
    Deleted(usize),
}

impl QueryResult {
    /// Matched objects; empty for a delete
    #[must_use]
    pub fn into_objects(self) -> Vec<Object> {
        match self {
            Self::Objects(objs) => objs,
            Self::Deleted(_) => Vec::new(),
        }
    }

    /// Number of removed objects; zero for a get
    #[must_use]
    pub const fn deleted(&self) -> usize {
        match self {
            Self::Objects(_) => 0,
            Self::Deleted(n) => *n,
        }
    }
}

impl Bucket {
    /// Run a query.
    ///
    /// An id or `(name, owner)` resolves to a point lookup; predicates in
    /// that case are ignored. A point lookup by id with an owner set fails
    /// with [`Error::Unauthorized`] when the object belongs to someone else.
    /// Anything else scans the meta index.
    #[instrument(skip_all, fields(action = ?query.get_action(), operation = ?query.get_operation()))]
    pub fn execute(&self, ctx: &OpContext, query: &Query) -> Result<QueryResult> {
        let plan = query.plan()?;
        ctx.check()?;

        let target = match plan {
            Plan::ById(id) => match query.owner_filter() {
                Some(owner) => self.is_authorized(owner, &id)?,
                None => self.get_by_id(&id)?,
            },
            Plan::ByName { name, owner } => self.get_by_name(&name, &owner)?,
            Plan::Scan => {
                let ids = self.scan_matching(ctx, query)?;
                debug!("Scan matched {} objects", ids.len());
                return match query.get_operation() {
                    Operation::Get => self.materialize(ctx, &ids).map(QueryResult::Objects),
                    Operation::Delete => self.delete_matched(ctx, &ids).map(QueryResult::Deleted),
                };
            }
        };

        match query.get_operation() {
            Operation::Get => Ok(QueryResult::Objects(vec![target])),
            Operation::Delete => {
                self.delete_by_id(&target.id())?;
                Ok(QueryResult::Deleted(1))
            }
        }
    }

    /// Ids of every meta index record the query matches.
    ///
    /// A record that fails to decode aborts the scan.
    fn scan_matching(&self, ctx: &OpContext, query: &Query) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        self.metas.scan(|key, raw| -> Result<()> {
            ctx.check()?;
            let record = Metadata::unmarshal(raw)?;
            if query.matches(&record) {
                let id = key.parse::<ObjectId>().map_err(|_| {
                    Error::Deserialization(format!("meta index key `{key}` is not an object id"))
                })?;
                ids.push(id);
            }
            Ok(())
        })?;
        Ok(ids)
    }

    fn materialize(&self, ctx: &OpContext, ids: &[ObjectId]) -> Result<Vec<Object>> {
        let mut objects = Vec::with_capacity(ids.len());
        for id in ids {
            ctx.check()?;
            match self.get_by_id(id) {
                Ok(obj) => objects.push(obj),
                Err(e) if e.is_not_found() => {
                    warn!("Meta entry {} has no payload record, skipping", id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(objects)
    }

    fn delete_matched(&self, ctx: &OpContext, ids: &[ObjectId]) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            if ctx.is_done() {
                return Err(Error::Cancelled { removed });
            }
            match self.delete_by_id(id) {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => debug!("Object {} already gone", id),
                Err(e) => {
                    return Err(Error::ScanDeleteIncomplete {
                        removed,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(removed)
    }
}
