//! Reconstruction cache.
//!
//! Old revisions are derived from newer ones, so the cache only ever grows
//! downwards from the current revision. A lookup for an uncached revision
//! walks one revision at a time from the lowest cached one and stores every
//! revision it passes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::schema::{Revision, TableMap};

/// Memoized revisions, seeded with the current one.
///
/// Cached revisions are served under a read lock. Walks are serialized by a
/// mutex holding the lowest cached revision and re-check the cache after
/// acquiring it, so every revision is computed at most once even under
/// concurrent lookups.
#[derive(Debug)]
pub(crate) struct RevisionCache {
    revisions: RwLock<BTreeMap<i32, Arc<Revision>>>,
    lowest: Mutex<Arc<Revision>>,
}

impl RevisionCache {
    /// Creates a cache holding only the current revision.
    pub(crate) fn new(current: Revision) -> Self {
        let current = Arc::new(current);
        let mut revisions = BTreeMap::new();
        revisions.insert(current.version(), Arc::clone(&current));
        Self {
            revisions: RwLock::new(revisions),
            lowest: Mutex::new(current),
        }
    }

    /// Returns a cached revision.
    pub(crate) fn get(&self, version: i32) -> Option<Arc<Revision>> {
        self.revisions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&version)
            .cloned()
    }

    /// Returns the number of cached revisions.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.revisions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `version`, computing it and every revision between it and the
    /// lowest cached one if needed.
    ///
    /// `step(revision, newer)` must return the tables at `revision` given the
    /// tables at `revision + 1`.
    pub(crate) fn get_or_walk<F>(&self, version: i32, mut step: F) -> Result<Arc<Revision>>
    where
        F: FnMut(i32, &Arc<TableMap>) -> Result<Arc<TableMap>>,
    {
        if let Some(revision) = self.get(version) {
            return Ok(revision);
        }

        let mut lowest = self.lowest.lock().unwrap_or_else(PoisonError::into_inner);

        // Another walk may have passed this revision while we waited.
        if let Some(revision) = self.get(version) {
            return Ok(revision);
        }

        if version >= lowest.version() {
            return Err(SchemaError::RevisionUnavailable {
                requested: version,
                lowest: lowest.version(),
            });
        }

        debug!(
            version,
            lowest = lowest.version(),
            "Reconstructing schema revision"
        );

        for revision in (version..lowest.version()).rev() {
            let tables = step(revision, lowest.shared_tables())?;
            let built = Arc::new(Revision::new(revision, tables));
            self.revisions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(revision, Arc::clone(&built));
            *lowest = built;
        }

        Ok(Arc::clone(&lowest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::TableOperation;

    fn current(version: i32) -> Revision {
        let mut tables = TableMap::new();
        tables.insert(
            "contacts".to_string(),
            vec![TableOperation::add_column("id", "INTEGER")],
        );
        Revision::new(version, Arc::new(tables))
    }

    #[test]
    fn test_current_revision_is_cached() {
        let cache = RevisionCache::new(current(10));
        assert!(cache.get(10).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_walk_caches_intermediate_revisions() {
        let cache = RevisionCache::new(current(10));
        let mut steps = Vec::new();

        let revision = cache
            .get_or_walk(7, |revision, newer| {
                steps.push(revision);
                Ok(Arc::clone(newer))
            })
            .unwrap();

        assert_eq!(revision.version(), 7);
        assert_eq!(steps, vec![9, 8, 7]);
        assert_eq!(cache.len(), 4);

        // Already walked: no further steps.
        let again = cache
            .get_or_walk(8, |_, _| panic!("revision 8 should be cached"))
            .unwrap();
        assert_eq!(again.version(), 8);
    }

    #[test]
    fn test_walk_resumes_from_lowest_cached() {
        let cache = RevisionCache::new(current(10));
        cache.get_or_walk(8, |_, newer| Ok(Arc::clone(newer))).unwrap();

        let mut steps = Vec::new();
        cache
            .get_or_walk(6, |revision, newer| {
                steps.push(revision);
                Ok(Arc::clone(newer))
            })
            .unwrap();

        assert_eq!(steps, vec![7, 6]);
    }

    #[test]
    fn test_newer_revision_is_unavailable() {
        let cache = RevisionCache::new(current(10));
        let result = cache.get_or_walk(11, |_, newer| Ok(Arc::clone(newer)));

        assert!(matches!(
            result,
            Err(SchemaError::RevisionUnavailable {
                requested: 11,
                lowest: 10
            })
        ));
    }

    #[test]
    fn test_failed_step_is_reported() {
        let cache = RevisionCache::new(current(10));
        let result = cache.get_or_walk(5, |revision, newer| {
            if revision == 8 {
                Err(SchemaError::UnknownTable {
                    table: "contacts".to_string(),
                    version: revision,
                })
            } else {
                Ok(Arc::clone(newer))
            }
        });

        assert!(result.is_err());
        assert!(cache.get(9).is_some());
        assert!(cache.get(8).is_none());
    }

    #[test]
    fn test_concurrent_walks_compute_each_revision_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache = Arc::new(RevisionCache::new(current(100)));
        let computed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let computed = Arc::clone(&computed);
                std::thread::spawn(move || {
                    cache
                        .get_or_walk(i * 5, |_, newer| {
                            computed.fetch_add(1, Ordering::SeqCst);
                            Ok(Arc::clone(newer))
                        })
                        .unwrap()
                        .version()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), i32::try_from(i).unwrap() * 5);
        }

        assert_eq!(computed.load(Ordering::SeqCst), 100);
    }
}
