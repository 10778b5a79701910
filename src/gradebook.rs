use crate::assessor::Assessor;
use crate::catalog::Catalog;
use crate::db::{DbPool, PooledConn};
use crate::error::GradingResult;
use crate::locks::SubmissionLocks;
use std::sync::Arc;

/// Shared handle over the workspace database and the two collaborators.
/// Cheap to share between worker threads behind an `Arc`.
pub struct Gradebook {
    pool: DbPool,
    catalog: Arc<dyn Catalog>,
    assessor: Arc<dyn Assessor>,
    locks: SubmissionLocks,
}

impl Gradebook {
    pub fn new(pool: DbPool, catalog: Arc<dyn Catalog>, assessor: Arc<dyn Assessor>) -> Self {
        Self {
            pool,
            catalog,
            assessor,
            locks: SubmissionLocks::new(),
        }
    }

    pub fn conn(&self) -> GradingResult<PooledConn> {
        Ok(self.pool.get()?)
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    pub fn assessor(&self) -> &dyn Assessor {
        self.assessor.as_ref()
    }

    pub fn locks(&self) -> &SubmissionLocks {
        &self.locks
    }
}
