//! Engine surface: records, queries and eager-load plans, the storage
//! contract, executors, and the session that routes between them.

pub mod executor;
pub mod query;
pub mod record;
pub mod session;
pub mod storage;

// re-exports
pub use executor::{
    CancelToken, Cascade, Hydrator, NodeOutcome, NodeReport, PersistenceWalker, QueryResolver,
    SaveOptions, SaveOutcome, SaveReport,
};
pub use query::{EagerLoadPlan, EagerLoadSpec, FindMode, PlanNode, Query};
pub use record::{Record, RecordSet, RelationSlot};
pub use session::{DbSession, FindResult, SessionOptions};
pub use storage::{
    JoinRow, MemoryStorage, Row, StorageConnection, StorageError, StorageOp, TransactionScope,
};
