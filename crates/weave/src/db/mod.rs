mod session;

pub use session::DbSession;
pub use weave_core::db::{
    CancelToken, FindResult, MemoryStorage, NodeOutcome, NodeReport, SaveOptions, SaveOutcome,
    SaveReport, SessionOptions, StorageConnection, StorageError, TransactionScope,
};
