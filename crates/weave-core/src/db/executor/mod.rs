mod cancel;
mod context;
mod hydrate;
mod load;
mod mutate;
mod save;

#[cfg(test)]
mod tests;

// re-exports
pub use cancel::CancelToken;
pub use hydrate::{Correspondence, Hydrator};
pub use load::QueryResolver;
pub use mutate::MutationExecutor;
pub use save::{
    Cascade, CascadePaths, JoinDelta, NodeOutcome, NodeReport, PersistenceWalker, SaveOptions,
    SaveOutcome, SaveReport,
};
