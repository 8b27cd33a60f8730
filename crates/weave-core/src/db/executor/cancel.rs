use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

///
/// CancelToken
///
/// Cooperative cancellation flag shared between a caller and a running
/// find or save. Executors check it before each storage call.
///

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
