use dispatch_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Store unavailable while loading {resource}: {source}")]
    StoreUnavailable {
        resource: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Allocation already in progress; gave up after {0} seconds")]
    Busy(u64),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
