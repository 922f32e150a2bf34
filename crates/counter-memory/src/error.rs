use promo_counter::CounterStoreError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
#[error("Counter store error")]
pub struct Error;

impl CounterStoreError for Error {}
