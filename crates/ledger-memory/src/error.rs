use promo_ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
#[error("Ledger error")]
pub struct Error;

impl LedgerError for Error {}
