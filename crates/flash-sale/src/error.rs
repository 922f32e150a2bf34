use promo_counter::CounterStoreError;
use promo_ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error<CE, LE>
where
    CE: CounterStoreError,
    LE: LedgerError,
{
    /// The campaign exists but is not open for claims.
    #[error("campaign is not active")]
    CampaignNotActive,

    /// No campaign with the requested id.
    #[error("campaign not found")]
    CampaignNotFound,

    /// The requested quantity was zero.
    #[error("invalid quantity")]
    InvalidQuantity,

    /// The claim would push the user past the per-user limit.
    #[error("per-user limit exceeded")]
    LimitExceeded,

    /// The order was already confirmed.
    #[error("order already confirmed")]
    OrderAlreadyConfirmed,

    /// The order was cancelled.
    #[error("order is cancelled")]
    OrderCancelled,

    /// The order is no longer pending.
    #[error("order is not cancellable")]
    OrderNotCancellable,

    /// No order with the requested id.
    #[error("order not found")]
    OrderNotFound,

    /// The order is not in a payable state.
    #[error("order is not payable")]
    OrderNotPayable,

    /// The campaign has no stock left for the requested quantity.
    #[error("out of stock")]
    OutOfStock,

    /// The current time is outside the campaign window.
    #[error("outside campaign window")]
    OutOfWindow,

    /// Errors passed through from the underlying counter store.
    #[error(transparent)]
    Counter(CE),

    /// Errors passed through from the underlying ledger.
    #[error(transparent)]
    Ledger(LE),
}
