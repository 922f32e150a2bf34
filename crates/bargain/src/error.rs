use promo_ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error<LE>
where
    LE: LedgerError,
{
    /// The helper has already cut this session.
    #[error("helper has already cut this session")]
    AlreadyHelped,

    /// The session already produced an order.
    #[error("session already has an order")]
    AlreadyOrdered,

    /// The campaign exists but is not open for participation.
    #[error("campaign is not active")]
    CampaignNotActive,

    /// No campaign with the requested id.
    #[error("campaign not found")]
    CampaignNotFound,

    /// The configured minimum price exceeds the original price.
    #[error("minimum price exceeds original price")]
    InvalidPriceRange,

    /// The session has not reached its floor price.
    #[error("session has not succeeded")]
    NotSuccessful,

    /// The order was already confirmed.
    #[error("order already confirmed")]
    OrderAlreadyConfirmed,

    /// The order was cancelled.
    #[error("order is cancelled")]
    OrderCancelled,

    /// No order with the requested id.
    #[error("order not found")]
    OrderNotFound,

    /// The order is not in a payable state.
    #[error("order is not payable")]
    OrderNotPayable,

    /// The user already holds an active session for this campaign.
    #[error("session already active for this campaign")]
    SessionAlreadyActive,

    /// The session reached its deadline before the floor.
    #[error("session has expired")]
    SessionExpired,

    /// The session is already terminal.
    #[error("session is not active")]
    SessionNotActive,

    /// No session with the requested id.
    #[error("session not found")]
    SessionNotFound,

    /// All permitted reductions have been used.
    #[error("no reductions left")]
    StepsExhausted,

    /// Errors passed through from the underlying ledger.
    #[error(transparent)]
    Ledger(LE),
}
