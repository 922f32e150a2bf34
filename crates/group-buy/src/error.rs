use promo_ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error<LE>
where
    LE: LedgerError,
{
    /// The user already holds a membership in this group.
    #[error("already a member of this group")]
    AlreadyMember,

    /// The user already holds a membership in an active group of this
    /// campaign.
    #[error("already participating in this campaign")]
    AlreadyParticipating,

    /// The campaign exists but is not open for participation.
    #[error("campaign is not active")]
    CampaignNotActive,

    /// No campaign with the requested id.
    #[error("campaign not found")]
    CampaignNotFound,

    /// The group's deadline has passed.
    #[error("group has expired")]
    GroupExpired,

    /// The group is at capacity.
    #[error("group is full")]
    GroupFull,

    /// The group is already terminal.
    #[error("group is not active")]
    GroupNotActive,

    /// No group with the requested id.
    #[error("group not found")]
    GroupNotFound,

    /// The order was already confirmed.
    #[error("order already confirmed")]
    OrderAlreadyConfirmed,

    /// The order was cancelled.
    #[error("order is cancelled")]
    OrderCancelled,

    /// No order with the requested id.
    #[error("order not found")]
    OrderNotFound,

    /// The order is not payable until its group completes.
    #[error("order is not payable")]
    OrderNotPayable,

    /// Errors passed through from the underlying ledger.
    #[error(transparent)]
    Ledger(LE),
}
