use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::LedgerError;

/// Lifecycle states of a negotiation session.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SessionStatus {
    /// Accepting reductions.
    Active,

    /// Reached the floor price.
    Success,

    /// Reached its deadline before the floor.
    Expired,
}

/// A user's price-negotiation session under a bargain campaign.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BargainSession {
    /// The unique identifier for the session.
    pub id: Uuid,

    /// The campaign this session belongs to.
    pub campaign_id: Uuid,

    /// The user negotiating.
    pub user_id: Uuid,

    /// The price the session started at, in cents.
    pub original_price_cents: i64,

    /// The current price, in cents. Never below the floor.
    pub current_price_cents: i64,

    /// The lowest reachable price, in cents.
    pub floor_price_cents: i64,

    /// Reductions applied so far.
    pub cuts_used: u32,

    /// Reductions allowed in total.
    pub max_cuts: u32,

    /// When the session expires if the floor has not been reached.
    pub deadline: DateTime<Utc>,

    /// The lifecycle state.
    pub status: SessionStatus,
}

/// A single recorded price reduction.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BargainCut {
    /// The session reduced.
    pub session_id: Uuid,

    /// The user who helped. At most one cut per helper per session.
    pub helper_id: Uuid,

    /// The amount removed from the price, in cents.
    pub amount_cents: i64,

    /// When the reduction was recorded.
    pub cut_at: DateTime<Utc>,
}

/// Parameters for starting a session.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewSession {
    /// The campaign the session belongs to.
    pub campaign_id: Uuid,

    /// The user negotiating.
    pub user_id: Uuid,

    /// The starting price, in cents.
    pub original_price_cents: i64,

    /// The lowest reachable price, in cents.
    pub floor_price_cents: i64,

    /// Reductions allowed in total.
    pub max_cuts: u32,

    /// When the session expires.
    pub deadline: DateTime<Utc>,
}

/// Outcome of starting a session.
#[derive(Clone, Debug)]
pub enum StartSessionResult {
    /// The user already holds an active session for this campaign.
    AlreadyActive,

    /// The session was recorded.
    Started {
        /// The newly started session.
        session: BargainSession,
    },
}

/// Outcome of applying a reduction.
#[derive(Clone, Debug)]
pub enum ReduceSessionResult {
    /// The helper has already cut this session.
    AlreadyHelped,

    /// The deadline had passed; the session was moved to expired.
    Expired,

    /// The session is already terminal.
    NotActive,

    /// No session with this id.
    NotFound,

    /// All permitted reductions have been used.
    QuotaExhausted,

    /// The reduction was applied.
    Reduced {
        /// The amount removed from the price, in cents.
        amount_cents: i64,

        /// The price after this reduction, in cents.
        new_price_cents: i64,

        /// Reductions still permitted.
        remaining_cuts: u32,

        /// Whether this reduction brought the price to the floor.
        is_success: bool,
    },
}

/// Storage interface for negotiation sessions and their reduction log.
#[async_trait]
pub trait SessionRepository: Clone + Send + Sync + 'static {
    /// The error type for storage failures.
    type Error: LedgerError;

    /// Gets a session's reductions in application order.
    async fn cuts(&self, session_id: Uuid) -> Result<Vec<BargainCut>, Self::Error>;

    /// Moves an active session to expired. Returns false without touching
    /// anything when the session is absent or already terminal, so repeats
    /// are no-ops.
    async fn expire_session(&self, session_id: Uuid) -> Result<bool, Self::Error>;

    /// Returns the ids of active sessions whose deadline has passed. The
    /// terminal transition itself goes through
    /// [`SessionRepository::expire_session`].
    async fn expire_sessions_due(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, Self::Error>;

    /// Applies one reduction in one unit: re-checks the session's state,
    /// deadline, quota and the helper's uniqueness, then records the cut,
    /// the new price and the incremented use count. The applied amount is
    /// the hint clamped to the gap above the floor, except on the final
    /// permitted reduction where it becomes the whole remaining gap so the
    /// floor is always reached at quota exhaustion. A session that reaches
    /// the floor moves to success inside the same unit.
    ///
    /// A session found past its deadline is moved to expired and reported as
    /// such.
    async fn reduce_session(
        &self,
        session_id: Uuid,
        helper_id: Uuid,
        amount_hint_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<ReduceSessionResult, Self::Error>;

    /// Gets a session.
    async fn session(&self, session_id: Uuid) -> Result<Option<BargainSession>, Self::Error>;

    /// Starts a session in one unit, rejecting a user who already holds an
    /// active session for the campaign.
    async fn start_session(&self, new: NewSession) -> Result<StartSessionResult, Self::Error>;
}
