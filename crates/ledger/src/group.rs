use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::LedgerError;

/// Lifecycle states of a formation attempt.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum GroupStatus {
    /// Recruiting members.
    Active,

    /// Reached its target member count.
    Success,

    /// Reached its deadline without enough members.
    Failed,
}

/// A formation attempt under a group-buy campaign.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Group {
    /// The unique identifier for the group.
    pub id: Uuid,

    /// The campaign this group belongs to.
    pub campaign_id: Uuid,

    /// The user who opened the group.
    pub leader_id: Uuid,

    /// The unit price locked in for members at open time, in cents.
    pub unit_price_cents: i64,

    /// Current number of members, the leader included.
    pub member_count: u32,

    /// The member count at which the group succeeds.
    pub target_members: u32,

    /// The member count the group will not admit beyond.
    pub max_members: u32,

    /// When the group fails if the target has not been reached.
    pub deadline: DateTime<Utc>,

    /// The lifecycle state.
    pub status: GroupStatus,
}

/// A membership row in a group.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GroupMember {
    /// The group joined.
    pub group_id: Uuid,

    /// The joining user.
    pub user_id: Uuid,

    /// Whether this member opened the group.
    pub is_leader: bool,

    /// When the membership was recorded.
    pub joined_at: DateTime<Utc>,
}

/// Parameters for opening a group.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewGroup {
    /// The campaign the group belongs to.
    pub campaign_id: Uuid,

    /// The user opening the group.
    pub leader_id: Uuid,

    /// The unit price locked in for members, in cents.
    pub unit_price_cents: i64,

    /// The member count at which the group succeeds.
    pub target_members: u32,

    /// The member count the group will not admit beyond.
    pub max_members: u32,

    /// When the group fails if the target has not been reached.
    pub deadline: DateTime<Utc>,
}

/// Outcome of opening a group.
#[derive(Clone, Debug)]
pub enum OpenGroupResult {
    /// The leader already holds a membership in an active group of this
    /// campaign.
    AlreadyParticipating,

    /// The group, the leader's membership and the leader's pending order
    /// were recorded.
    Opened {
        /// The newly opened group.
        group: Group,

        /// The leader's pending order.
        order_id: Uuid,
    },
}

/// Outcome of joining a group.
#[derive(Clone, Debug)]
pub enum JoinGroupResult {
    /// The user already holds a membership in this group.
    AlreadyMember,

    /// The deadline has passed.
    Expired,

    /// The group is at capacity.
    Full,

    /// The membership and the joiner's pending order were recorded.
    Joined {
        /// The joiner's pending order.
        order_id: Uuid,

        /// The member count after this join.
        member_count: u32,

        /// Whether this join brought the group to its target.
        completed: bool,
    },

    /// The group is already terminal.
    NotActive,

    /// No group with this id.
    NotFound,
}

/// Storage interface for groups, memberships and their terminal transitions.
#[async_trait]
pub trait GroupRepository: Clone + Send + Sync + 'static {
    /// The error type for storage failures.
    type Error: LedgerError;

    /// Returns the ids of active groups whose deadline has passed. The
    /// terminal transition itself goes through [`GroupRepository::fail_group`]
    /// so one bad record cannot block the rest of a sweep.
    async fn expire_groups_due(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, Self::Error>;

    /// Moves an active group to failed and cancels its members' pending
    /// orders, all in one unit. Returns false without touching anything when
    /// the group is absent or already terminal, so repeats are no-ops.
    async fn fail_group(&self, group_id: Uuid) -> Result<bool, Self::Error>;

    /// Gets a group.
    async fn group(&self, group_id: Uuid) -> Result<Option<Group>, Self::Error>;

    /// Joins a user to a group in one unit: re-checks the group's state,
    /// deadline, capacity and the joiner's uniqueness, then records the
    /// membership, the incremented member count and the joiner's pending
    /// order. When the post-join count reaches the target the group moves to
    /// success and every member order moves from pending to awaiting payment
    /// inside the same unit.
    async fn join_group(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<JoinGroupResult, Self::Error>;

    /// Gets a group's memberships in join order.
    async fn members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, Self::Error>;

    /// Opens a group in one unit: rejects a leader who already holds a
    /// membership in an active group of the campaign, then records the group,
    /// the leader's membership and the leader's pending order.
    async fn open_group(
        &self,
        new: NewGroup,
        now: DateTime<Utc>,
    ) -> Result<OpenGroupResult, Self::Error>;
}
