//! Group-formation engine: groups assemble buyers toward a member target
//! before a deadline, unlocking a discounted price for all of them at once.
//!
//! Every state change of a group and its member orders goes through one
//! ledger operation, so a group can never be observed successful while a
//! member order is still pending.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use chrono::{DateTime, Duration, Utc};
use promo_ledger::{
    CampaignRepository, CampaignStatus, ConfirmOrderResult, Group, GroupBuyCampaign, GroupMember,
    GroupRepository, JoinGroupResult, LedgerError, NewGroup, NewGroupBuy, OpenGroupResult, Order,
    OrderRepository,
};
use tracing::{info, warn};
use uuid::Uuid;

/// A freshly opened group with its leader's pending order.
#[derive(Clone, Debug)]
pub struct OpenedGroup {
    /// The new group, holding only the leader.
    pub group: Group,

    /// The leader's pending order.
    pub order_id: Uuid,
}

/// A successful join.
#[derive(Clone, Debug)]
pub struct JoinedGroup {
    /// The joiner's pending order.
    pub order_id: Uuid,

    /// The member count after this join.
    pub member_count: u32,

    /// Whether this join brought the group to its target.
    pub completed: bool,
}

/// Group-formation engine over an injected ledger.
#[derive(Clone, Debug)]
pub struct GroupBuyEngine<L> {
    ledger: L,
}

impl<L, E> GroupBuyEngine<L>
where
    E: LedgerError,
    L: CampaignRepository<Error = E> + GroupRepository<Error = E> + OrderRepository<Error = E>,
{
    /// Creates a new `GroupBuyEngine`.
    #[must_use]
    pub const fn new(ledger: L) -> Self {
        Self { ledger }
    }

    /// Gets a campaign.
    pub async fn campaign(
        &self,
        campaign_id: Uuid,
    ) -> Result<Option<GroupBuyCampaign>, Error<E>> {
        self.ledger
            .group_buy(campaign_id)
            .await
            .map_err(Error::Ledger)
    }

    /// Creates a campaign, open for participation immediately.
    pub async fn create_campaign(
        &self,
        new: NewGroupBuy,
    ) -> Result<GroupBuyCampaign, Error<E>> {
        let campaign = self
            .ledger
            .insert_group_buy(new)
            .await
            .map_err(Error::Ledger)?;

        info!(
            "group buy {} created for {} to {} members",
            campaign.id, campaign.min_members, campaign.max_members
        );

        Ok(campaign)
    }

    /// Opens a group led by `user_id`. The leader becomes the first member
    /// and receives a pending order at the group price.
    pub async fn open(&self, campaign_id: Uuid, user_id: Uuid) -> Result<OpenedGroup, Error<E>> {
        let campaign = self
            .ledger
            .group_buy(campaign_id)
            .await
            .map_err(Error::Ledger)?
            .ok_or(Error::CampaignNotFound)?;

        if campaign.status != CampaignStatus::Active {
            return Err(Error::CampaignNotActive);
        }

        let now = Utc::now();
        let new = NewGroup {
            campaign_id,
            leader_id: user_id,
            unit_price_cents: campaign.group_price_cents,
            target_members: campaign.min_members,
            max_members: campaign.max_members,
            deadline: now + Duration::seconds(campaign.time_limit_secs),
        };

        match self
            .ledger
            .open_group(new, now)
            .await
            .map_err(Error::Ledger)?
        {
            OpenGroupResult::Opened { group, order_id } => {
                info!("group {} opened under campaign {}", group.id, campaign_id);
                Ok(OpenedGroup { group, order_id })
            }
            OpenGroupResult::AlreadyParticipating => Err(Error::AlreadyParticipating),
        }
    }

    /// Joins a user to a group. The joiner receives a pending order; when
    /// the join brings the group to its target, every member order becomes
    /// payable in the same step.
    pub async fn join(&self, group_id: Uuid, user_id: Uuid) -> Result<JoinedGroup, Error<E>> {
        match self
            .ledger
            .join_group(group_id, user_id, Utc::now())
            .await
            .map_err(Error::Ledger)?
        {
            JoinGroupResult::Joined {
                order_id,
                member_count,
                completed,
            } => {
                if completed {
                    info!("group {} completed with {} members", group_id, member_count);
                }
                Ok(JoinedGroup {
                    order_id,
                    member_count,
                    completed,
                })
            }
            JoinGroupResult::AlreadyMember => Err(Error::AlreadyMember),
            JoinGroupResult::Expired => Err(Error::GroupExpired),
            JoinGroupResult::Full => Err(Error::GroupFull),
            JoinGroupResult::NotActive => Err(Error::GroupNotActive),
            JoinGroupResult::NotFound => Err(Error::GroupNotFound),
        }
    }

    /// Confirms a member order once its group has completed.
    pub async fn confirm_order(&self, order_id: Uuid) -> Result<Order, Error<E>> {
        match self
            .ledger
            .confirm_order(order_id)
            .await
            .map_err(Error::Ledger)?
        {
            ConfirmOrderResult::Confirmed { order } => {
                info!("group buy order {} confirmed", order_id);
                Ok(order)
            }
            ConfirmOrderResult::AlreadyConfirmed => Err(Error::OrderAlreadyConfirmed),
            ConfirmOrderResult::Cancelled => Err(Error::OrderCancelled),
            ConfirmOrderResult::NotFound => Err(Error::OrderNotFound),
            ConfirmOrderResult::NotPayable => Err(Error::OrderNotPayable),
        }
    }

    /// Gets a group.
    pub async fn group(&self, group_id: Uuid) -> Result<Option<Group>, Error<E>> {
        self.ledger.group(group_id).await.map_err(Error::Ledger)
    }

    /// Gets a group's memberships in join order.
    pub async fn members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, Error<E>> {
        self.ledger.members(group_id).await.map_err(Error::Ledger)
    }

    /// Fails every group whose deadline has passed, cancelling its members'
    /// pending orders. Records are processed one at a time so a bad one
    /// cannot block the rest of the pass.
    pub async fn sweep_expired_once(&self, now: DateTime<Utc>) -> Result<(), Error<E>> {
        let due = self
            .ledger
            .expire_groups_due(now)
            .await
            .map_err(Error::Ledger)?;

        for group_id in due {
            match self.ledger.fail_group(group_id).await {
                Ok(true) => info!("group {} failed at its deadline", group_id),
                Ok(false) => {}
                Err(e) => warn!("failed to expire group {}: {}", group_id, e),
            }
        }

        Ok(())
    }
}
