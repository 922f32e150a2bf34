//! In-memory (single node) implementation of the campaign ledger for local
//! development and tests.
//!
//! All tables live behind one mutex and every repository operation takes it
//! exactly once, which makes each operation a serializable transaction.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use promo_ledger::{
    BargainCampaign, BargainCut, BargainSession, CampaignRepository, CampaignStatus,
    ConfirmOrderResult, FlashSaleCampaign, Group, GroupBuyCampaign, GroupMember, GroupRepository,
    GroupStatus, InsertBargainOrderResult, InsertFlashOrderResult, JoinGroupResult, NewBargain,
    NewBargainOrder, NewFlashOrder, NewFlashSale, NewGroup, NewGroupBuy, NewSession,
    OpenGroupResult, Order, OrderRepository, OrderSource, OrderStatus, ReduceSessionResult,
    SessionRepository, SessionStatus, StartSessionResult,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct LedgerState {
    flash_sales: HashMap<Uuid, FlashSaleCampaign>,
    group_buys: HashMap<Uuid, GroupBuyCampaign>,
    bargains: HashMap<Uuid, BargainCampaign>,
    groups: HashMap<Uuid, Group>,
    group_members: Vec<GroupMember>,
    sessions: HashMap<Uuid, BargainSession>,
    cuts: Vec<BargainCut>,
    orders: Vec<Order>,
}

impl LedgerState {
    fn order_mut(&mut self, order_id: Uuid) -> Option<&mut Order> {
        self.orders.iter_mut().find(|order| order.id == order_id)
    }

    fn flash_quantity(&self, campaign_id: Uuid, user_id: Uuid) -> u32 {
        self.orders
            .iter()
            .filter(|order| {
                order.user_id == user_id
                    && order.status != OrderStatus::Cancelled
                    && matches!(
                        order.source,
                        OrderSource::FlashSale { campaign_id: c } if c == campaign_id
                    )
            })
            .map(|order| order.quantity)
            .sum()
    }
}

/// In-memory campaign ledger.
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    /// Creates a new `MemoryLedger`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }
}

#[async_trait]
impl CampaignRepository for MemoryLedger {
    type Error = Error;

    async fn activate_flash_sales_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, Self::Error> {
        let mut state = self.state.lock().await;

        let mut activated = Vec::new();
        for campaign in state.flash_sales.values_mut() {
            if campaign.status == CampaignStatus::Pending && campaign.starts_at <= now {
                campaign.status = CampaignStatus::Active;
                activated.push(campaign.id);
            }
        }

        Ok(activated)
    }

    async fn bargain(&self, id: Uuid) -> Result<Option<BargainCampaign>, Self::Error> {
        Ok(self.state.lock().await.bargains.get(&id).cloned())
    }

    async fn end_flash_sales_due(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, Self::Error> {
        let mut state = self.state.lock().await;

        let mut ended = Vec::new();
        for campaign in state.flash_sales.values_mut() {
            if campaign.status == CampaignStatus::Active && campaign.ends_at <= now {
                campaign.status = CampaignStatus::Ended;
                ended.push(campaign.id);
            }
        }

        Ok(ended)
    }

    async fn flash_sale(&self, id: Uuid) -> Result<Option<FlashSaleCampaign>, Self::Error> {
        Ok(self.state.lock().await.flash_sales.get(&id).cloned())
    }

    async fn group_buy(&self, id: Uuid) -> Result<Option<GroupBuyCampaign>, Self::Error> {
        Ok(self.state.lock().await.group_buys.get(&id).cloned())
    }

    async fn insert_bargain(&self, new: NewBargain) -> Result<BargainCampaign, Self::Error> {
        let campaign = BargainCampaign {
            id: Uuid::new_v4(),
            product_id: new.product_id,
            original_price_cents: new.original_price_cents,
            min_price_cents: new.min_price_cents,
            max_cuts: new.max_cuts,
            time_limit_secs: new.time_limit_secs,
            status: CampaignStatus::Active,
        };
        self.state
            .lock()
            .await
            .bargains
            .insert(campaign.id, campaign.clone());

        Ok(campaign)
    }

    async fn insert_flash_sale(
        &self,
        new: NewFlashSale,
    ) -> Result<FlashSaleCampaign, Self::Error> {
        let campaign = FlashSaleCampaign {
            id: Uuid::new_v4(),
            product_id: new.product_id,
            price_cents: new.price_cents,
            initial_stock: new.initial_stock,
            limit_per_user: new.limit_per_user,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            status: CampaignStatus::Pending,
        };
        self.state
            .lock()
            .await
            .flash_sales
            .insert(campaign.id, campaign.clone());

        Ok(campaign)
    }

    async fn insert_group_buy(&self, new: NewGroupBuy) -> Result<GroupBuyCampaign, Self::Error> {
        let campaign = GroupBuyCampaign {
            id: Uuid::new_v4(),
            product_id: new.product_id,
            group_price_cents: new.group_price_cents,
            original_price_cents: new.original_price_cents,
            min_members: new.min_members,
            max_members: new.max_members,
            time_limit_secs: new.time_limit_secs,
            status: CampaignStatus::Active,
        };
        self.state
            .lock()
            .await
            .group_buys
            .insert(campaign.id, campaign.clone());

        Ok(campaign)
    }
}

#[async_trait]
impl GroupRepository for MemoryLedger {
    type Error = Error;

    async fn expire_groups_due(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, Self::Error> {
        let state = self.state.lock().await;

        Ok(state
            .groups
            .values()
            .filter(|group| group.status == GroupStatus::Active && group.deadline < now)
            .map(|group| group.id)
            .collect())
    }

    async fn fail_group(&self, group_id: Uuid) -> Result<bool, Self::Error> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(group) = state.groups.get_mut(&group_id) else {
            return Ok(false);
        };
        if group.status != GroupStatus::Active {
            return Ok(false);
        }
        group.status = GroupStatus::Failed;

        for order in &mut state.orders {
            if order.status == OrderStatus::Pending
                && matches!(order.source, OrderSource::GroupBuy { group_id: g, .. } if g == group_id)
            {
                order.status = OrderStatus::Cancelled;
            }
        }

        Ok(true)
    }

    async fn group(&self, group_id: Uuid) -> Result<Option<Group>, Self::Error> {
        Ok(self.state.lock().await.groups.get(&group_id).cloned())
    }

    async fn join_group(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<JoinGroupResult, Self::Error> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(group) = state.groups.get_mut(&group_id) else {
            return Ok(JoinGroupResult::NotFound);
        };
        if group.status != GroupStatus::Active {
            return Ok(JoinGroupResult::NotActive);
        }
        if group.deadline < now {
            return Ok(JoinGroupResult::Expired);
        }
        if group.member_count >= group.max_members {
            return Ok(JoinGroupResult::Full);
        }
        if state
            .group_members
            .iter()
            .any(|member| member.group_id == group_id && member.user_id == user_id)
        {
            return Ok(JoinGroupResult::AlreadyMember);
        }

        state.group_members.push(GroupMember {
            group_id,
            user_id,
            is_leader: false,
            joined_at: now,
        });
        group.member_count += 1;

        let order = Order {
            id: Uuid::new_v4(),
            user_id,
            source: OrderSource::GroupBuy {
                campaign_id: group.campaign_id,
                group_id,
            },
            quantity: 1,
            unit_price_cents: group.unit_price_cents,
            total_cents: group.unit_price_cents,
            status: OrderStatus::Pending,
            created_at: now,
        };
        let order_id = order.id;
        state.orders.push(order);

        // Completion check runs on the post-join count, inside the same unit
        let completed = group.member_count >= group.target_members;
        if completed {
            group.status = GroupStatus::Success;
            for order in &mut state.orders {
                if order.status == OrderStatus::Pending
                    && matches!(
                        order.source,
                        OrderSource::GroupBuy { group_id: g, .. } if g == group_id
                    )
                {
                    order.status = OrderStatus::AwaitingPayment;
                }
            }
        }

        Ok(JoinGroupResult::Joined {
            order_id,
            member_count: group.member_count,
            completed,
        })
    }

    async fn members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, Self::Error> {
        let state = self.state.lock().await;

        Ok(state
            .group_members
            .iter()
            .filter(|member| member.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn open_group(
        &self,
        new: NewGroup,
        now: DateTime<Utc>,
    ) -> Result<OpenGroupResult, Self::Error> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let participating = state.group_members.iter().any(|member| {
            member.user_id == new.leader_id
                && state.groups.get(&member.group_id).is_some_and(|group| {
                    group.campaign_id == new.campaign_id && group.status == GroupStatus::Active
                })
        });
        if participating {
            return Ok(OpenGroupResult::AlreadyParticipating);
        }

        let group = Group {
            id: Uuid::new_v4(),
            campaign_id: new.campaign_id,
            leader_id: new.leader_id,
            unit_price_cents: new.unit_price_cents,
            member_count: 1,
            target_members: new.target_members,
            max_members: new.max_members,
            deadline: new.deadline,
            status: GroupStatus::Active,
        };
        state.group_members.push(GroupMember {
            group_id: group.id,
            user_id: new.leader_id,
            is_leader: true,
            joined_at: now,
        });

        let order = Order {
            id: Uuid::new_v4(),
            user_id: new.leader_id,
            source: OrderSource::GroupBuy {
                campaign_id: new.campaign_id,
                group_id: group.id,
            },
            quantity: 1,
            unit_price_cents: new.unit_price_cents,
            total_cents: new.unit_price_cents,
            status: OrderStatus::Pending,
            created_at: now,
        };
        let order_id = order.id;
        state.orders.push(order);
        state.groups.insert(group.id, group.clone());

        Ok(OpenGroupResult::Opened { group, order_id })
    }
}

#[async_trait]
impl SessionRepository for MemoryLedger {
    type Error = Error;

    async fn cuts(&self, session_id: Uuid) -> Result<Vec<BargainCut>, Self::Error> {
        let state = self.state.lock().await;

        Ok(state
            .cuts
            .iter()
            .filter(|cut| cut.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn expire_session(&self, session_id: Uuid) -> Result<bool, Self::Error> {
        let mut state = self.state.lock().await;

        let Some(session) = state.sessions.get_mut(&session_id) else {
            return Ok(false);
        };
        if session.status != SessionStatus::Active {
            return Ok(false);
        }
        session.status = SessionStatus::Expired;

        Ok(true)
    }

    async fn expire_sessions_due(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, Self::Error> {
        let state = self.state.lock().await;

        Ok(state
            .sessions
            .values()
            .filter(|session| session.status == SessionStatus::Active && session.deadline < now)
            .map(|session| session.id)
            .collect())
    }

    async fn reduce_session(
        &self,
        session_id: Uuid,
        helper_id: Uuid,
        amount_hint_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<ReduceSessionResult, Self::Error> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(session) = state.sessions.get_mut(&session_id) else {
            return Ok(ReduceSessionResult::NotFound);
        };
        if session.status != SessionStatus::Active {
            return Ok(ReduceSessionResult::NotActive);
        }
        if session.deadline < now {
            session.status = SessionStatus::Expired;
            return Ok(ReduceSessionResult::Expired);
        }
        if session.cuts_used >= session.max_cuts {
            return Ok(ReduceSessionResult::QuotaExhausted);
        }
        if state
            .cuts
            .iter()
            .any(|cut| cut.session_id == session_id && cut.helper_id == helper_id)
        {
            return Ok(ReduceSessionResult::AlreadyHelped);
        }

        // The final permitted reduction takes the whole remaining gap so the
        // floor is reached exactly at quota exhaustion. A price already at or
        // below the floor leaves nothing to cut.
        let gap = (session.current_price_cents - session.floor_price_cents).max(0);
        let amount = if session.cuts_used + 1 >= session.max_cuts {
            gap
        } else {
            amount_hint_cents.clamp(0, gap)
        };

        session.current_price_cents -= amount;
        session.cuts_used += 1;
        state.cuts.push(BargainCut {
            session_id,
            helper_id,
            amount_cents: amount,
            cut_at: now,
        });

        let is_success = session.current_price_cents <= session.floor_price_cents;
        if is_success {
            session.status = SessionStatus::Success;
        }

        Ok(ReduceSessionResult::Reduced {
            amount_cents: amount,
            new_price_cents: session.current_price_cents,
            remaining_cuts: session.max_cuts - session.cuts_used,
            is_success,
        })
    }

    async fn session(&self, session_id: Uuid) -> Result<Option<BargainSession>, Self::Error> {
        Ok(self.state.lock().await.sessions.get(&session_id).cloned())
    }

    async fn start_session(&self, new: NewSession) -> Result<StartSessionResult, Self::Error> {
        let mut state = self.state.lock().await;

        let active_exists = state.sessions.values().any(|session| {
            session.user_id == new.user_id
                && session.campaign_id == new.campaign_id
                && session.status == SessionStatus::Active
        });
        if active_exists {
            return Ok(StartSessionResult::AlreadyActive);
        }

        let session = BargainSession {
            id: Uuid::new_v4(),
            campaign_id: new.campaign_id,
            user_id: new.user_id,
            original_price_cents: new.original_price_cents,
            current_price_cents: new.original_price_cents,
            floor_price_cents: new.floor_price_cents,
            cuts_used: 0,
            max_cuts: new.max_cuts,
            deadline: new.deadline,
            status: SessionStatus::Active,
        };
        state.sessions.insert(session.id, session.clone());

        Ok(StartSessionResult::Started { session })
    }
}

#[async_trait]
impl OrderRepository for MemoryLedger {
    type Error = Error;

    async fn cancel_order_if_pending(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Order>, Self::Error> {
        let mut state = self.state.lock().await;

        let Some(order) = state.order_mut(order_id) else {
            return Ok(None);
        };
        if order.status != OrderStatus::Pending {
            return Ok(None);
        }
        order.status = OrderStatus::Cancelled;

        Ok(Some(order.clone()))
    }

    async fn confirm_order(&self, order_id: Uuid) -> Result<ConfirmOrderResult, Self::Error> {
        let mut state = self.state.lock().await;

        let Some(order) = state.order_mut(order_id) else {
            return Ok(ConfirmOrderResult::NotFound);
        };
        let payable = matches!(
            (&order.source, order.status),
            (OrderSource::GroupBuy { .. }, OrderStatus::AwaitingPayment)
                | (
                    OrderSource::FlashSale { .. } | OrderSource::Bargain { .. },
                    OrderStatus::Pending,
                )
        );
        match order.status {
            OrderStatus::Confirmed => Ok(ConfirmOrderResult::AlreadyConfirmed),
            OrderStatus::Cancelled => Ok(ConfirmOrderResult::Cancelled),
            _ if payable => {
                order.status = OrderStatus::Confirmed;
                Ok(ConfirmOrderResult::Confirmed {
                    order: order.clone(),
                })
            }
            _ => Ok(ConfirmOrderResult::NotPayable),
        }
    }

    async fn flash_orders(&self, campaign_id: Uuid) -> Result<Vec<Order>, Self::Error> {
        let state = self.state.lock().await;

        Ok(state
            .orders
            .iter()
            .filter(|order| {
                matches!(
                    order.source,
                    OrderSource::FlashSale { campaign_id: c } if c == campaign_id
                )
            })
            .cloned()
            .collect())
    }

    async fn insert_bargain_order(
        &self,
        new: NewBargainOrder,
        now: DateTime<Utc>,
    ) -> Result<InsertBargainOrderResult, Self::Error> {
        let mut state = self.state.lock().await;

        let already_ordered = state.orders.iter().any(|order| {
            matches!(
                order.source,
                OrderSource::Bargain { session_id: s, .. } if s == new.session_id
            )
        });
        if already_ordered {
            return Ok(InsertBargainOrderResult::AlreadyOrdered);
        }

        let order = Order {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            source: OrderSource::Bargain {
                campaign_id: new.campaign_id,
                session_id: new.session_id,
            },
            quantity: 1,
            unit_price_cents: new.unit_price_cents,
            total_cents: new.unit_price_cents,
            status: OrderStatus::Pending,
            created_at: now,
        };
        state.orders.push(order.clone());

        Ok(InsertBargainOrderResult::Inserted { order })
    }

    async fn insert_flash_order(
        &self,
        new: NewFlashOrder,
        now: DateTime<Utc>,
    ) -> Result<InsertFlashOrderResult, Self::Error> {
        let mut state = self.state.lock().await;

        // The authoritative per-user limit check lives inside the insert so
        // concurrent claims serialize on it
        let claimed = state.flash_quantity(new.campaign_id, new.user_id);
        if u64::from(claimed) + u64::from(new.quantity) > u64::from(new.limit_per_user) {
            return Ok(InsertFlashOrderResult::LimitExceeded);
        }

        let order = Order {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            source: OrderSource::FlashSale {
                campaign_id: new.campaign_id,
            },
            quantity: new.quantity,
            unit_price_cents: new.unit_price_cents,
            total_cents: new.unit_price_cents * i64::from(new.quantity),
            status: OrderStatus::Pending,
            created_at: now,
        };
        state.orders.push(order.clone());

        Ok(InsertFlashOrderResult::Inserted { order })
    }

    async fn order(&self, order_id: Uuid) -> Result<Option<Order>, Self::Error> {
        let state = self.state.lock().await;

        Ok(state
            .orders
            .iter()
            .find(|order| order.id == order_id)
            .cloned())
    }

    async fn pending_bargain_orders_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, Self::Error> {
        let state = self.state.lock().await;

        Ok(state
            .orders
            .iter()
            .filter(|order| {
                order.status == OrderStatus::Pending
                    && order.created_at <= cutoff
                    && matches!(order.source, OrderSource::Bargain { .. })
            })
            .cloned()
            .collect())
    }

    async fn pending_flash_orders_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, Self::Error> {
        let state = self.state.lock().await;

        Ok(state
            .orders
            .iter()
            .filter(|order| {
                order.status == OrderStatus::Pending
                    && order.created_at <= cutoff
                    && matches!(order.source, OrderSource::FlashSale { .. })
            })
            .cloned()
            .collect())
    }

    async fn user_flash_quantity(
        &self,
        campaign_id: Uuid,
        user_id: Uuid,
    ) -> Result<u32, Self::Error> {
        Ok(self
            .state
            .lock()
            .await
            .flash_quantity(campaign_id, user_id))
    }
}
