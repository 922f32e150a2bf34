use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::LedgerError;

/// Lifecycle states of an order.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum OrderStatus {
    /// Holding a claim; not yet payable.
    Pending,

    /// Payable. Group orders enter this state when their group completes.
    AwaitingPayment,

    /// Paid for. Terminal.
    Confirmed,

    /// Released. Terminal.
    Cancelled,
}

/// The campaign mechanism an order came from.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum OrderSource {
    /// Created from a successful bargain session.
    Bargain {
        /// The campaign negotiated under.
        campaign_id: Uuid,

        /// The session that reached its floor.
        session_id: Uuid,
    },

    /// Claimed from flash-sale stock.
    FlashSale {
        /// The campaign claimed from.
        campaign_id: Uuid,
    },

    /// Created by opening or joining a group.
    GroupBuy {
        /// The campaign the group belongs to.
        campaign_id: Uuid,

        /// The group the buyer belongs to.
        group_id: Uuid,
    },
}

/// A purchase record produced by one of the campaign engines.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Order {
    /// The unique identifier for the order.
    pub id: Uuid,

    /// The buying user.
    pub user_id: Uuid,

    /// The campaign mechanism the order came from.
    pub source: OrderSource,

    /// Units bought.
    pub quantity: u32,

    /// The unit price, in cents.
    pub unit_price_cents: i64,

    /// The order total, in cents.
    pub total_cents: i64,

    /// The lifecycle state.
    pub status: OrderStatus,

    /// When the order was recorded.
    pub created_at: DateTime<Utc>,
}

/// Parameters for recording a flash-sale order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewFlashOrder {
    /// The campaign claimed from.
    pub campaign_id: Uuid,

    /// The buying user.
    pub user_id: Uuid,

    /// Units claimed.
    pub quantity: u32,

    /// The unit price, in cents.
    pub unit_price_cents: i64,

    /// The campaign's per-user quantity limit, re-checked inside the insert.
    pub limit_per_user: u32,
}

/// Outcome of recording a flash-sale order.
#[derive(Clone, Debug)]
pub enum InsertFlashOrderResult {
    /// The order was recorded in the pending state.
    Inserted {
        /// The new order.
        order: Order,
    },

    /// The user's non-cancelled quantity would exceed the per-user limit.
    LimitExceeded,
}

/// Parameters for recording a bargain order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewBargainOrder {
    /// The campaign negotiated under.
    pub campaign_id: Uuid,

    /// The session that reached its floor.
    pub session_id: Uuid,

    /// The buying user.
    pub user_id: Uuid,

    /// The negotiated unit price, in cents.
    pub unit_price_cents: i64,
}

/// Outcome of recording a bargain order.
#[derive(Clone, Debug)]
pub enum InsertBargainOrderResult {
    /// An order for this session already exists.
    AlreadyOrdered,

    /// The order was recorded in the pending state.
    Inserted {
        /// The new order.
        order: Order,
    },
}

/// Outcome of confirming an order.
#[derive(Clone, Debug)]
pub enum ConfirmOrderResult {
    /// The order was already confirmed.
    AlreadyConfirmed,

    /// The order was cancelled.
    Cancelled,

    /// The order moved to confirmed.
    Confirmed {
        /// The confirmed order.
        order: Order,
    },

    /// No order with this id.
    NotFound,

    /// The order is not payable yet. A group order stays pending until its
    /// group completes.
    NotPayable,
}

/// Storage interface for orders across all campaign mechanisms.
#[async_trait]
pub trait OrderRepository: Clone + Send + Sync + 'static {
    /// The error type for storage failures.
    type Error: LedgerError;

    /// Moves a pending order to cancelled and returns it. Returns `None`
    /// without touching anything when the order is absent or not pending, so
    /// a caller releasing held resources does so at most once.
    async fn cancel_order_if_pending(&self, order_id: Uuid) -> Result<Option<Order>, Self::Error>;

    /// Moves a payable order to confirmed. Flash-sale and bargain orders
    /// confirm from pending; group orders confirm from awaiting payment.
    async fn confirm_order(&self, order_id: Uuid) -> Result<ConfirmOrderResult, Self::Error>;

    /// Gets every order claimed from a flash-sale campaign, in creation
    /// order.
    async fn flash_orders(&self, campaign_id: Uuid) -> Result<Vec<Order>, Self::Error>;

    /// Records a bargain order in one unit, rejecting a session that already
    /// has one.
    async fn insert_bargain_order(
        &self,
        new: NewBargainOrder,
        now: DateTime<Utc>,
    ) -> Result<InsertBargainOrderResult, Self::Error>;

    /// Records a flash-sale order in one unit, re-checking that the user's
    /// total non-cancelled quantity for the campaign stays within the
    /// per-user limit. Concurrent claims serialize here.
    async fn insert_flash_order(
        &self,
        new: NewFlashOrder,
        now: DateTime<Utc>,
    ) -> Result<InsertFlashOrderResult, Self::Error>;

    /// Gets an order.
    async fn order(&self, order_id: Uuid) -> Result<Option<Order>, Self::Error>;

    /// Gets pending bargain orders created at or before the cutoff.
    async fn pending_bargain_orders_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, Self::Error>;

    /// Gets pending flash-sale orders created at or before the cutoff.
    async fn pending_flash_orders_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, Self::Error>;

    /// Sums a user's non-cancelled quantity for a flash-sale campaign.
    async fn user_flash_quantity(
        &self,
        campaign_id: Uuid,
        user_id: Uuid,
    ) -> Result<u32, Self::Error>;
}
