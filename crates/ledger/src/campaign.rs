use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::LedgerError;

/// Lifecycle states shared by all campaign kinds.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CampaignStatus {
    /// Created but not yet open for participation.
    Pending,

    /// Open for participation.
    Active,

    /// Closed to new participation.
    Ended,
}

/// A limited-stock discount sold inside a fixed time window.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FlashSaleCampaign {
    /// The unique identifier for the campaign.
    pub id: Uuid,

    /// The product on offer.
    pub product_id: Uuid,

    /// The discounted unit price, in cents.
    pub price_cents: i64,

    /// The stock committed to the campaign.
    pub initial_stock: u32,

    /// The maximum total quantity a single user may claim.
    pub limit_per_user: u32,

    /// When the claim window opens.
    pub starts_at: DateTime<Utc>,

    /// When the claim window closes.
    pub ends_at: DateTime<Utc>,

    /// The lifecycle state.
    pub status: CampaignStatus,
}

/// A discount unlocked by assembling enough buyers before a deadline.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GroupBuyCampaign {
    /// The unique identifier for the campaign.
    pub id: Uuid,

    /// The product on offer.
    pub product_id: Uuid,

    /// The unit price members pay when their group succeeds, in cents.
    pub group_price_cents: i64,

    /// The undiscounted unit price, in cents.
    pub original_price_cents: i64,

    /// The member count at which a group succeeds.
    pub min_members: u32,

    /// The member count a group will not admit beyond.
    pub max_members: u32,

    /// Seconds a group stays open before it fails.
    pub time_limit_secs: i64,

    /// The lifecycle state.
    pub status: CampaignStatus,
}

/// A price negotiated downward through third-party help.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BargainCampaign {
    /// The unique identifier for the campaign.
    pub id: Uuid,

    /// The product on offer.
    pub product_id: Uuid,

    /// The starting price, in cents.
    pub original_price_cents: i64,

    /// The configured lowest price, in cents. The effective floor also never
    /// goes below a fixed fraction of the original price.
    pub min_price_cents: i64,

    /// Reductions allowed per session.
    pub max_cuts: u32,

    /// Seconds a session stays open before it expires.
    pub time_limit_secs: i64,

    /// The lifecycle state.
    pub status: CampaignStatus,
}

/// Parameters for creating a flash-sale campaign.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewFlashSale {
    /// The product on offer.
    pub product_id: Uuid,

    /// The discounted unit price, in cents.
    pub price_cents: i64,

    /// The stock committed to the campaign.
    pub initial_stock: u32,

    /// The maximum total quantity a single user may claim.
    pub limit_per_user: u32,

    /// When the claim window opens.
    pub starts_at: DateTime<Utc>,

    /// When the claim window closes.
    pub ends_at: DateTime<Utc>,
}

/// Parameters for creating a group-buy campaign.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewGroupBuy {
    /// The product on offer.
    pub product_id: Uuid,

    /// The unit price members pay when their group succeeds, in cents.
    pub group_price_cents: i64,

    /// The undiscounted unit price, in cents.
    pub original_price_cents: i64,

    /// The member count at which a group succeeds.
    pub min_members: u32,

    /// The member count a group will not admit beyond.
    pub max_members: u32,

    /// Seconds a group stays open before it fails.
    pub time_limit_secs: i64,
}

/// Parameters for creating a bargain campaign.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewBargain {
    /// The product on offer.
    pub product_id: Uuid,

    /// The starting price, in cents.
    pub original_price_cents: i64,

    /// The configured lowest price, in cents.
    pub min_price_cents: i64,

    /// Reductions allowed per session.
    pub max_cuts: u32,

    /// Seconds a session stays open before it expires.
    pub time_limit_secs: i64,
}

/// Storage interface for campaign definitions and their window-driven
/// lifecycle.
#[async_trait]
pub trait CampaignRepository: Clone + Send + Sync + 'static {
    /// The error type for storage failures.
    type Error: LedgerError;

    /// Moves every pending flash-sale whose window has opened to active and
    /// returns the ids that changed. Already-active rows are untouched, so
    /// repeat sweeps are no-ops.
    async fn activate_flash_sales_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, Self::Error>;

    /// Gets a bargain campaign.
    async fn bargain(&self, id: Uuid) -> Result<Option<BargainCampaign>, Self::Error>;

    /// Moves every active flash-sale whose window has closed to ended and
    /// returns the ids that changed.
    async fn end_flash_sales_due(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, Self::Error>;

    /// Gets a flash-sale campaign.
    async fn flash_sale(&self, id: Uuid) -> Result<Option<FlashSaleCampaign>, Self::Error>;

    /// Gets a group-buy campaign.
    async fn group_buy(&self, id: Uuid) -> Result<Option<GroupBuyCampaign>, Self::Error>;

    /// Records a bargain campaign, open for participation immediately.
    async fn insert_bargain(&self, new: NewBargain) -> Result<BargainCampaign, Self::Error>;

    /// Records a flash-sale campaign in the pending state; activation is
    /// window-driven.
    async fn insert_flash_sale(&self, new: NewFlashSale)
    -> Result<FlashSaleCampaign, Self::Error>;

    /// Records a group-buy campaign, open for participation immediately.
    async fn insert_group_buy(&self, new: NewGroupBuy) -> Result<GroupBuyCampaign, Self::Error>;
}
