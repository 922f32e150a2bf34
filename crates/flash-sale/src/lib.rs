//! Flash-sale engine: high-contention stock claims against a fast counter
//! store, with the durable order ledger as the source of truth.
//!
//! Stock for a campaign lives in a single counter key, decremented first on
//! every claim; a negative result means the claim lost and the decrement is
//! compensated. The per-user limit gets a cheap precheck before stock is
//! touched and an authoritative re-check inside the order insert.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::time::Duration;

use chrono::{DateTime, Utc};
use promo_counter::CounterStore;
use promo_ledger::{
    CampaignRepository, CampaignStatus, ConfirmOrderResult, FlashSaleCampaign,
    InsertFlashOrderResult, LedgerError, NewFlashOrder, NewFlashSale, Order, OrderRepository,
    OrderSource,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for the flash-sale engine.
#[derive(Clone, Debug)]
pub struct FlashSaleConfig {
    /// How long an unpaid claim holds its stock.
    pub reservation_window: Duration,
}

impl Default for FlashSaleConfig {
    fn default() -> Self {
        Self {
            reservation_window: Duration::from_secs(15 * 60),
        }
    }
}

/// A successful claim.
#[derive(Clone, Debug)]
pub struct Claim {
    /// The pending order holding the claimed stock.
    pub order: Order,

    /// When the unpaid claim lapses.
    pub reserved_until: DateTime<Utc>,
}

fn stock_key(campaign_id: Uuid) -> String {
    format!("flash_sale:stock:{campaign_id}")
}

fn reservation_key(order_id: Uuid) -> String {
    format!("flash_sale:reservation:{order_id}")
}

/// Flash-sale engine over an injected counter store and ledger.
#[derive(Clone, Debug)]
pub struct FlashSaleEngine<C, L> {
    counter: C,
    ledger: L,
    config: FlashSaleConfig,
}

impl<C, L, E> FlashSaleEngine<C, L>
where
    C: CounterStore,
    E: LedgerError,
    L: CampaignRepository<Error = E> + OrderRepository<Error = E>,
{
    /// Creates a new `FlashSaleEngine`.
    #[must_use]
    pub const fn new(counter: C, ledger: L, config: FlashSaleConfig) -> Self {
        Self {
            counter,
            ledger,
            config,
        }
    }

    /// Gets a campaign.
    pub async fn campaign(
        &self,
        campaign_id: Uuid,
    ) -> Result<Option<FlashSaleCampaign>, Error<C::Error, E>> {
        self.ledger
            .flash_sale(campaign_id)
            .await
            .map_err(Error::Ledger)
    }

    /// Creates a campaign in the pending state and commits its stock to the
    /// counter store. Activation is window-driven via
    /// [`FlashSaleEngine::sweep_windows_once`].
    pub async fn create_campaign(
        &self,
        new: NewFlashSale,
    ) -> Result<FlashSaleCampaign, Error<C::Error, E>> {
        let campaign = self
            .ledger
            .insert_flash_sale(new)
            .await
            .map_err(Error::Ledger)?;

        self.counter
            .set(
                stock_key(campaign.id),
                i64::from(campaign.initial_stock),
                None,
            )
            .await
            .map_err(Error::Counter)?;

        info!(
            "flash sale {} created with stock {}",
            campaign.id, campaign.initial_stock
        );

        Ok(campaign)
    }

    /// Claims `quantity` units for a user: one pending order and a
    /// reservation that lapses unless the order is confirmed in time.
    pub async fn claim(
        &self,
        campaign_id: Uuid,
        user_id: Uuid,
        quantity: u32,
    ) -> Result<Claim, Error<C::Error, E>> {
        let campaign = self
            .ledger
            .flash_sale(campaign_id)
            .await
            .map_err(Error::Ledger)?
            .ok_or(Error::CampaignNotFound)?;

        if campaign.status != CampaignStatus::Active {
            return Err(Error::CampaignNotActive);
        }

        let now = Utc::now();
        if now < campaign.starts_at || now >= campaign.ends_at {
            return Err(Error::OutOfWindow);
        }

        if quantity == 0 {
            return Err(Error::InvalidQuantity);
        }

        // Cheap rejection before stock is touched; the order insert re-checks
        // the limit authoritatively
        let claimed = self
            .ledger
            .user_flash_quantity(campaign_id, user_id)
            .await
            .map_err(Error::Ledger)?;
        if u64::from(claimed) + u64::from(quantity) > u64::from(campaign.limit_per_user) {
            debug!(
                "user {} over the claim limit for flash sale {}",
                user_id, campaign_id
            );
            return Err(Error::LimitExceeded);
        }

        let delta = i64::from(quantity);
        let rest = self
            .counter
            .decr_by(stock_key(campaign_id), delta)
            .await
            .map_err(Error::Counter)?;
        if rest < 0 {
            self.restore_stock(campaign_id, delta).await?;
            debug!("flash sale {} out of stock", campaign_id);
            return Err(Error::OutOfStock);
        }

        let inserted = self
            .ledger
            .insert_flash_order(
                NewFlashOrder {
                    campaign_id,
                    user_id,
                    quantity,
                    unit_price_cents: campaign.price_cents,
                    limit_per_user: campaign.limit_per_user,
                },
                now,
            )
            .await
            .map_err(Error::Ledger)?;
        let order = match inserted {
            InsertFlashOrderResult::Inserted { order } => order,
            InsertFlashOrderResult::LimitExceeded => {
                // Lost the limit race after taking stock
                self.restore_stock(campaign_id, delta).await?;
                debug!(
                    "user {} lost the claim limit race for flash sale {}",
                    user_id, campaign_id
                );
                return Err(Error::LimitExceeded);
            }
        };

        let reserved_until = now + self.config.reservation_window;
        if let Err(e) = self
            .counter
            .set(
                reservation_key(order.id),
                reserved_until.timestamp(),
                Some(self.config.reservation_window),
            )
            .await
        {
            // The stale-order sweep catches unpaid claims regardless, so a
            // lost marker is not fatal
            warn!(
                "failed to arm reservation marker for order {}: {}",
                order.id, e
            );
        }

        info!(
            "flash sale {} claimed {} for user {}",
            campaign_id, quantity, user_id
        );

        Ok(Claim {
            order,
            reserved_until,
        })
    }

    /// Confirms a pending order and clears its reservation.
    pub async fn confirm_order(&self, order_id: Uuid) -> Result<Order, Error<C::Error, E>> {
        match self
            .ledger
            .confirm_order(order_id)
            .await
            .map_err(Error::Ledger)?
        {
            ConfirmOrderResult::Confirmed { order } => {
                if let Err(e) = self.counter.del(reservation_key(order_id)).await {
                    warn!(
                        "failed to clear reservation marker for order {}: {}",
                        order_id, e
                    );
                }
                info!("flash sale order {} confirmed", order_id);
                Ok(order)
            }
            ConfirmOrderResult::AlreadyConfirmed => Err(Error::OrderAlreadyConfirmed),
            ConfirmOrderResult::Cancelled => Err(Error::OrderCancelled),
            ConfirmOrderResult::NotFound => Err(Error::OrderNotFound),
            ConfirmOrderResult::NotPayable => Err(Error::OrderNotPayable),
        }
    }

    /// Cancels a pending order and returns its stock to the pool.
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<Order, Error<C::Error, E>> {
        let cancelled = self
            .ledger
            .cancel_order_if_pending(order_id)
            .await
            .map_err(Error::Ledger)?;
        let Some(order) = cancelled else {
            return match self.ledger.order(order_id).await.map_err(Error::Ledger)? {
                Some(_) => Err(Error::OrderNotCancellable),
                None => Err(Error::OrderNotFound),
            };
        };

        self.release_claim(&order).await?;
        info!("flash sale order {} cancelled", order_id);

        Ok(order)
    }

    /// Reads the live stock counter for a campaign.
    pub async fn remaining_stock(&self, campaign_id: Uuid) -> Result<i64, Error<C::Error, E>> {
        Ok(self
            .counter
            .get(stock_key(campaign_id))
            .await
            .map_err(Error::Counter)?
            .unwrap_or(0))
    }

    /// Opens and closes campaigns whose window boundary has passed.
    pub async fn sweep_windows_once(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(), Error<C::Error, E>> {
        let activated = self
            .ledger
            .activate_flash_sales_due(now)
            .await
            .map_err(Error::Ledger)?;
        for campaign_id in activated {
            info!("flash sale {} opened", campaign_id);
        }

        let ended = self
            .ledger
            .end_flash_sales_due(now)
            .await
            .map_err(Error::Ledger)?;
        for campaign_id in ended {
            info!("flash sale {} closed", campaign_id);
        }

        Ok(())
    }

    /// Cancels claims that outlived the reservation window and returns their
    /// stock. Records are processed one at a time so a bad one cannot block
    /// the rest of the pass.
    pub async fn sweep_stale_orders_once(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(), Error<C::Error, E>> {
        let cutoff = now - self.config.reservation_window;
        let stale = self
            .ledger
            .pending_flash_orders_before(cutoff)
            .await
            .map_err(Error::Ledger)?;

        for order in stale {
            // Stock moves only when this call wins the cancel transition
            match self.ledger.cancel_order_if_pending(order.id).await {
                Ok(Some(cancelled)) => {
                    info!("flash sale order {} lapsed unpaid", cancelled.id);
                    if let Err(e) = self.release_claim(&cancelled).await {
                        warn!("failed to release lapsed order {}: {}", cancelled.id, e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("failed to cancel lapsed order {}: {}", order.id, e),
            }
        }

        Ok(())
    }

    async fn release_claim(&self, order: &Order) -> Result<(), Error<C::Error, E>> {
        let OrderSource::FlashSale { campaign_id } = order.source else {
            return Ok(());
        };

        self.restore_stock(campaign_id, i64::from(order.quantity))
            .await?;
        if let Err(e) = self.counter.del(reservation_key(order.id)).await {
            warn!(
                "failed to clear reservation marker for order {}: {}",
                order.id, e
            );
        }

        Ok(())
    }

    async fn restore_stock(
        &self,
        campaign_id: Uuid,
        delta: i64,
    ) -> Result<(), Error<C::Error, E>> {
        if let Err(e) = self.counter.incr_by(stock_key(campaign_id), delta).await {
            // Never silent: a failed restoration leaves the counter and the
            // ledger out of step until reconciled
            error!(
                "stock restoration of {} failed for flash sale {}: {}",
                delta, campaign_id, e
            );
            return Err(Error::Counter(e));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use promo_counter_memory::MemoryCounterStore;
    use promo_ledger_memory::MemoryLedger;

    type TestEngine = FlashSaleEngine<MemoryCounterStore, MemoryLedger>;

    fn engine() -> (TestEngine, MemoryCounterStore, MemoryLedger) {
        let counter = MemoryCounterStore::new();
        let ledger = MemoryLedger::new();
        let engine = FlashSaleEngine::new(
            counter.clone(),
            ledger.clone(),
            FlashSaleConfig::default(),
        );
        (engine, counter, ledger)
    }

    fn new_campaign(stock: u32, limit: u32) -> NewFlashSale {
        let now = Utc::now();
        NewFlashSale {
            product_id: Uuid::new_v4(),
            price_cents: 4999,
            initial_stock: stock,
            limit_per_user: limit,
            starts_at: now - ChronoDuration::minutes(5),
            ends_at: now + ChronoDuration::minutes(30),
        }
    }

    async fn active_campaign(engine: &TestEngine, stock: u32, limit: u32) -> FlashSaleCampaign {
        let campaign = engine.create_campaign(new_campaign(stock, limit)).await.unwrap();
        engine.sweep_windows_once(Utc::now()).await.unwrap();
        engine.campaign(campaign.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_create_campaign_commits_stock() {
        let (engine, counter, _) = engine();

        let campaign = engine.create_campaign(new_campaign(100, 2)).await.unwrap();

        assert_eq!(campaign.status, CampaignStatus::Pending);
        assert_eq!(
            counter.get(stock_key(campaign.id)).await.unwrap(),
            Some(100)
        );
    }

    #[tokio::test]
    async fn test_claim_holds_stock_and_reserves() {
        let (engine, counter, _) = engine();
        let campaign = active_campaign(&engine, 100, 2).await;

        let claim = engine
            .claim(campaign.id, Uuid::new_v4(), 2)
            .await
            .unwrap();

        assert_eq!(claim.order.quantity, 2);
        assert_eq!(claim.order.total_cents, 2 * 4999);
        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 98);

        // Reservation marker carries the lapse deadline
        let marker = counter
            .get(reservation_key(claim.order.id))
            .await
            .unwrap();
        assert_eq!(marker, Some(claim.reserved_until.timestamp()));
    }

    #[tokio::test]
    async fn test_claim_rejects_pending_campaign() {
        let (engine, _, _) = engine();
        let campaign = engine.create_campaign(new_campaign(100, 2)).await.unwrap();

        let result = engine.claim(campaign.id, Uuid::new_v4(), 1).await;

        assert!(matches!(result, Err(Error::CampaignNotActive)));
    }

    #[tokio::test]
    async fn test_claim_rejects_unknown_campaign() {
        let (engine, _, _) = engine();

        let result = engine.claim(Uuid::new_v4(), Uuid::new_v4(), 1).await;

        assert!(matches!(result, Err(Error::CampaignNotFound)));
    }

    #[tokio::test]
    async fn test_claim_rejects_closed_window() {
        let (engine, _, _) = engine();
        let now = Utc::now();

        // Window already over; activate with a timestamp from inside it
        let campaign = engine
            .create_campaign(NewFlashSale {
                product_id: Uuid::new_v4(),
                price_cents: 4999,
                initial_stock: 100,
                limit_per_user: 2,
                starts_at: now - ChronoDuration::hours(2),
                ends_at: now - ChronoDuration::hours(1),
            })
            .await
            .unwrap();
        engine
            .sweep_windows_once(now - ChronoDuration::hours(2))
            .await
            .unwrap();

        let result = engine.claim(campaign.id, Uuid::new_v4(), 1).await;

        assert!(matches!(result, Err(Error::OutOfWindow)));
    }

    #[tokio::test]
    async fn test_claim_rejects_zero_quantity() {
        let (engine, _, _) = engine();
        let campaign = active_campaign(&engine, 100, 2).await;

        let result = engine.claim(campaign.id, Uuid::new_v4(), 0).await;

        assert!(matches!(result, Err(Error::InvalidQuantity)));
    }

    #[tokio::test]
    async fn test_claim_enforces_per_user_limit() {
        let (engine, _, _) = engine();
        let campaign = active_campaign(&engine, 100, 2).await;
        let user_id = Uuid::new_v4();

        engine.claim(campaign.id, user_id, 2).await.unwrap();

        let result = engine.claim(campaign.id, user_id, 1).await;
        assert!(matches!(result, Err(Error::LimitExceeded)));

        // The rejected claim must not have touched stock
        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 98);
    }

    #[tokio::test]
    async fn test_claim_rejects_overflowing_quantity() {
        let (engine, _, _) = engine();
        let campaign = active_campaign(&engine, 100, 2).await;
        let user_id = Uuid::new_v4();

        engine.claim(campaign.id, user_id, 1).await.unwrap();

        // A quantity near the integer ceiling fails the limit check rather
        // than wrapping it
        let result = engine.claim(campaign.id, user_id, u32::MAX).await;
        assert!(matches!(result, Err(Error::LimitExceeded)));

        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 99);
    }

    #[tokio::test]
    async fn test_claim_compensates_on_oversell() {
        let (engine, _, _) = engine();
        let campaign = active_campaign(&engine, 1, 5).await;

        let result = engine.claim(campaign.id, Uuid::new_v4(), 2).await;

        assert!(matches!(result, Err(Error::OutOfStock)));
        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_oversell() {
        let (engine, _, ledger) = engine();
        let campaign = active_campaign(&engine, 5, 1).await;

        let handles = (0..20)
            .map(|_| {
                let engine = engine.clone();
                let campaign_id = campaign.id;
                tokio::spawn(async move { engine.claim(campaign_id, Uuid::new_v4(), 1).await })
            })
            .collect::<Vec<_>>();
        let results = futures::future::join_all(handles).await;

        let successes = results
            .into_iter()
            .filter(|result| result.as_ref().unwrap().is_ok())
            .count();

        assert_eq!(successes, 5);
        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 0);
        assert_eq!(ledger.flash_orders(campaign.id).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_same_user_claims_respect_limit() {
        let (engine, _, _) = engine();
        let campaign = active_campaign(&engine, 10, 1).await;
        let user_id = Uuid::new_v4();

        let handles = (0..2)
            .map(|_| {
                let engine = engine.clone();
                let campaign_id = campaign.id;
                tokio::spawn(async move { engine.claim(campaign_id, user_id, 1).await })
            })
            .collect::<Vec<_>>();
        let results = futures::future::join_all(handles).await;

        let successes = results
            .iter()
            .filter(|result| result.as_ref().unwrap().is_ok())
            .count();

        // Whichever interleaving happens, one claim wins and the loser's
        // stock goes back
        assert_eq!(successes, 1);
        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_once() {
        let (engine, _, _) = engine();
        let campaign = active_campaign(&engine, 100, 2).await;

        let claim = engine.claim(campaign.id, Uuid::new_v4(), 2).await.unwrap();
        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 98);

        let cancelled = engine.cancel_order(claim.order.id).await.unwrap();
        assert_eq!(cancelled.status, promo_ledger::OrderStatus::Cancelled);
        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 100);

        // A second cancel must not restore again
        let result = engine.cancel_order(claim.order.id).await;
        assert!(matches!(result, Err(Error::OrderNotCancellable)));
        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_confirm_clears_reservation() {
        let (engine, counter, _) = engine();
        let campaign = active_campaign(&engine, 100, 2).await;

        let claim = engine.claim(campaign.id, Uuid::new_v4(), 1).await.unwrap();
        let order = engine.confirm_order(claim.order.id).await.unwrap();

        assert_eq!(order.status, promo_ledger::OrderStatus::Confirmed);
        assert_eq!(
            counter.get(reservation_key(claim.order.id)).await.unwrap(),
            None
        );

        // Confirmed sales keep their stock held
        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 99);

        let result = engine.confirm_order(claim.order.id).await;
        assert!(matches!(result, Err(Error::OrderAlreadyConfirmed)));
    }

    #[tokio::test]
    async fn test_stale_sweep_releases_unpaid_claims() {
        let (engine, counter, ledger) = engine();
        let campaign = active_campaign(&engine, 100, 2).await;

        let claim = engine.claim(campaign.id, Uuid::new_v4(), 2).await.unwrap();
        let paid = engine.claim(campaign.id, Uuid::new_v4(), 1).await.unwrap();
        engine.confirm_order(paid.order.id).await.unwrap();

        let later = Utc::now() + ChronoDuration::minutes(16);
        engine.sweep_stale_orders_once(later).await.unwrap();

        let order = ledger.order(claim.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, promo_ledger::OrderStatus::Cancelled);
        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 99);
        assert_eq!(
            counter.get(reservation_key(claim.order.id)).await.unwrap(),
            None
        );

        // Confirmed orders are left alone and repeats restore nothing
        engine.sweep_stale_orders_once(later).await.unwrap();
        assert_eq!(engine.remaining_stock(campaign.id).await.unwrap(), 99);
        let paid_order = ledger.order(paid.order.id).await.unwrap().unwrap();
        assert_eq!(paid_order.status, promo_ledger::OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_window_sweep_opens_and_closes() {
        let (engine, _, _) = engine();
        let campaign = engine.create_campaign(new_campaign(100, 2)).await.unwrap();

        engine.sweep_windows_once(Utc::now()).await.unwrap();
        let opened = engine.campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(opened.status, CampaignStatus::Active);

        engine
            .sweep_windows_once(Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap();
        let closed = engine.campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(closed.status, CampaignStatus::Ended);
    }
}
