//! Negotiation engine: a per-user session walks a price down toward a floor,
//! one reduction per distinct helper, with an order unlocked once the floor
//! is reached.
//!
//! Reduction sizing is a bounded random draw over the remaining gap, but the
//! ledger re-clamps the amount and forces the final permitted reduction inside
//! its own unit, so no race pushes a price below the floor or strands a fully
//! helped session above it.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod policy;

pub use error::Error;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use promo_counter::CounterStore;
use promo_ledger::{
    BargainCampaign, BargainCut, BargainSession, CampaignRepository, CampaignStatus,
    ConfirmOrderResult, InsertBargainOrderResult, LedgerError, NewBargain, NewBargainOrder,
    NewSession, Order, OrderRepository, ReduceSessionResult, SessionRepository, SessionStatus,
    StartSessionResult,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

// The effective floor never goes below a tenth of the original price
const FLOOR_DIVISOR: i64 = 10;

/// Configuration for the negotiation engine.
#[derive(Clone, Debug)]
pub struct BargainConfig {
    /// How long an unpaid bargain order stays payable.
    pub order_reservation_window: Duration,
}

impl Default for BargainConfig {
    fn default() -> Self {
        Self {
            order_reservation_window: Duration::from_secs(30 * 60),
        }
    }
}

/// A reduction applied to a session.
#[derive(Clone, Debug)]
pub struct Reduction {
    /// The amount removed from the price, in cents.
    pub amount_cents: i64,

    /// The price after this reduction, in cents.
    pub new_price_cents: i64,

    /// Reductions still permitted.
    pub remaining_cuts: u32,

    /// Whether this reduction brought the price to the floor.
    pub is_success: bool,
}

/// An order placed from a successful session.
#[derive(Clone, Debug)]
pub struct PlacedOrder {
    /// The pending order at the negotiated price.
    pub order: Order,

    /// When the unpaid order lapses.
    pub reserved_until: DateTime<Utc>,
}

fn reservation_key(order_id: Uuid) -> String {
    format!("bargain:reservation:{order_id}")
}

/// Negotiation engine over an injected counter store, ledger and reduction
/// RNG.
#[derive(Debug)]
pub struct BargainEngine<C, L, R = StdRng> {
    counter: C,
    ledger: L,
    rng: Arc<Mutex<R>>,
    config: BargainConfig,
}

// Manual Clone implementation that doesn't require R: Clone
impl<C, L, R> Clone for BargainEngine<C, L, R>
where
    C: Clone,
    L: Clone,
{
    fn clone(&self) -> Self {
        Self {
            counter: self.counter.clone(),
            ledger: self.ledger.clone(),
            rng: self.rng.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C, L> BargainEngine<C, L> {
    /// Creates a new `BargainEngine` with an entropy-seeded RNG.
    #[must_use]
    pub fn new(counter: C, ledger: L, config: BargainConfig) -> Self {
        Self::with_rng(counter, ledger, StdRng::from_entropy(), config)
    }
}

impl<C, L, R> BargainEngine<C, L, R> {
    /// Creates a new `BargainEngine` drawing reduction amounts from `rng`.
    #[must_use]
    pub fn with_rng(counter: C, ledger: L, rng: R, config: BargainConfig) -> Self {
        Self {
            counter,
            ledger,
            rng: Arc::new(Mutex::new(rng)),
            config,
        }
    }
}

impl<C, L, R, E> BargainEngine<C, L, R>
where
    C: CounterStore,
    E: LedgerError,
    L: CampaignRepository<Error = E> + OrderRepository<Error = E> + SessionRepository<Error = E>,
    R: Rng + Send,
{
    /// Gets a campaign.
    pub async fn campaign(
        &self,
        campaign_id: Uuid,
    ) -> Result<Option<BargainCampaign>, Error<E>> {
        self.ledger
            .bargain(campaign_id)
            .await
            .map_err(Error::Ledger)
    }

    /// Creates a campaign, open for negotiation immediately. A minimum price
    /// above the original would leave sessions nothing to negotiate, so it is
    /// rejected up front.
    pub async fn create_campaign(&self, new: NewBargain) -> Result<BargainCampaign, Error<E>> {
        if new.min_price_cents > new.original_price_cents {
            return Err(Error::InvalidPriceRange);
        }

        let campaign = self
            .ledger
            .insert_bargain(new)
            .await
            .map_err(Error::Ledger)?;

        info!(
            "bargain campaign {} created with {} cuts to the floor",
            campaign.id, campaign.max_cuts
        );

        Ok(campaign)
    }

    /// Starts a negotiation session for a user at the campaign's original
    /// price. The floor is the campaign's configured minimum, raised to a
    /// tenth of the original price when set below it.
    pub async fn start(
        &self,
        campaign_id: Uuid,
        user_id: Uuid,
    ) -> Result<BargainSession, Error<E>> {
        let campaign = self
            .ledger
            .bargain(campaign_id)
            .await
            .map_err(Error::Ledger)?
            .ok_or(Error::CampaignNotFound)?;

        if campaign.status != CampaignStatus::Active {
            return Err(Error::CampaignNotActive);
        }

        let floor_price_cents = campaign
            .min_price_cents
            .max(campaign.original_price_cents / FLOOR_DIVISOR);
        let now = Utc::now();

        match self
            .ledger
            .start_session(NewSession {
                campaign_id,
                user_id,
                original_price_cents: campaign.original_price_cents,
                floor_price_cents,
                max_cuts: campaign.max_cuts,
                deadline: now + chrono::Duration::seconds(campaign.time_limit_secs),
            })
            .await
            .map_err(Error::Ledger)?
        {
            StartSessionResult::Started { session } => {
                info!(
                    "bargain session {} started for user {} at {}",
                    session.id, user_id, session.original_price_cents
                );
                Ok(session)
            }
            StartSessionResult::AlreadyActive => Err(Error::SessionAlreadyActive),
        }
    }

    /// Applies one reduction on behalf of `helper_id`. The amount is a
    /// bounded random draw over the remaining gap; the final permitted
    /// reduction takes whatever remains, so a fully helped session always
    /// lands exactly on the floor.
    pub async fn reduce(&self, session_id: Uuid, helper_id: Uuid) -> Result<Reduction, Error<E>> {
        let session = self
            .ledger
            .session(session_id)
            .await
            .map_err(Error::Ledger)?
            .ok_or(Error::SessionNotFound)?;

        match session.status {
            SessionStatus::Active => {}
            SessionStatus::Expired => return Err(Error::SessionExpired),
            SessionStatus::Success => return Err(Error::SessionNotActive),
        }

        // The hint is sized from a snapshot; the ledger re-checks the gates
        // and re-clamps the amount inside its own unit
        let steps_left = session.max_cuts.saturating_sub(session.cuts_used);
        let hint = if steps_left == 0 {
            0
        } else {
            let gap = session.current_price_cents - session.floor_price_cents;
            let mut rng = self.rng.lock().await;
            policy::cut_amount(gap, steps_left, &mut *rng)
        };

        match self
            .ledger
            .reduce_session(session_id, helper_id, hint, Utc::now())
            .await
            .map_err(Error::Ledger)?
        {
            ReduceSessionResult::Reduced {
                amount_cents,
                new_price_cents,
                remaining_cuts,
                is_success,
            } => {
                if is_success {
                    info!(
                        "bargain session {} reached its floor of {}",
                        session_id, new_price_cents
                    );
                } else {
                    info!(
                        "bargain session {} cut by {} to {}",
                        session_id, amount_cents, new_price_cents
                    );
                }
                Ok(Reduction {
                    amount_cents,
                    new_price_cents,
                    remaining_cuts,
                    is_success,
                })
            }
            ReduceSessionResult::AlreadyHelped => {
                debug!("helper {} has already cut session {}", helper_id, session_id);
                Err(Error::AlreadyHelped)
            }
            ReduceSessionResult::Expired => Err(Error::SessionExpired),
            ReduceSessionResult::NotActive => Err(Error::SessionNotActive),
            ReduceSessionResult::NotFound => Err(Error::SessionNotFound),
            ReduceSessionResult::QuotaExhausted => Err(Error::StepsExhausted),
        }
    }

    /// Places the order a successful session earned, at the negotiated
    /// price. The order lapses unless confirmed within the reservation
    /// window.
    pub async fn create_order(&self, session_id: Uuid) -> Result<PlacedOrder, Error<E>> {
        let session = self
            .ledger
            .session(session_id)
            .await
            .map_err(Error::Ledger)?
            .ok_or(Error::SessionNotFound)?;

        if session.status != SessionStatus::Success {
            return Err(Error::NotSuccessful);
        }

        let now = Utc::now();
        let inserted = self
            .ledger
            .insert_bargain_order(
                NewBargainOrder {
                    campaign_id: session.campaign_id,
                    session_id,
                    user_id: session.user_id,
                    unit_price_cents: session.current_price_cents,
                },
                now,
            )
            .await
            .map_err(Error::Ledger)?;
        let order = match inserted {
            InsertBargainOrderResult::Inserted { order } => order,
            InsertBargainOrderResult::AlreadyOrdered => return Err(Error::AlreadyOrdered),
        };

        let reserved_until = now + self.config.order_reservation_window;
        if let Err(e) = self
            .counter
            .set(
                reservation_key(order.id),
                reserved_until.timestamp(),
                Some(self.config.order_reservation_window),
            )
            .await
        {
            // The stale-order sweep catches unpaid orders regardless, so a
            // lost marker is not fatal
            warn!(
                "failed to arm reservation marker for order {}: {}",
                order.id, e
            );
        }

        info!(
            "bargain order {} placed at {} for session {}",
            order.id, order.unit_price_cents, session_id
        );

        Ok(PlacedOrder {
            order,
            reserved_until,
        })
    }

    /// Confirms a pending order and clears its reservation.
    pub async fn confirm_order(&self, order_id: Uuid) -> Result<Order, Error<E>> {
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
                info!("bargain order {} confirmed", order_id);
                Ok(order)
            }
            ConfirmOrderResult::AlreadyConfirmed => Err(Error::OrderAlreadyConfirmed),
            ConfirmOrderResult::Cancelled => Err(Error::OrderCancelled),
            ConfirmOrderResult::NotFound => Err(Error::OrderNotFound),
            ConfirmOrderResult::NotPayable => Err(Error::OrderNotPayable),
        }
    }

    /// Gets a session.
    pub async fn session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<BargainSession>, Error<E>> {
        self.ledger.session(session_id).await.map_err(Error::Ledger)
    }

    /// Gets a session's reductions in application order.
    pub async fn cuts(&self, session_id: Uuid) -> Result<Vec<BargainCut>, Error<E>> {
        self.ledger.cuts(session_id).await.map_err(Error::Ledger)
    }

    /// Expires sessions whose deadline passed before they reached the floor.
    /// Records are processed one at a time so a bad one cannot block the
    /// rest of the pass.
    pub async fn sweep_expired_once(&self, now: DateTime<Utc>) -> Result<(), Error<E>> {
        let due = self
            .ledger
            .expire_sessions_due(now)
            .await
            .map_err(Error::Ledger)?;

        for session_id in due {
            match self.ledger.expire_session(session_id).await {
                Ok(true) => info!("bargain session {} expired at its deadline", session_id),
                Ok(false) => {}
                Err(e) => warn!("failed to expire session {}: {}", session_id, e),
            }
        }

        Ok(())
    }

    /// Cancels bargain orders that outlived the reservation window. No stock
    /// backs a bargain order, so lapsing only frees the record.
    pub async fn sweep_stale_orders_once(&self, now: DateTime<Utc>) -> Result<(), Error<E>> {
        let cutoff = now - self.config.order_reservation_window;
        let stale = self
            .ledger
            .pending_bargain_orders_before(cutoff)
            .await
            .map_err(Error::Ledger)?;

        for order in stale {
            match self.ledger.cancel_order_if_pending(order.id).await {
                Ok(Some(cancelled)) => {
                    info!("bargain order {} lapsed unpaid", cancelled.id);
                    if let Err(e) = self.counter.del(reservation_key(cancelled.id)).await {
                        warn!(
                            "failed to clear reservation marker for order {}: {}",
                            cancelled.id, e
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("failed to cancel lapsed order {}: {}", order.id, e),
            }
        }

        Ok(())
    }
}
