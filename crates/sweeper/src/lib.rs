//! Periodic sweeper driving the time-based transitions of all three campaign
//! engines: flash-sale windows, group deadlines, session deadlines and stale
//! unpaid orders.
//!
//! Each concern runs on its own cadence in its own background task. A pass
//! reads the clock once and hands the timestamp down, so every transition the
//! engines make is a function of a supplied time and tests can drive the same
//! passes with synthetic clocks.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::time::Duration;

use chrono::{DateTime, Utc};
use promo_bargain::BargainEngine;
use promo_counter::CounterStore;
use promo_flash_sale::FlashSaleEngine;
use promo_group_buy::GroupBuyEngine;
use promo_ledger::{
    CampaignRepository, GroupRepository, LedgerError, OrderRepository, SessionRepository,
};
use rand::Rng;
use rand::rngs::StdRng;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Cadences for the sweep loops.
#[derive(Clone, Debug)]
pub struct SweeperConfig {
    /// How often flash-sale windows are opened and closed.
    pub window_interval: Duration,

    /// How often overdue groups are failed.
    pub group_interval: Duration,

    /// How often overdue sessions are expired.
    pub session_interval: Duration,

    /// How often lapsed unpaid orders are cancelled.
    pub stale_order_interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            window_interval: Duration::from_secs(60),
            group_interval: Duration::from_secs(300),
            session_interval: Duration::from_secs(600),
            stale_order_interval: Duration::from_secs(60),
        }
    }
}

/// Background driver for the engines' time-based transitions.
#[derive(Debug)]
pub struct Sweeper<C, L, R = StdRng> {
    flash_sale: FlashSaleEngine<C, L>,
    group_buy: GroupBuyEngine<L>,
    bargain: BargainEngine<C, L, R>,
    config: SweeperConfig,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl<C, L, R, E> Sweeper<C, L, R>
where
    C: CounterStore,
    E: LedgerError,
    L: CampaignRepository<Error = E>
        + GroupRepository<Error = E>
        + OrderRepository<Error = E>
        + SessionRepository<Error = E>,
    R: Rng + Send + 'static,
{
    /// Creates a new `Sweeper` over the three engines.
    #[must_use]
    pub fn new(
        flash_sale: FlashSaleEngine<C, L>,
        group_buy: GroupBuyEngine<L>,
        bargain: BargainEngine<C, L, R>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            flash_sale,
            group_buy,
            bargain,
            config,
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Spawns the four sweep loops. Each loop runs one pass immediately and
    /// then keeps its cadence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] when the loops are already running
    /// or the sweeper has been shut down.
    pub fn start(&self) -> Result<(), Error> {
        if self.task_tracker.is_closed() || !self.task_tracker.is_empty() {
            return Err(Error::AlreadyStarted);
        }

        {
            let engine = self.flash_sale.clone();
            let cancellation = self.cancellation_token.clone();
            let period = self.config.window_interval;

            self.task_tracker.spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = engine.sweep_windows_once(Utc::now()).await {
                                warn!("window sweep failed: {}", e);
                            }
                        }
                        _ = cancellation.cancelled() => {
                            debug!("window sweep loop stopped");
                            break;
                        }
                    }
                }
            });
        }

        {
            let engine = self.group_buy.clone();
            let cancellation = self.cancellation_token.clone();
            let period = self.config.group_interval;

            self.task_tracker.spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = engine.sweep_expired_once(Utc::now()).await {
                                warn!("group sweep failed: {}", e);
                            }
                        }
                        _ = cancellation.cancelled() => {
                            debug!("group sweep loop stopped");
                            break;
                        }
                    }
                }
            });
        }

        {
            let engine = self.bargain.clone();
            let cancellation = self.cancellation_token.clone();
            let period = self.config.session_interval;

            self.task_tracker.spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = engine.sweep_expired_once(Utc::now()).await {
                                warn!("session sweep failed: {}", e);
                            }
                        }
                        _ = cancellation.cancelled() => {
                            debug!("session sweep loop stopped");
                            break;
                        }
                    }
                }
            });
        }

        {
            let flash_sale = self.flash_sale.clone();
            let bargain = self.bargain.clone();
            let cancellation = self.cancellation_token.clone();
            let period = self.config.stale_order_interval;

            self.task_tracker.spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let now = Utc::now();
                            if let Err(e) = flash_sale.sweep_stale_orders_once(now).await {
                                warn!("flash sale stale order sweep failed: {}", e);
                            }
                            if let Err(e) = bargain.sweep_stale_orders_once(now).await {
                                warn!("bargain stale order sweep failed: {}", e);
                            }
                        }
                        _ = cancellation.cancelled() => {
                            debug!("stale order sweep loop stopped");
                            break;
                        }
                    }
                }
            });
        }

        info!("sweeper started");

        Ok(())
    }

    /// Stops the sweep loops and waits for them to exit.
    pub async fn shutdown(&self) {
        info!("sweeper shutting down");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }

    /// Waits for the sweep loops to exit.
    pub async fn wait(&self) {
        self.task_tracker.wait().await;
    }

    /// Runs every sweep concern once against the supplied timestamp. These
    /// are the same engine passes the background loops run on their
    /// cadences.
    pub async fn run_all_once(&self, now: DateTime<Utc>) {
        if let Err(e) = self.flash_sale.sweep_windows_once(now).await {
            warn!("window sweep failed: {}", e);
        }
        if let Err(e) = self.group_buy.sweep_expired_once(now).await {
            warn!("group sweep failed: {}", e);
        }
        if let Err(e) = self.bargain.sweep_expired_once(now).await {
            warn!("session sweep failed: {}", e);
        }
        if let Err(e) = self.flash_sale.sweep_stale_orders_once(now).await {
            warn!("flash sale stale order sweep failed: {}", e);
        }
        if let Err(e) = self.bargain.sweep_stale_orders_once(now).await {
            warn!("bargain stale order sweep failed: {}", e);
        }
    }
}
