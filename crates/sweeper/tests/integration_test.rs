//! End-to-end scenarios across the three campaign engines and the sweeper.
//!
//! These tests wire the engines to the in-memory counter store and ledger,
//! drive the user-facing operations directly and run the sweep passes with
//! synthetic timestamps, so each time-driven transition is exercised without
//! waiting on real clocks.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use promo_bargain::{BargainConfig, BargainEngine};
use promo_counter_memory::MemoryCounterStore;
use promo_flash_sale::{FlashSaleConfig, FlashSaleEngine};
use promo_group_buy::GroupBuyEngine;
use promo_ledger::{
    CampaignStatus, GroupStatus, NewBargain, NewFlashSale, NewGroupBuy, OrderRepository,
    OrderStatus, SessionStatus,
};
use promo_ledger_memory::MemoryLedger;
use promo_sweeper::{Error as SweeperError, Sweeper, SweeperConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use uuid::Uuid;

struct Stack {
    flash_sale: FlashSaleEngine<MemoryCounterStore, MemoryLedger>,
    group_buy: GroupBuyEngine<MemoryLedger>,
    bargain: BargainEngine<MemoryCounterStore, MemoryLedger>,
    sweeper: Sweeper<MemoryCounterStore, MemoryLedger>,
    ledger: MemoryLedger,
}

fn stack(seed: u64, config: SweeperConfig) -> Stack {
    let counter = MemoryCounterStore::new();
    let ledger = MemoryLedger::new();

    let flash_sale = FlashSaleEngine::new(
        counter.clone(),
        ledger.clone(),
        FlashSaleConfig::default(),
    );
    let group_buy = GroupBuyEngine::new(ledger.clone());
    let bargain = BargainEngine::with_rng(
        counter,
        ledger.clone(),
        StdRng::seed_from_u64(seed),
        BargainConfig::default(),
    );
    let sweeper = Sweeper::new(
        flash_sale.clone(),
        group_buy.clone(),
        bargain.clone(),
        config,
    );

    Stack {
        flash_sale,
        group_buy,
        bargain,
        sweeper,
        ledger,
    }
}

#[tokio::test]
async fn test_flash_sale_never_oversells_end_to_end() {
    // Initialize logging
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let stack = stack(1, SweeperConfig::default());
    let now = Utc::now();

    let campaign = stack
        .flash_sale
        .create_campaign(NewFlashSale {
            product_id: Uuid::new_v4(),
            price_cents: 9_900,
            initial_stock: 5,
            limit_per_user: 1,
            starts_at: now - ChronoDuration::minutes(1),
            ends_at: now + ChronoDuration::minutes(30),
        })
        .await
        .expect("Failed to create campaign");

    // The first sweep pass opens the window
    stack.sweeper.run_all_once(now).await;
    let opened = stack
        .flash_sale
        .campaign(campaign.id)
        .await
        .expect("Failed to get campaign")
        .expect("Campaign not found");
    assert_eq!(opened.status, CampaignStatus::Active);

    // Twenty buyers race for five units
    let handles = (0..20)
        .map(|_| {
            let engine = stack.flash_sale.clone();
            let campaign_id = campaign.id;
            tokio::spawn(async move { engine.claim(campaign_id, Uuid::new_v4(), 1).await })
        })
        .collect::<Vec<_>>();
    let results = futures::future::join_all(handles).await;
    let claims = results
        .into_iter()
        .map(|result| result.expect("Claim task panicked"))
        .filter_map(Result::ok)
        .collect::<Vec<_>>();

    assert_eq!(claims.len(), 5);
    assert_eq!(
        stack
            .flash_sale
            .remaining_stock(campaign.id)
            .await
            .expect("Failed to read stock"),
        0
    );

    // Two buyers pay; the other claims lapse at the reservation window
    for claim in &claims[..2] {
        stack
            .flash_sale
            .confirm_order(claim.order.id)
            .await
            .expect("Failed to confirm order");
    }

    let later = now + ChronoDuration::minutes(16);
    stack.sweeper.run_all_once(later).await;

    // Lapsed claims returned their stock; paid ones kept it
    assert_eq!(
        stack
            .flash_sale
            .remaining_stock(campaign.id)
            .await
            .expect("Failed to read stock"),
        3
    );
    let orders = stack
        .ledger
        .flash_orders(campaign.id)
        .await
        .expect("Failed to list orders");
    let confirmed = orders
        .iter()
        .filter(|order| order.status == OrderStatus::Confirmed)
        .count();
    let cancelled = orders
        .iter()
        .filter(|order| order.status == OrderStatus::Cancelled)
        .count();
    assert_eq!(confirmed, 2);
    assert_eq!(cancelled, 3);

    // A later pass closes the window
    stack.sweeper.run_all_once(now + ChronoDuration::hours(1)).await;
    let closed = stack
        .flash_sale
        .campaign(campaign.id)
        .await
        .expect("Failed to get campaign")
        .expect("Campaign not found");
    assert_eq!(closed.status, CampaignStatus::Ended);
}

#[tokio::test]
async fn test_group_completion_and_expiry_end_to_end() {
    // Initialize logging
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let stack = stack(2, SweeperConfig::default());

    let campaign = stack
        .group_buy
        .create_campaign(NewGroupBuy {
            product_id: Uuid::new_v4(),
            group_price_cents: 1_999,
            original_price_cents: 2_999,
            min_members: 3,
            max_members: 5,
            time_limit_secs: 60 * 60,
        })
        .await
        .expect("Failed to create campaign");

    // One group assembles its full target
    let winning = stack
        .group_buy
        .open(campaign.id, Uuid::new_v4())
        .await
        .expect("Failed to open group");
    stack
        .group_buy
        .join(winning.group.id, Uuid::new_v4())
        .await
        .expect("Failed to join group");
    let last = stack
        .group_buy
        .join(winning.group.id, Uuid::new_v4())
        .await
        .expect("Failed to join group");
    assert!(last.completed);

    // The other runs out of time short of its target
    let losing = stack
        .group_buy
        .open(campaign.id, Uuid::new_v4())
        .await
        .expect("Failed to open group");
    stack
        .group_buy
        .join(losing.group.id, Uuid::new_v4())
        .await
        .expect("Failed to join group");

    let later = Utc::now() + ChronoDuration::hours(2);
    stack.sweeper.run_all_once(later).await;

    let failed = stack
        .group_buy
        .group(losing.group.id)
        .await
        .expect("Failed to get group")
        .expect("Group not found");
    assert_eq!(failed.status, GroupStatus::Failed);
    let succeeded = stack
        .group_buy
        .group(winning.group.id)
        .await
        .expect("Failed to get group")
        .expect("Group not found");
    assert_eq!(succeeded.status, GroupStatus::Success);

    // Completed members pay the group price; failed members hold nothing
    let order = stack
        .group_buy
        .confirm_order(winning.order_id)
        .await
        .expect("Failed to confirm order");
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.total_cents, 1_999);

    let cancelled = stack
        .ledger
        .order(losing.order_id)
        .await
        .expect("Failed to get order")
        .expect("Order not found");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_bargain_reaches_floor_and_expires_end_to_end() {
    // Initialize logging
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let stack = stack(3, SweeperConfig::default());

    let campaign = stack
        .bargain
        .create_campaign(NewBargain {
            product_id: Uuid::new_v4(),
            original_price_cents: 20_000,
            min_price_cents: 500,
            max_cuts: 6,
            time_limit_secs: 60 * 60,
        })
        .await
        .expect("Failed to create campaign");

    // A fully helped session lands exactly on the floor, never below it
    let helped = stack
        .bargain
        .start(campaign.id, Uuid::new_v4())
        .await
        .expect("Failed to start session");
    assert_eq!(helped.floor_price_cents, 2_000);

    let mut last_price = helped.original_price_cents;
    for _ in 0..6 {
        let reduction = stack
            .bargain
            .reduce(helped.id, Uuid::new_v4())
            .await
            .expect("Failed to reduce");
        assert!(reduction.new_price_cents >= 2_000);
        assert!(reduction.new_price_cents < last_price);
        last_price = reduction.new_price_cents;
        if reduction.is_success {
            break;
        }
    }
    assert_eq!(last_price, 2_000);

    let placed = stack
        .bargain
        .create_order(helped.id)
        .await
        .expect("Failed to create order");
    assert_eq!(placed.order.unit_price_cents, 2_000);
    let confirmed = stack
        .bargain
        .confirm_order(placed.order.id)
        .await
        .expect("Failed to confirm order");
    assert_eq!(confirmed.status, OrderStatus::Confirmed);

    // An abandoned session expires on sweep; the finished one is untouched
    let abandoned = stack
        .bargain
        .start(campaign.id, Uuid::new_v4())
        .await
        .expect("Failed to start session");
    stack
        .bargain
        .reduce(abandoned.id, Uuid::new_v4())
        .await
        .expect("Failed to reduce");

    let later = Utc::now() + ChronoDuration::hours(2);
    stack.sweeper.run_all_once(later).await;

    let expired = stack
        .bargain
        .session(abandoned.id)
        .await
        .expect("Failed to get session")
        .expect("Session not found");
    assert_eq!(expired.status, SessionStatus::Expired);
    let succeeded = stack
        .bargain
        .session(helped.id)
        .await
        .expect("Failed to get session")
        .expect("Session not found");
    assert_eq!(succeeded.status, SessionStatus::Success);
}

#[tokio::test]
async fn test_sweeper_loops_drive_transitions() {
    // Initialize logging
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let config = SweeperConfig {
        window_interval: Duration::from_millis(20),
        group_interval: Duration::from_millis(20),
        session_interval: Duration::from_millis(20),
        stale_order_interval: Duration::from_millis(20),
    };
    let stack = stack(4, config);

    // A campaign whose whole window is already in the past
    let now = Utc::now();
    let campaign = stack
        .flash_sale
        .create_campaign(NewFlashSale {
            product_id: Uuid::new_v4(),
            price_cents: 4_999,
            initial_stock: 10,
            limit_per_user: 1,
            starts_at: now - ChronoDuration::minutes(2),
            ends_at: now - ChronoDuration::minutes(1),
        })
        .await
        .expect("Failed to create campaign");

    stack.sweeper.start().expect("Failed to start sweeper");

    // The window loop opens and closes overdue campaigns in one pass
    tokio::time::sleep(Duration::from_millis(100)).await;

    let swept = stack
        .flash_sale
        .campaign(campaign.id)
        .await
        .expect("Failed to get campaign")
        .expect("Campaign not found");
    assert_eq!(swept.status, CampaignStatus::Ended);

    // A second start is rejected while the loops run
    let running = stack.sweeper.start();
    assert!(matches!(running, Err(SweeperError::AlreadyStarted)));

    stack.sweeper.shutdown().await;
    stack.sweeper.wait().await;

    // And so is one after shutdown
    let stopped = stack.sweeper.start();
    assert!(matches!(stopped, Err(SweeperError::AlreadyStarted)));
}
