#![allow(non_snake_case)]

use mega_lottery_client::{
    ClientConfig,
    Error,
    GameStateStore,
    Intent,
    Lifecycle,
    RefreshOrdering,
    deployment::DeploymentArtifact,
    ledger::Address,
    logging::{
        LoggingConfig,
        init_tracing,
    },
    store::DegradedReason,
    test_helpers::{
        ALICE,
        CONTRACT_ADDRESS,
        FakeLedger,
        FinishedRoundFixture,
        LOCAL_NETWORK_ID,
        LedgerState,
        ManualScheduler,
        TestContext,
    },
    units::{
        Amount,
        TICKET_PRICE,
    },
};
use std::sync::Arc;
use tempdir::TempDir;

fn ether(amount: u64) -> Amount {
    Amount::from_display_units(amount)
}

#[tokio::test]
async fn session__buy_tickets_end_round_and_see_winner() {
    let _guard = init_tracing(&LoggingConfig::default());
    let ctx = TestContext::new().await;
    let submission = ctx.submission();

    // given
    submission.buy_ticket(&[1, 2, 3, 4, 5, 6]).await.unwrap();
    submission
        .buy_ticket_from_input(&["10", "20", "30", "40", "41", "42"])
        .await
        .unwrap();
    let snapshot = ctx.store().snapshot();
    assert_eq!(snapshot.tickets.len(), 2);
    assert_eq!(snapshot.jackpot, ether(2));
    assert_eq!(snapshot.active_account_balance, ether(98));

    // when
    ctx.ledger().update(|state| {
        state.game_ended = true;
        state.next_winners = vec![ALICE.to_string()];
    });
    let early = submission.end_game().await;
    submission.advance_block().await.unwrap();
    ctx.ledger().update(|state| state.number_drawable = true);
    submission.end_game().await.unwrap();

    // then
    assert!(matches!(early, Err(Error::NotYetDrawable)));
    let snapshot = ctx.store().snapshot();
    assert!(!snapshot.game_ended);
    assert!(snapshot.tickets.is_empty());
    assert_eq!(snapshot.jackpot, Amount::ZERO);
    assert_eq!(snapshot.previous_winners.len(), 1);
    let winner = &snapshot.previous_winners[0];
    assert_eq!(winner.round_index, 0);
    assert_eq!(winner.winner_handle, ALICE);
    assert_eq!(winner.winner_count, 1);
    assert_eq!(winner.jackpot_at_draw, TICKET_PRICE.checked_add(TICKET_PRICE).unwrap());
    assert!(!ctx.store().error_state().shown());
}

#[tokio::test]
async fn session__rejected_write__error_modal_until_dismissed() {
    // given
    let ctx = TestContext::new().await;
    let mut errors = ctx.store().subscribe_errors();
    ctx.ledger().update(|state| state.reject_writes = true);

    // when
    let result = ctx.submission().buy_ticket(&[4, 8, 15, 16, 23, 42]).await;
    errors.changed().await.unwrap();

    // then
    assert!(matches!(
        result,
        Err(Error::WriteRejected {
            intent: Intent::BuyTicket,
            ..
        })
    ));
    let shown = errors.borrow_and_update().clone();
    assert_eq!(shown.header(), "Buy Ticket rejected - no data was sent");
    assert_eq!(
        shown.body(),
        "Please try again if this was not your intention!"
    );

    ctx.store().dismiss_error();
    errors.changed().await.unwrap();
    assert!(!errors.borrow().shown());
}

#[tokio::test]
async fn session__ticks_pick_up_changes_made_elsewhere() {
    // given
    let ctx = TestContext::new().await;
    let mut updates = ctx.store().subscribe();
    updates.borrow_and_update();

    // when
    ctx.ledger().update(|state| {
        state.jackpot = ether(40);
        state.block_number = 30;
        state.finished_rounds.push(FinishedRoundFixture {
            jackpot: ether(12),
            draw_block: 28,
            winners: vec!["0xcafe".to_string(), "0xbeef".to_string()],
        });
    });
    ctx.scheduler().tick();
    updates.changed().await.unwrap();

    // then
    let snapshot = updates.borrow().clone();
    assert_eq!(snapshot.jackpot, ether(40));
    assert_eq!(snapshot.current_block, 30);
    let handles: Vec<_> = snapshot
        .previous_winners
        .iter()
        .map(|winner| winner.winner_handle.as_str())
        .collect();
    assert_eq!(handles, vec!["0xcafe", "0xbeef"]);
    ctx.store().teardown();
}

#[tokio::test]
async fn session__config_file_limits_winners_shown() {
    // given
    let dir = TempDir::new("client").unwrap();
    let path = dir.path().join("client.json");
    std::fs::write(
        &path,
        r#"{ "winners_to_display": 1, "refresh_ordering": "last_arrival_wins" }"#,
    )
    .unwrap();
    let config = ClientConfig::from_json_file(&path).unwrap();
    let ledger = FakeLedger::new();
    ledger.update(|state| {
        state.finished_rounds = vec![
            FinishedRoundFixture {
                jackpot: ether(1),
                draw_block: 5,
                winners: vec!["0xold".to_string()],
            },
            FinishedRoundFixture {
                jackpot: ether(2),
                draw_block: 9,
                winners: vec!["0xnew".to_string(), "0xnewer".to_string()],
            },
        ]
    });

    // when
    let ctx = TestContext::with_config(ledger, config).await;

    // then
    assert_eq!(
        ctx.store().config().refresh_ordering,
        RefreshOrdering::LastArrivalWins
    );
    let winners = &ctx.store().snapshot().previous_winners;
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].winner_handle, "0xnew");
    assert_eq!(winners[0].winner_count, 2);
}

#[tokio::test]
async fn session__artifact_without_this_network__degrades_store() {
    // given
    let dir = TempDir::new("deployments").unwrap();
    let path = dir.path().join("Lottery.json");
    let mut artifact = DeploymentArtifact::new("Lottery");
    artifact.record(1, &Address::new(CONTRACT_ADDRESS));
    artifact.save(&path).unwrap();
    let ledger = Arc::new(FakeLedger::with_state(LedgerState {
        deployments: DeploymentArtifact::load(&path).unwrap(),
        ..LedgerState::default()
    }));
    let store =
        GameStateStore::with_scheduler(ledger.clone(), ManualScheduler::new(), Default::default());

    // when
    let result = store.initialize().await;

    // then
    assert!(matches!(
        result,
        Err(Error::DeploymentNotFound { network_id }) if network_id == LOCAL_NETWORK_ID
    ));
    assert_eq!(
        store.lifecycle(),
        Lifecycle::Degraded(DegradedReason::NoDeployment)
    );
    assert!(!store.snapshot().is_populated());
}
