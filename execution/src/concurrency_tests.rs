//! Concurrent operations against one ledger: racing moves on the same game are serialized,
//! independent games proceed side by side and id allocation never repeats.

use crate::mocks::{create_account_keypair, MockTreasury, RecordingSink};
use crate::{Ledger, LedgerConfig, LedgerError, Memory};
use commonware_cryptography::ed25519::PublicKey;
use qchess_types::{GameError, GameStatus, MoveRequest, Position};
use std::collections::BTreeSet;

const STAKE: u64 = 50;
const TIMEOUT: u64 = 120;
const T0: u64 = 1_000;

type TestLedger = Ledger<Memory, MockTreasury, RecordingSink>;

fn ledger() -> TestLedger {
    Ledger::new(
        LedgerConfig::default(),
        Memory::default(),
        MockTreasury::default(),
        RecordingSink::default(),
    )
}

fn standard(from: &str, to: &str) -> MoveRequest {
    let from: Position = from.parse().expect("valid square");
    let to: Position = to.parse().expect("valid square");
    MoveRequest::Standard { from, to }
}

async fn started(ledger: &TestLedger, white: &PublicKey, black: &PublicKey) -> u64 {
    let events = ledger
        .create_game(white, STAKE, TIMEOUT, T0)
        .await
        .expect("create");
    let game_id = events[0].game_id().expect("game id");
    ledger
        .join_game(game_id, black, STAKE, T0)
        .await
        .expect("join");
    game_id
}

#[tokio::test]
async fn test_racing_moves_for_one_turn() {
    let ledger = ledger();
    let (_, alice) = create_account_keypair(1);
    let (_, bob) = create_account_keypair(2);
    let game_id = started(&ledger, &alice, &bob).await;

    let king_pawn = standard("e2", "e4");
    let queen_pawn = standard("d2", "d4");
    let (first, second) = futures::join!(
        ledger.submit_move(game_id, &alice, &king_pawn, T0 + 1),
        ledger.submit_move(game_id, &alice, &queen_pawn, T0 + 1),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    let rejected = results
        .iter()
        .find_map(|result| result.as_ref().err())
        .expect("one rejection");
    assert!(matches!(
        rejected,
        LedgerError::Game(GameError::NotYourTurn)
    ));

    let game = ledger.game(game_id).await.expect("game");
    assert_eq!(game.moves.len(), 1);
    assert_eq!(game.current_turn, bob);
}

#[tokio::test]
async fn test_independent_games_progress_together() {
    let ledger = ledger();
    let (_, alice) = create_account_keypair(1);
    let (_, bob) = create_account_keypair(2);
    let (_, carol) = create_account_keypair(3);
    let (_, dave) = create_account_keypair(4);
    let first = started(&ledger, &alice, &bob).await;
    let second = started(&ledger, &carol, &dave).await;

    let opening = standard("e2", "e4");
    let reply = standard("c7", "c5");
    let (a, b) = futures::join!(
        ledger.submit_move(first, &alice, &opening, T0 + 1),
        ledger.submit_move(second, &carol, &opening, T0 + 1),
    );
    a.expect("first game move");
    b.expect("second game move");

    let (a, b) = futures::join!(
        ledger.submit_move(first, &bob, &reply, T0 + 2),
        ledger.claim_timeout(second, &carol, T0 + 1 + TIMEOUT + 1),
    );
    a.expect("first game reply");
    b.expect("second game timeout");

    let first = ledger.game(first).await.expect("game");
    let second = ledger.game(second).await.expect("game");
    assert_eq!(first.status, GameStatus::Active);
    assert_eq!(first.moves.len(), 2);
    assert_eq!(second.status, GameStatus::Timeout);
    assert_eq!(ledger.balance(&carol).await.expect("balance"), 2 * STAKE);
    assert_eq!(ledger.balance(&alice).await.expect("balance"), 0);
}

#[tokio::test]
async fn test_concurrent_creates_get_distinct_ids() {
    let ledger = ledger();
    let creators: Vec<PublicKey> = (1..=3).map(|seed| create_account_keypair(seed).1).collect();

    let (a, b, c) = futures::join!(
        ledger.create_game(&creators[0], STAKE, TIMEOUT, T0),
        ledger.create_game(&creators[1], STAKE, TIMEOUT, T0),
        ledger.create_game(&creators[2], STAKE, TIMEOUT, T0),
    );
    let ids: BTreeSet<u64> = [a, b, c]
        .into_iter()
        .map(|events| events.expect("create")[0].game_id().expect("game id"))
        .collect();
    assert_eq!(ids, BTreeSet::from([0, 1, 2]));

    let mut owners = BTreeSet::new();
    for id in &ids {
        let game = ledger.game(*id).await.expect("game");
        assert_eq!(game.status, GameStatus::Created);
        owners.insert(game.creator);
    }
    assert_eq!(owners, creators.into_iter().collect());
}

#[tokio::test]
async fn test_racing_timeout_claims_settle_once() {
    let ledger = ledger();
    let (_, alice) = create_account_keypair(1);
    let (_, bob) = create_account_keypair(2);
    let game_id = started(&ledger, &alice, &bob).await;
    let late = T0 + TIMEOUT + 1;

    let (first, second) = futures::join!(
        ledger.claim_timeout(game_id, &bob, late),
        ledger.claim_timeout(game_id, &bob, late),
    );
    let results = [first, second];
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results.iter().any(|result| matches!(
        result,
        Err(LedgerError::Game(GameError::GameNotActive))
    )));
    assert_eq!(ledger.balance(&bob).await.expect("balance"), 2 * STAKE);
}
