//! The game ledger service.
//!
//! [Ledger] owns every game record. Operations on the same game are serialized through a
//! per-game lock, while operations on different games only meet briefly at the store lock during
//! commit. Each accepted operation commits its game record, counter and balance changes in one
//! [State::apply] batch, and the cached record is only replaced once that batch succeeds.

use commonware_codec::Encode;
use commonware_cryptography::{ed25519::PublicKey, Digestible};
use commonware_utils::hex;
use futures::lock::Mutex;
use qchess_types::{
    Event, Game, GameError, GameId, GameInvariantError, Instruction, Key, MoveRequest, Outcome,
    Transaction, Value,
};
use std::{collections::BTreeMap, future::Future, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::escrow::Payout;
use crate::machine::{self, Rules, Transition};
use crate::state::{
    load_account, load_balance, load_counter, load_game, validate_and_increment_nonce, State,
    Status,
};

#[derive(Debug, Error)]
#[error("transfer of {amount} failed: {reason}")]
pub struct TransferError {
    pub amount: u64,
    pub reason: String,
}

/// Moves value out of the ledger to a player.
pub trait Treasury {
    fn transfer(
        &self,
        to: &PublicKey,
        amount: u64,
    ) -> impl Future<Output = Result<(), TransferError>>;
}

/// Receives the events of every committed operation.
pub trait EventSink {
    fn publish(&self, events: &[Event]);
}

impl EventSink for () {
    fn publish(&self, _: &[Event]) {}
}

/// Logs each event at `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, events: &[Event]) {
        for event in events {
            info!(
                game = ?event.game_id(),
                actor = ?event.actor(),
                kind = event.name(),
                "event"
            );
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("invariant violated: {0}")]
    Invariant(#[from] GameInvariantError),
    #[error("balance overflow")]
    BalanceOverflow,
    #[error("game id space exhausted")]
    CounterExhausted,
}

impl LedgerError {
    /// The domain rejection, if that is what this is.
    pub fn game_error(&self) -> Option<&GameError> {
        match self {
            Self::Game(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LedgerConfig {
    pub rules: Rules,
    /// Account allowed to declare outcomes on its own.
    pub arbiter: Option<PublicKey>,
}

type Slot = Arc<Mutex<Game>>;

pub struct Ledger<S: State, T: Treasury, E: EventSink = TracingSink> {
    config: LedgerConfig,
    store: Mutex<S>,
    games: Mutex<BTreeMap<GameId, Slot>>,
    treasury: T,
    sink: E,
}

impl<S: State, T: Treasury, E: EventSink> Ledger<S, T, E> {
    pub fn new(config: LedgerConfig, store: S, treasury: T, sink: E) -> Self {
        Self {
            config,
            store: Mutex::new(store),
            games: Mutex::new(BTreeMap::new()),
            treasury,
            sink,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub async fn create_game(
        &self,
        creator: &PublicKey,
        stake: u64,
        timeout_secs: u64,
        now: u64,
    ) -> Result<Vec<Event>, LedgerError> {
        let (game, events) = {
            let mut store = self.store.lock().await;
            let id = load_counter(&*store).await?;
            let (game, transition) =
                machine::create(&self.config.rules, id, creator, stake, timeout_secs, now)?;
            game.validate_invariants()?;
            let next = id.checked_add(1).ok_or(LedgerError::CounterExhausted)?;
            let mut events = transition.events;
            events.extend(commit(&mut *store, &game, Some(next), &transition.payouts).await?);
            (game, events)
        };
        debug!(game = game.id, stake, timeout_secs, "game created");
        // A concurrent lookup may already have loaded the committed record.
        self.games
            .lock()
            .await
            .entry(game.id)
            .or_insert_with(|| Arc::new(Mutex::new(game)));
        self.sink.publish(&events);
        Ok(events)
    }

    pub async fn join_game(
        &self,
        game_id: GameId,
        caller: &PublicKey,
        stake: u64,
        now: u64,
    ) -> Result<Vec<Event>, LedgerError> {
        self.transition(game_id, |game| machine::join(game, caller, stake, now))
            .await
    }

    pub async fn submit_move(
        &self,
        game_id: GameId,
        caller: &PublicKey,
        request: &MoveRequest,
        now: u64,
    ) -> Result<Vec<Event>, LedgerError> {
        let rules = &self.config.rules;
        self.transition(game_id, |game| {
            machine::submit_move(rules, game, caller, request, now)
        })
        .await
    }

    pub async fn claim_timeout(
        &self,
        game_id: GameId,
        caller: &PublicKey,
        now: u64,
    ) -> Result<Vec<Event>, LedgerError> {
        self.transition(game_id, |game| machine::claim_timeout(game, caller, now))
            .await
    }

    pub async fn complete(
        &self,
        game_id: GameId,
        caller: &PublicKey,
        outcome: &Outcome,
        now: u64,
    ) -> Result<Vec<Event>, LedgerError> {
        let arbiter = self.config.arbiter.as_ref();
        self.transition(game_id, |game| {
            machine::complete(game, caller, outcome, arbiter, now)
        })
        .await
    }

    pub async fn cancel(
        &self,
        game_id: GameId,
        caller: &PublicKey,
    ) -> Result<Vec<Event>, LedgerError> {
        self.transition(game_id, |game| machine::cancel(game, caller))
            .await
    }

    /// Pay out the caller's whole balance through the treasury.
    ///
    /// The balance is cleared and committed before the transfer is attempted. A failed transfer
    /// puts the balance back.
    pub async fn withdraw(&self, player: &PublicKey) -> Result<Vec<Event>, LedgerError> {
        let mut store = self.store.lock().await;
        let amount = load_balance(&*store, player).await?;
        if amount == 0 {
            return Err(GameError::NothingToWithdraw.into());
        }
        store
            .apply(vec![(Key::Balance(player.clone()), Status::Delete)])
            .await?;

        if let Err(err) = self.treasury.transfer(player, amount).await {
            warn!(player = ?player, amount, ?err, "transfer failed; restoring balance");
            store
                .apply(vec![(
                    Key::Balance(player.clone()),
                    Status::Update(Value::Balance(amount)),
                )])
                .await?;
            return Err(err.into());
        }
        drop(store);

        info!(player = ?player, amount, "withdrawn");
        let events = vec![Event::Withdrawn {
            player: player.clone(),
            amount,
        }];
        self.sink.publish(&events);
        Ok(events)
    }

    /// Verify `transaction`, consume its nonce, then run its instruction.
    ///
    /// Once the nonce is consumed it stays consumed, even if the instruction is rejected.
    pub async fn execute(
        &self,
        transaction: &Transaction,
        now: u64,
    ) -> Result<Vec<Event>, LedgerError> {
        if !transaction.verify() {
            return Err(GameError::InvalidSignature.into());
        }
        {
            let mut store = self.store.lock().await;
            let mut account = load_account(&*store, &transaction.public).await?;
            validate_and_increment_nonce(&mut account, transaction.nonce)?;
            store
                .insert(
                    Key::Account(transaction.public.clone()),
                    Value::Account(account),
                )
                .await?;
        }
        debug!(
            tx = hex(&transaction.digest().encode()),
            public = ?transaction.public,
            nonce = transaction.nonce,
            "transaction admitted"
        );

        let caller = &transaction.public;
        match &transaction.instruction {
            Instruction::CreateGame {
                stake,
                timeout_secs,
            } => self.create_game(caller, *stake, *timeout_secs, now).await,
            Instruction::JoinGame { game_id, stake } => {
                self.join_game(*game_id, caller, *stake, now).await
            }
            Instruction::SubmitMove { game_id, request } => {
                self.submit_move(*game_id, caller, request, now).await
            }
            Instruction::ClaimTimeout { game_id } => {
                self.claim_timeout(*game_id, caller, now).await
            }
            Instruction::Complete { game_id, outcome } => {
                self.complete(*game_id, caller, outcome, now).await
            }
            Instruction::Cancel { game_id } => self.cancel(*game_id, caller).await,
            Instruction::Withdraw => self.withdraw(caller).await,
        }
    }

    /// Snapshot of a game record.
    pub async fn game(&self, game_id: GameId) -> Result<Game, LedgerError> {
        let slot = self.slot(game_id).await?;
        let game = slot.lock().await.clone();
        Ok(game)
    }

    pub async fn balance(&self, player: &PublicKey) -> Result<u64, LedgerError> {
        let store = self.store.lock().await;
        Ok(load_balance(&*store, player).await?)
    }

    pub async fn nonce(&self, player: &PublicKey) -> Result<u64, LedgerError> {
        let store = self.store.lock().await;
        Ok(crate::state::nonce(&*store, player).await?)
    }

    /// Release the store. Any cached game records are dropped.
    pub fn into_store(self) -> S {
        self.store.into_inner()
    }

    /// The lock guarding `game_id`, loading the record from the store on first use.
    async fn slot(&self, game_id: GameId) -> Result<Slot, LedgerError> {
        let mut games = self.games.lock().await;
        if let Some(slot) = games.get(&game_id) {
            return Ok(slot.clone());
        }
        let game = {
            let store = self.store.lock().await;
            load_game(&*store, game_id).await?
        }
        .ok_or(GameError::GameNotFound(game_id))?;
        let slot = Arc::new(Mutex::new(game));
        games.insert(game_id, slot.clone());
        Ok(slot)
    }

    async fn transition<F>(&self, game_id: GameId, apply: F) -> Result<Vec<Event>, LedgerError>
    where
        F: FnOnce(&mut Game) -> Result<Transition, GameError>,
    {
        let slot = self.slot(game_id).await?;
        let mut game = slot.lock().await;
        let mut next = game.clone();
        let transition = match apply(&mut next) {
            Ok(transition) => transition,
            Err(err) => {
                debug!(game = game_id, ?err, "operation rejected");
                return Err(err.into());
            }
        };
        if transition.is_noop() {
            return Ok(Vec::new());
        }
        next.validate_invariants()?;

        let mut events = transition.events;
        {
            let mut store = self.store.lock().await;
            events.extend(commit(&mut *store, &next, None, &transition.payouts).await?);
        }
        debug!(
            game = game_id,
            status = next.status.as_str(),
            moves = next.moves.len(),
            "transition committed"
        );
        *game = next;
        drop(game);

        self.sink.publish(&events);
        Ok(events)
    }
}

/// Write `game`, the game counter (when allocating) and the credited balances as one batch.
async fn commit<S: State>(
    store: &mut S,
    game: &Game,
    counter: Option<GameId>,
    payouts: &[Payout],
) -> Result<Vec<Event>, LedgerError> {
    let mut balances: BTreeMap<PublicKey, u64> = BTreeMap::new();
    let mut credited = Vec::new();
    for payout in payouts.iter().filter(|payout| payout.amount > 0) {
        let current = match balances.get(&payout.recipient) {
            Some(balance) => *balance,
            None => load_balance(&*store, &payout.recipient).await?,
        };
        let balance = current
            .checked_add(payout.amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        balances.insert(payout.recipient.clone(), balance);
        info!(
            game = game.id,
            player = ?payout.recipient,
            amount = payout.amount,
            balance,
            "credited"
        );
        credited.push(Event::Credited {
            game_id: game.id,
            player: payout.recipient.clone(),
            amount: payout.amount,
            balance,
        });
    }

    let mut changes = vec![(Key::Game(game.id), Status::Update(Value::Game(game.clone())))];
    if let Some(next) = counter {
        changes.push((Key::GameCounter, Status::Update(Value::GameCounter(next))));
    }
    changes.extend(
        balances
            .into_iter()
            .map(|(player, balance)| (Key::Balance(player), Status::Update(Value::Balance(balance)))),
    );
    if let Err(err) = store.apply(changes).await {
        warn!(game = game.id, ?err, "commit failed");
        return Err(err.into());
    }
    Ok(credited)
}
