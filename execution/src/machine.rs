//! Game lifecycle transitions.
//!
//! Each transition takes the game by mutable reference and reports what happened as a
//! [Transition]. A transition that returns an error may have partially updated the game, so the
//! ledger always runs transitions against a copy and only keeps it once the commit succeeds.

use commonware_cryptography::ed25519::PublicKey;
use qchess_types::{
    game::MAX_MOVE_HISTORY, Event, Game, GameError, GameId, GameStatus, Measurement, Move,
    MoveKind, MoveRequest, Outcome, OutcomeProposal,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::escrow::{self, Payout};
use crate::quantum;

/// Limits applied to every game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    pub min_stake: u64,
    pub max_stake: u64,
    pub min_timeout_secs: u64,
    /// Per colour.
    pub max_superposed_pieces: u8,
    /// Player-submitted moves. Collapses forced at finalization are not counted against it.
    pub max_moves: usize,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            min_stake: 1,
            max_stake: 1_000_000,
            min_timeout_secs: 60,
            max_superposed_pieces: 3,
            max_moves: 1024,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesError {
    #[error("min_stake must be positive")]
    ZeroMinStake,
    #[error("min_stake ({min}) exceeds max_stake ({max})")]
    StakeBounds { min: u64, max: u64 },
    #[error("max_moves ({got}) leaves no room for forced collapses (limit {limit})")]
    MoveLimit { got: usize, limit: usize },
}

impl Rules {
    pub fn validate(&self) -> Result<(), RulesError> {
        if self.min_stake == 0 {
            return Err(RulesError::ZeroMinStake);
        }
        if self.min_stake > self.max_stake {
            return Err(RulesError::StakeBounds {
                min: self.min_stake,
                max: self.max_stake,
            });
        }
        let limit = MAX_MOVE_HISTORY - qchess_types::board::MAX_PIECES;
        if self.max_moves > limit {
            return Err(RulesError::MoveLimit {
                got: self.max_moves,
                limit,
            });
        }
        Ok(())
    }
}

/// Events and settlement produced by one accepted transition.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Transition {
    pub events: Vec<Event>,
    pub payouts: Vec<Payout>,
}

impl Transition {
    fn event(event: Event) -> Self {
        Self {
            events: vec![event],
            payouts: Vec::new(),
        }
    }

    /// Nothing changed (collapsing a piece that is already classical).
    pub fn is_noop(&self) -> bool {
        self.events.is_empty() && self.payouts.is_empty()
    }
}

pub fn create(
    rules: &Rules,
    id: GameId,
    creator: &PublicKey,
    stake: u64,
    timeout_secs: u64,
    now: u64,
) -> Result<(Game, Transition), GameError> {
    if stake == 0 || stake < rules.min_stake || stake > rules.max_stake {
        return Err(GameError::InvalidStake {
            got: stake,
            min: rules.min_stake,
            max: rules.max_stake,
        });
    }
    if timeout_secs < rules.min_timeout_secs {
        return Err(GameError::TimeoutTooShort {
            got: timeout_secs,
            min: rules.min_timeout_secs,
        });
    }

    let mut game = Game::new(id, creator.clone(), stake, timeout_secs, now);
    game.escrow.deposit(creator, stake)?;
    let transition = Transition::event(Event::GameCreated {
        game_id: id,
        creator: creator.clone(),
        stake,
        timeout_secs,
    });
    Ok((game, transition))
}

/// The opponent joins and the game starts. The creator (white) keeps the first turn.
pub fn join(
    game: &mut Game,
    caller: &PublicKey,
    stake: u64,
    now: u64,
) -> Result<Transition, GameError> {
    match game.status {
        GameStatus::Created => {}
        GameStatus::Active => return Err(GameError::GameAlreadyActive),
        _ => return Err(GameError::GameNotActive),
    }
    if caller == &game.creator {
        return Err(GameError::CannotJoinOwnGame);
    }
    if stake != game.stake {
        return Err(GameError::StakeMismatch {
            expected: game.stake,
            got: stake,
        });
    }

    game.escrow.deposit(caller, stake)?;
    game.opponent = Some(caller.clone());
    game.status = GameStatus::Active;
    game.last_action_time = now;
    Ok(Transition::event(Event::GameJoined {
        game_id: game.id,
        opponent: caller.clone(),
    }))
}

pub fn submit_move(
    rules: &Rules,
    game: &mut Game,
    caller: &PublicKey,
    request: &MoveRequest,
    now: u64,
) -> Result<Transition, GameError> {
    if game.status != GameStatus::Active {
        return Err(GameError::GameNotActive);
    }
    if caller != &game.current_turn {
        return Err(GameError::NotYourTurn);
    }
    let color = game.color_of(caller).ok_or(GameError::NotAPlayer)?;
    let next_turn = game
        .other_player(caller)
        .cloned()
        .ok_or(GameError::NotAPlayer)?;
    if game.moves.len() >= rules.max_moves {
        return Err(GameError::MoveLimitReached {
            max: rules.max_moves,
        });
    }

    let mut events = Vec::new();
    let kind = match request {
        MoveRequest::Standard { from, to } => {
            let captured = quantum::move_classical(&mut game.board, color, *from, *to)?;
            MoveKind::Standard {
                from: *from,
                to: *to,
                captured,
            }
        }
        MoveRequest::QuantumSplit {
            from,
            positions,
            weights,
        } => {
            quantum::split(
                &mut game.board,
                color,
                *from,
                positions,
                weights,
                rules.max_superposed_pieces,
            )?;
            MoveKind::QuantumSplit {
                from: *from,
                possible_positions: positions.clone(),
                weights: weights.clone(),
            }
        }
        MoveRequest::Collapse { target, seed } => {
            let Some(collapsed) = quantum::collapse(&mut game.board, *target, *seed)? else {
                return Ok(Transition::default());
            };
            events.push(Event::PieceCollapsed {
                game_id: game.id,
                actor: caller.clone(),
                origin: collapsed.origin,
                resolved: collapsed.resolved,
                forced: false,
            });
            MoveKind::Collapse {
                target: *target,
                seed: *seed,
                resolved: collapsed.resolved,
                captured: collapsed.captured,
                forced: false,
            }
        }
        MoveRequest::Measure { positions, seed } => {
            let measured = quantum::measure(&mut game.board, positions, *seed)?;
            events.extend(measured.iter().map(|collapsed| Event::PieceCollapsed {
                game_id: game.id,
                actor: caller.clone(),
                origin: collapsed.origin,
                resolved: collapsed.resolved,
                forced: false,
            }));
            MoveKind::Measure {
                seed: *seed,
                measured: measured
                    .iter()
                    .map(|collapsed| Measurement {
                        origin: collapsed.origin,
                        resolved: collapsed.resolved,
                        captured: collapsed.captured,
                    })
                    .collect(),
            }
        }
    };

    events.insert(0, record_move(game, caller, kind, now));
    game.current_turn = next_turn;
    game.last_action_time = now;
    game.pending_outcome = None;
    Ok(Transition {
        events,
        payouts: Vec::new(),
    })
}

/// The player not on turn wins once the player on turn has been idle for longer than the
/// game's timeout.
pub fn claim_timeout(
    game: &mut Game,
    caller: &PublicKey,
    now: u64,
) -> Result<Transition, GameError> {
    if game.status != GameStatus::Active {
        return Err(GameError::GameNotActive);
    }
    if !game.is_participant(caller) {
        return Err(GameError::NotAPlayer);
    }
    let deadline = game.last_action_time.saturating_add(game.timeout_secs);
    if caller == &game.current_turn || now <= deadline {
        return Err(GameError::TimeoutNotElapsed);
    }
    finalize(game, GameStatus::Timeout, Settlement::Award(caller), caller, now)
}

/// Record a participant's proposed outcome, finalizing once both participants agree. An
/// `arbiter`, when configured, finalizes on its own say.
pub fn complete(
    game: &mut Game,
    caller: &PublicKey,
    outcome: &Outcome,
    arbiter: Option<&PublicKey>,
    now: u64,
) -> Result<Transition, GameError> {
    if game.status != GameStatus::Active {
        return Err(GameError::GameNotActive);
    }
    let is_arbiter = arbiter == Some(caller);
    if !is_arbiter && !game.is_participant(caller) {
        return Err(GameError::NotAPlayer);
    }
    if let Outcome::Winner(winner) = outcome {
        if !game.is_participant(winner) {
            return Err(GameError::InvalidWinner);
        }
    }

    let agreed = match &game.pending_outcome {
        Some(pending) if &pending.proposer != caller && &pending.outcome == outcome => {
            Some(pending.proposer.clone())
        }
        _ => None,
    };
    let initiator = match agreed {
        _ if is_arbiter => game.creator.clone(),
        Some(proposer) => proposer,
        None => {
            game.pending_outcome = Some(OutcomeProposal {
                proposer: caller.clone(),
                outcome: outcome.clone(),
            });
            return Ok(Transition::event(Event::OutcomeProposed {
                game_id: game.id,
                proposer: caller.clone(),
                outcome: outcome.clone(),
            }));
        }
    };

    let settlement = match outcome {
        Outcome::Winner(winner) => Settlement::Award(winner),
        Outcome::Draw => Settlement::Split {
            initiator: &initiator,
        },
    };
    let status = match outcome {
        Outcome::Winner(_) => GameStatus::Completed,
        Outcome::Draw => GameStatus::Draw,
    };
    finalize(game, status, settlement, caller, now)
}

/// Withdraw an unjoined game and refund the creator.
pub fn cancel(game: &mut Game, caller: &PublicKey) -> Result<Transition, GameError> {
    match game.status {
        GameStatus::Created => {}
        GameStatus::Active => return Err(GameError::GameAlreadyActive),
        _ => return Err(GameError::GameNotActive),
    }
    if caller != &game.creator {
        return Err(GameError::NotAPlayer);
    }

    let payouts = escrow::refund(&mut game.escrow, &game.creator)?;
    game.status = GameStatus::Cancelled;
    let refund = payouts.iter().map(|payout| payout.amount).sum();
    Ok(Transition {
        events: vec![Event::GameCancelled {
            game_id: game.id,
            actor: caller.clone(),
            refund,
        }],
        payouts,
    })
}

fn record_move(game: &mut Game, mover: &PublicKey, kind: MoveKind, now: u64) -> Event {
    let index = game.moves.len() as u32;
    game.moves.push(Move {
        mover: mover.clone(),
        timestamp: now,
        kind: kind.clone(),
    });
    Event::MoveSubmitted {
        game_id: game.id,
        mover: mover.clone(),
        index,
        kind,
    }
}

/// Collapse superposed pieces, always taking the first one in board order, until none remain.
/// Each collapse is seeded with the number of moves recorded before it.
fn force_collapse(
    game: &mut Game,
    finalizer: &PublicKey,
    now: u64,
) -> Result<Vec<Event>, GameError> {
    let mut events = Vec::new();
    while let Some(square) = game.board.superposed_squares().first().copied() {
        let seed = game.moves.len() as u64;
        let Some(collapsed) = quantum::collapse(&mut game.board, square, seed)? else {
            break;
        };
        let kind = MoveKind::Collapse {
            target: square,
            seed,
            resolved: collapsed.resolved,
            captured: collapsed.captured,
            forced: true,
        };
        events.push(record_move(game, finalizer, kind, now));
        events.push(Event::PieceCollapsed {
            game_id: game.id,
            actor: finalizer.clone(),
            origin: collapsed.origin,
            resolved: collapsed.resolved,
            forced: true,
        });
    }
    Ok(events)
}

/// How a finished game's pool is paid out.
#[derive(Clone, Copy, Debug)]
enum Settlement<'a> {
    Award(&'a PublicKey),
    /// Even split, with any odd unit going to `initiator`.
    Split { initiator: &'a PublicKey },
}

/// Collapse any remaining superpositions, then settle the escrow and close the game. Forced
/// collapses are recorded as moves by `finalizer`.
fn finalize(
    game: &mut Game,
    status: GameStatus,
    settlement: Settlement<'_>,
    finalizer: &PublicKey,
    now: u64,
) -> Result<Transition, GameError> {
    let mut events = force_collapse(game, finalizer, now)?;

    let (payouts, winner) = match settlement {
        Settlement::Award(winner) => (escrow::award(&mut game.escrow, winner)?, Some(winner)),
        Settlement::Split { initiator } => {
            let other = game
                .other_player(initiator)
                .cloned()
                .ok_or(GameError::NotAPlayer)?;
            (escrow::split(&mut game.escrow, initiator, &other)?, None)
        }
    };

    game.status = status;
    game.winner = winner.cloned();
    game.pending_outcome = None;
    game.last_action_time = now;
    events.push(match (status, winner) {
        (GameStatus::Timeout, Some(winner)) => Event::GameTimedOut {
            game_id: game.id,
            winner: winner.clone(),
        },
        _ => Event::GameCompleted {
            game_id: game.id,
            actor: finalizer.clone(),
            status,
            winner: winner.cloned(),
        },
    });
    Ok(Transition { events, payouts })
}
