//! Match scripts.
//!
//! A script names its players by key seed and lists the actions they take, each at an offset
//! from the script's start time. Every step is signed with the player's key at its current nonce
//! and run through [Ledger::execute]. A step marked `rejected` must be refused by the ledger:
//! the refusal is reported and the script goes on.

use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    Signer,
};
use qchess_execution::{EventSink, Ledger, LedgerError, State, Treasury};
use qchess_types::{
    Event, GameId, Instruction, MoveRequest, Outcome, Position, Transaction,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Clone, Debug, Deserialize)]
pub struct Script {
    /// Player name to key seed.
    pub players: BTreeMap<String, u64>,
    /// Unix time the step offsets count from.
    #[serde(default)]
    pub start: u64,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Step {
    pub player: String,
    /// Seconds after [Script::start].
    #[serde(default)]
    pub at: u64,
    #[serde(default)]
    pub rejected: bool,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Create {
        stake: u64,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Join {
        game: GameId,
        stake: u64,
    },
    Move {
        game: GameId,
        from: Position,
        to: Position,
    },
    Split {
        game: GameId,
        from: Position,
        positions: Vec<Position>,
        weights: Vec<u8>,
    },
    Collapse {
        game: GameId,
        target: Position,
        seed: u64,
    },
    Measure {
        game: GameId,
        positions: Vec<Position>,
        seed: u64,
    },
    ClaimTimeout {
        game: GameId,
    },
    Complete {
        game: GameId,
        outcome: ScriptOutcome,
    },
    Cancel {
        game: GameId,
    },
    Withdraw,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptOutcome {
    Draw,
    /// Names the winning player.
    Winner(String),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Join { .. } => "join",
            Self::Move { .. } => "move",
            Self::Split { .. } => "split",
            Self::Collapse { .. } => "collapse",
            Self::Measure { .. } => "measure",
            Self::ClaimTimeout { .. } => "claim_timeout",
            Self::Complete { .. } => "complete",
            Self::Cancel { .. } => "cancel",
            Self::Withdraw => "withdraw",
        }
    }

    fn instruction(
        &self,
        players: &BTreeMap<String, PublicKey>,
        default_timeout_secs: u64,
    ) -> Result<Instruction, ScriptError> {
        Ok(match self {
            Self::Create {
                stake,
                timeout_secs,
            } => Instruction::CreateGame {
                stake: *stake,
                timeout_secs: timeout_secs.unwrap_or(default_timeout_secs),
            },
            Self::Join { game, stake } => Instruction::JoinGame {
                game_id: *game,
                stake: *stake,
            },
            Self::Move { game, from, to } => Instruction::SubmitMove {
                game_id: *game,
                request: MoveRequest::Standard {
                    from: *from,
                    to: *to,
                },
            },
            Self::Split {
                game,
                from,
                positions,
                weights,
            } => Instruction::SubmitMove {
                game_id: *game,
                request: MoveRequest::QuantumSplit {
                    from: *from,
                    positions: positions.clone(),
                    weights: weights.clone(),
                },
            },
            Self::Collapse { game, target, seed } => Instruction::SubmitMove {
                game_id: *game,
                request: MoveRequest::Collapse {
                    target: *target,
                    seed: *seed,
                },
            },
            Self::Measure {
                game,
                positions,
                seed,
            } => Instruction::SubmitMove {
                game_id: *game,
                request: MoveRequest::Measure {
                    positions: positions.clone(),
                    seed: *seed,
                },
            },
            Self::ClaimTimeout { game } => Instruction::ClaimTimeout { game_id: *game },
            Self::Complete { game, outcome } => Instruction::Complete {
                game_id: *game,
                outcome: match outcome {
                    ScriptOutcome::Draw => Outcome::Draw,
                    ScriptOutcome::Winner(name) => Outcome::Winner(
                        players
                            .get(name)
                            .cloned()
                            .ok_or_else(|| ScriptError::UnknownPlayer(name.clone()))?,
                    ),
                },
            },
            Self::Cancel { game } => Instruction::Cancel { game_id: *game },
            Self::Withdraw => Instruction::Withdraw,
        })
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("unknown player: {0}")]
    UnknownPlayer(String),
    #[error("step {step} ({action}) failed: {source}")]
    Failed {
        step: usize,
        action: &'static str,
        #[source]
        source: LedgerError,
    },
    #[error("step {step} ({action}) was expected to be rejected")]
    UnexpectedSuccess { step: usize, action: &'static str },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Clone, Debug)]
pub struct StepReport {
    pub step: usize,
    pub player: String,
    pub action: &'static str,
    pub events: Vec<Event>,
    /// Why the ledger refused the step, when it was expected to.
    pub rejection: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct MatchReport {
    pub players: BTreeMap<String, PublicKey>,
    /// Games created by the script, in creation order.
    pub games: Vec<GameId>,
    pub steps: Vec<StepReport>,
}

/// Sign and execute every step of `script` against `ledger`.
pub async fn run_script<S: State, T: Treasury, E: EventSink>(
    ledger: &Ledger<S, T, E>,
    script: &Script,
    default_timeout_secs: u64,
) -> Result<MatchReport, ScriptError> {
    let signers: BTreeMap<&str, PrivateKey> = script
        .players
        .iter()
        .map(|(name, seed)| (name.as_str(), PrivateKey::from_seed(*seed)))
        .collect();
    let mut report = MatchReport {
        players: signers
            .iter()
            .map(|(name, signer)| (name.to_string(), signer.public_key()))
            .collect(),
        ..Default::default()
    };

    for (step, entry) in script.steps.iter().enumerate() {
        let action = entry.action.name();
        let signer = signers
            .get(entry.player.as_str())
            .ok_or_else(|| ScriptError::UnknownPlayer(entry.player.clone()))?;
        let instruction = entry
            .action
            .instruction(&report.players, default_timeout_secs)?;
        let nonce = ledger.nonce(&signer.public_key()).await?;
        let transaction = Transaction::sign(signer, nonce, instruction);
        let now = script.start.saturating_add(entry.at);
        debug!(step, player = %entry.player, action, nonce, now, "executing step");

        let (events, rejection) = match (ledger.execute(&transaction, now).await, entry.rejected) {
            (Ok(events), false) => (events, None),
            (Ok(_), true) => return Err(ScriptError::UnexpectedSuccess { step, action }),
            (Err(LedgerError::Game(err)), true) => {
                info!(step, player = %entry.player, action, %err, "step rejected");
                (Vec::new(), Some(err.to_string()))
            }
            (Err(source), _) => {
                return Err(ScriptError::Failed {
                    step,
                    action,
                    source,
                })
            }
        };
        report.games.extend(events.iter().filter_map(|event| match event {
            Event::GameCreated { game_id, .. } => Some(*game_id),
            _ => None,
        }));
        report.steps.push(StepReport {
            step,
            player: entry.player.clone(),
            action,
            events,
            rejection,
        });
    }
    Ok(report)
}
