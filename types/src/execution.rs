use bytes::{Buf, BufMut};
use commonware_codec::{Encode, EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::{
    ed25519::{self, PublicKey},
    sha256::{Digest, Sha256},
    Digestible, Hasher, Signer, Verifier,
};
use commonware_utils::union;
use std::fmt::Debug;

use crate::board::Position;
use crate::game::{Game, GameId, GameStatus, Outcome};
use crate::moves::{MoveKind, MoveRequest};

pub const NAMESPACE: &[u8] = b"_QCHESS";
pub const TRANSACTION_SUFFIX: &[u8] = b"_TX";

#[inline]
pub fn transaction_namespace(namespace: &[u8]) -> Vec<u8> {
    union(namespace, TRANSACTION_SUFFIX)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub instruction: Instruction,

    pub public: ed25519::PublicKey,
    pub signature: ed25519::Signature,
}

impl Transaction {
    fn payload(nonce: &u64, instruction: &Instruction) -> Vec<u8> {
        let mut payload = Vec::new();
        nonce.write(&mut payload);
        instruction.write(&mut payload);

        payload
    }

    pub fn sign(private: &ed25519::PrivateKey, nonce: u64, instruction: Instruction) -> Self {
        let signature = private.sign(
            &transaction_namespace(NAMESPACE),
            &Self::payload(&nonce, &instruction),
        );

        Self {
            nonce,
            instruction,
            public: private.public_key(),
            signature,
        }
    }

    pub fn verify(&self) -> bool {
        self.public.verify(
            &transaction_namespace(NAMESPACE),
            &Self::payload(&self.nonce, &self.instruction),
            &self.signature,
        )
    }
}

impl Write for Transaction {
    fn write(&self, writer: &mut impl BufMut) {
        self.nonce.write(writer);
        self.instruction.write(writer);
        self.public.write(writer);
        self.signature.write(writer);
    }
}

impl Read for Transaction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let nonce = u64::read(reader)?;
        let instruction = Instruction::read(reader)?;
        let public = ed25519::PublicKey::read(reader)?;
        let signature = ed25519::Signature::read(reader)?;

        Ok(Self {
            nonce,
            instruction,
            public,
            signature,
        })
    }
}

impl EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        self.nonce.encode_size()
            + self.instruction.encode_size()
            + self.public.encode_size()
            + self.signature.encode_size()
    }
}

impl Digestible for Transaction {
    type Digest = Digest;

    fn digest(&self) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(self.nonce.to_be_bytes().as_ref());
        hasher.update(self.instruction.encode().as_ref());
        hasher.update(self.public.as_ref());
        // Any valid signature authorizes the same transaction, so it is left out.
        hasher.finalize()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Open a game and escrow the creator's stake.
    /// Binary: [0] [stake:u64 BE] [timeoutSecs:u64 BE]
    CreateGame { stake: u64, timeout_secs: u64 },

    /// Join an open game with a matching stake.
    /// Binary: [1] [gameId:u64 BE] [stake:u64 BE]
    JoinGame { game_id: GameId, stake: u64 },

    /// Submit a move for the caller's turn.
    /// Binary: [2] [gameId:u64 BE] [request...]
    SubmitMove {
        game_id: GameId,
        request: MoveRequest,
    },

    /// Claim the pool after the opponent has let their clock run out.
    /// Binary: [3] [gameId:u64 BE]
    ClaimTimeout { game_id: GameId },

    /// Propose (or, for the arbiter, declare) how a game ended.
    /// Binary: [4] [gameId:u64 BE] [outcome...]
    Complete { game_id: GameId, outcome: Outcome },

    /// Cancel a game nobody has joined and refund the creator.
    /// Binary: [5] [gameId:u64 BE]
    Cancel { game_id: GameId },

    /// Pull the caller's payable balance out of the ledger.
    /// Binary: [6]
    Withdraw,
}

impl Write for Instruction {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::CreateGame {
                stake,
                timeout_secs,
            } => {
                0u8.write(writer);
                stake.write(writer);
                timeout_secs.write(writer);
            }
            Self::JoinGame { game_id, stake } => {
                1u8.write(writer);
                game_id.write(writer);
                stake.write(writer);
            }
            Self::SubmitMove { game_id, request } => {
                2u8.write(writer);
                game_id.write(writer);
                request.write(writer);
            }
            Self::ClaimTimeout { game_id } => {
                3u8.write(writer);
                game_id.write(writer);
            }
            Self::Complete { game_id, outcome } => {
                4u8.write(writer);
                game_id.write(writer);
                outcome.write(writer);
            }
            Self::Cancel { game_id } => {
                5u8.write(writer);
                game_id.write(writer);
            }
            Self::Withdraw => 6u8.write(writer),
        }
    }
}

impl Read for Instruction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let instruction = match u8::read(reader)? {
            0 => Self::CreateGame {
                stake: u64::read(reader)?,
                timeout_secs: u64::read(reader)?,
            },
            1 => Self::JoinGame {
                game_id: u64::read(reader)?,
                stake: u64::read(reader)?,
            },
            2 => Self::SubmitMove {
                game_id: u64::read(reader)?,
                request: MoveRequest::read(reader)?,
            },
            3 => Self::ClaimTimeout {
                game_id: u64::read(reader)?,
            },
            4 => Self::Complete {
                game_id: u64::read(reader)?,
                outcome: Outcome::read(reader)?,
            },
            5 => Self::Cancel {
                game_id: u64::read(reader)?,
            },
            6 => Self::Withdraw,
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(instruction)
    }
}

impl EncodeSize for Instruction {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::CreateGame { .. } | Self::JoinGame { .. } => u64::SIZE * 2,
                Self::SubmitMove { request, .. } => u64::SIZE + request.encode_size(),
                Self::Complete { outcome, .. } => u64::SIZE + outcome.encode_size(),
                Self::ClaimTimeout { .. } | Self::Cancel { .. } => u64::SIZE,
                Self::Withdraw => 0,
            }
    }
}

/// Per-signer nonce tracking for replay protection.
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct Account {
    pub nonce: u64,
}

impl Write for Account {
    fn write(&self, writer: &mut impl BufMut) {
        self.nonce.write(writer);
    }
}

impl Read for Account {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            nonce: u64::read(reader)?,
        })
    }
}

impl EncodeSize for Account {
    fn encode_size(&self) -> usize {
        self.nonce.encode_size()
    }
}

#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Debug)]
pub enum Key {
    /// Nonce tracking (tag 0)
    Account(PublicKey),
    /// Payable balance awaiting withdrawal (tag 1)
    Balance(PublicKey),
    /// Game record (tag 2)
    Game(GameId),
    /// Next game id (tag 3)
    GameCounter,
}

impl Write for Key {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(pk) => {
                0u8.write(writer);
                pk.write(writer);
            }
            Self::Balance(pk) => {
                1u8.write(writer);
                pk.write(writer);
            }
            Self::Game(id) => {
                2u8.write(writer);
                id.write(writer);
            }
            Self::GameCounter => 3u8.write(writer),
        }
    }
}

impl Read for Key {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let key = match u8::read(reader)? {
            0 => Self::Account(PublicKey::read(reader)?),
            1 => Self::Balance(PublicKey::read(reader)?),
            2 => Self::Game(u64::read(reader)?),
            3 => Self::GameCounter,
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(key)
    }
}

impl EncodeSize for Key {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(_) | Self::Balance(_) => PublicKey::SIZE,
                Self::Game(_) => u64::SIZE,
                Self::GameCounter => 0,
            }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Value {
    Account(Account),
    Balance(u64),
    Game(Game),
    GameCounter(u64),
}

impl Write for Value {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(account) => {
                0u8.write(writer);
                account.write(writer);
            }
            Self::Balance(balance) => {
                1u8.write(writer);
                balance.write(writer);
            }
            Self::Game(game) => {
                2u8.write(writer);
                game.write(writer);
            }
            Self::GameCounter(next) => {
                3u8.write(writer);
                next.write(writer);
            }
        }
    }
}

impl Read for Value {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = match u8::read(reader)? {
            0 => Self::Account(Account::read(reader)?),
            1 => Self::Balance(u64::read(reader)?),
            2 => Self::Game(Game::read(reader)?),
            3 => Self::GameCounter(u64::read(reader)?),
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(value)
    }
}

impl EncodeSize for Value {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(account) => account.encode_size(),
                Self::Balance(balance) => balance.encode_size(),
                Self::Game(game) => game.encode_size(),
                Self::GameCounter(next) => next.encode_size(),
            }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    GameCreated {
        game_id: GameId,
        creator: PublicKey,
        stake: u64,
        timeout_secs: u64,
    },
    GameJoined {
        game_id: GameId,
        opponent: PublicKey,
    },
    MoveSubmitted {
        game_id: GameId,
        mover: PublicKey,
        /// Zero-based index of the move in the game's history.
        index: u32,
        kind: MoveKind,
    },
    PieceCollapsed {
        game_id: GameId,
        /// Player whose move resolved the piece.
        actor: PublicKey,
        origin: Position,
        resolved: Position,
        forced: bool,
    },
    OutcomeProposed {
        game_id: GameId,
        proposer: PublicKey,
        outcome: Outcome,
    },
    GameCompleted {
        game_id: GameId,
        /// Player or arbiter whose instruction finalized the game.
        actor: PublicKey,
        status: GameStatus,
        winner: Option<PublicKey>,
    },
    GameTimedOut {
        game_id: GameId,
        winner: PublicKey,
    },
    GameCancelled {
        game_id: GameId,
        actor: PublicKey,
        refund: u64,
    },
    /// Escrowed stake moved to a player's payable balance.
    Credited {
        game_id: GameId,
        player: PublicKey,
        amount: u64,
        balance: u64,
    },
    Withdrawn {
        player: PublicKey,
        amount: u64,
    },
}

impl Write for Event {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::GameCreated {
                game_id,
                creator,
                stake,
                timeout_secs,
            } => {
                0u8.write(writer);
                game_id.write(writer);
                creator.write(writer);
                stake.write(writer);
                timeout_secs.write(writer);
            }
            Self::GameJoined { game_id, opponent } => {
                1u8.write(writer);
                game_id.write(writer);
                opponent.write(writer);
            }
            Self::MoveSubmitted {
                game_id,
                mover,
                index,
                kind,
            } => {
                2u8.write(writer);
                game_id.write(writer);
                mover.write(writer);
                index.write(writer);
                kind.write(writer);
            }
            Self::PieceCollapsed {
                game_id,
                actor,
                origin,
                resolved,
                forced,
            } => {
                3u8.write(writer);
                game_id.write(writer);
                actor.write(writer);
                origin.write(writer);
                resolved.write(writer);
                forced.write(writer);
            }
            Self::OutcomeProposed {
                game_id,
                proposer,
                outcome,
            } => {
                4u8.write(writer);
                game_id.write(writer);
                proposer.write(writer);
                outcome.write(writer);
            }
            Self::GameCompleted {
                game_id,
                actor,
                status,
                winner,
            } => {
                5u8.write(writer);
                game_id.write(writer);
                actor.write(writer);
                status.write(writer);
                winner.write(writer);
            }
            Self::GameTimedOut { game_id, winner } => {
                6u8.write(writer);
                game_id.write(writer);
                winner.write(writer);
            }
            Self::GameCancelled {
                game_id,
                actor,
                refund,
            } => {
                7u8.write(writer);
                game_id.write(writer);
                actor.write(writer);
                refund.write(writer);
            }
            Self::Credited {
                game_id,
                player,
                amount,
                balance,
            } => {
                8u8.write(writer);
                game_id.write(writer);
                player.write(writer);
                amount.write(writer);
                balance.write(writer);
            }
            Self::Withdrawn { player, amount } => {
                9u8.write(writer);
                player.write(writer);
                amount.write(writer);
            }
        }
    }
}

impl Read for Event {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let event = match u8::read(reader)? {
            0 => Self::GameCreated {
                game_id: u64::read(reader)?,
                creator: PublicKey::read(reader)?,
                stake: u64::read(reader)?,
                timeout_secs: u64::read(reader)?,
            },
            1 => Self::GameJoined {
                game_id: u64::read(reader)?,
                opponent: PublicKey::read(reader)?,
            },
            2 => Self::MoveSubmitted {
                game_id: u64::read(reader)?,
                mover: PublicKey::read(reader)?,
                index: u32::read(reader)?,
                kind: MoveKind::read(reader)?,
            },
            3 => Self::PieceCollapsed {
                game_id: u64::read(reader)?,
                actor: PublicKey::read(reader)?,
                origin: Position::read(reader)?,
                resolved: Position::read(reader)?,
                forced: bool::read(reader)?,
            },
            4 => Self::OutcomeProposed {
                game_id: u64::read(reader)?,
                proposer: PublicKey::read(reader)?,
                outcome: Outcome::read(reader)?,
            },
            5 => Self::GameCompleted {
                game_id: u64::read(reader)?,
                actor: PublicKey::read(reader)?,
                status: GameStatus::read(reader)?,
                winner: Option::<PublicKey>::read(reader)?,
            },
            6 => Self::GameTimedOut {
                game_id: u64::read(reader)?,
                winner: PublicKey::read(reader)?,
            },
            7 => Self::GameCancelled {
                game_id: u64::read(reader)?,
                actor: PublicKey::read(reader)?,
                refund: u64::read(reader)?,
            },
            8 => Self::Credited {
                game_id: u64::read(reader)?,
                player: PublicKey::read(reader)?,
                amount: u64::read(reader)?,
                balance: u64::read(reader)?,
            },
            9 => Self::Withdrawn {
                player: PublicKey::read(reader)?,
                amount: u64::read(reader)?,
            },
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(event)
    }
}

impl EncodeSize for Event {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::GameCreated { .. } => u64::SIZE + PublicKey::SIZE + u64::SIZE * 2,
                Self::GameJoined { .. } | Self::GameTimedOut { .. } => {
                    u64::SIZE + PublicKey::SIZE
                }
                Self::MoveSubmitted { kind, .. } => {
                    u64::SIZE + PublicKey::SIZE + u32::SIZE + kind.encode_size()
                }
                Self::PieceCollapsed { .. } => {
                    u64::SIZE + PublicKey::SIZE + Position::SIZE * 2 + bool::SIZE
                }
                Self::OutcomeProposed { outcome, .. } => {
                    u64::SIZE + PublicKey::SIZE + outcome.encode_size()
                }
                Self::GameCompleted { winner, .. } => {
                    u64::SIZE + PublicKey::SIZE + GameStatus::SIZE + winner.encode_size()
                }
                Self::GameCancelled { .. } => u64::SIZE * 2 + PublicKey::SIZE,
                Self::Credited { .. } => u64::SIZE + PublicKey::SIZE + u64::SIZE * 2,
                Self::Withdrawn { .. } => PublicKey::SIZE + u64::SIZE,
            }
    }
}

impl Event {
    /// Game the event belongs to, if any.
    pub fn game_id(&self) -> Option<GameId> {
        match self {
            Self::GameCreated { game_id, .. }
            | Self::GameJoined { game_id, .. }
            | Self::MoveSubmitted { game_id, .. }
            | Self::PieceCollapsed { game_id, .. }
            | Self::OutcomeProposed { game_id, .. }
            | Self::GameCompleted { game_id, .. }
            | Self::GameTimedOut { game_id, .. }
            | Self::GameCancelled { game_id, .. }
            | Self::Credited { game_id, .. } => Some(*game_id),
            Self::Withdrawn { .. } => None,
        }
    }

    /// Key of the player (or arbiter) whose instruction produced the event.
    pub fn actor(&self) -> &PublicKey {
        match self {
            Self::GameCreated { creator, .. } => creator,
            Self::GameJoined { opponent, .. } => opponent,
            Self::MoveSubmitted { mover, .. } => mover,
            Self::OutcomeProposed { proposer, .. } => proposer,
            Self::GameTimedOut { winner, .. } => winner,
            Self::PieceCollapsed { actor, .. }
            | Self::GameCompleted { actor, .. }
            | Self::GameCancelled { actor, .. } => actor,
            Self::Credited { player, .. } | Self::Withdrawn { player, .. } => player,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GameCreated { .. } => "game_created",
            Self::GameJoined { .. } => "game_joined",
            Self::MoveSubmitted { .. } => "move_submitted",
            Self::PieceCollapsed { .. } => "piece_collapsed",
            Self::OutcomeProposed { .. } => "outcome_proposed",
            Self::GameCompleted { .. } => "game_completed",
            Self::GameTimedOut { .. } => "game_timed_out",
            Self::GameCancelled { .. } => "game_cancelled",
            Self::Credited { .. } => "credited",
            Self::Withdrawn { .. } => "withdrawn",
        }
    }
}
