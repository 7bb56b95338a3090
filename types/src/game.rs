//! Game record, outcome and escrow bookkeeping.

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};
use commonware_cryptography::ed25519::PublicKey;
use thiserror::Error as ThisError;

use crate::board::{Board, Color, MAX_SUPERPOSITION_POSITIONS, MIN_SUPERPOSITION_POSITIONS};
use crate::error::GameError;
use crate::moves::{Move, MoveKind};

pub type GameId = u64;

/// Upper bound on moves a decoded game may carry.
pub const MAX_MOVE_HISTORY: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GameStatus {
    Created = 0,
    Active = 1,
    Completed = 2,
    Draw = 3,
    Timeout = 4,
    Cancelled = 5,
}

impl GameStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Draw | Self::Timeout | Self::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Draw => "draw",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Write for GameStatus {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for GameStatus {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        match value {
            0 => Ok(Self::Created),
            1 => Ok(Self::Active),
            2 => Ok(Self::Completed),
            3 => Ok(Self::Draw),
            4 => Ok(Self::Timeout),
            5 => Ok(Self::Cancelled),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for GameStatus {
    const SIZE: usize = 1;
}

/// Result a caller asks a game to be completed with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Winner(PublicKey),
    Draw,
}

impl Write for Outcome {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Winner(winner) => {
                0u8.write(writer);
                winner.write(writer);
            }
            Self::Draw => 1u8.write(writer),
        }
    }
}

impl Read for Outcome {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Winner(PublicKey::read(reader)?)),
            1 => Ok(Self::Draw),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for Outcome {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::Winner(_) => PublicKey::SIZE,
            Self::Draw => 0,
        }
    }
}

/// An outcome one player has proposed and the other has not yet confirmed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutcomeProposal {
    pub proposer: PublicKey,
    pub outcome: Outcome,
}

impl Write for OutcomeProposal {
    fn write(&self, writer: &mut impl BufMut) {
        self.proposer.write(writer);
        self.outcome.write(writer);
    }
}

impl Read for OutcomeProposal {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            proposer: PublicKey::read(reader)?,
            outcome: Outcome::read(reader)?,
        })
    }
}

impl EncodeSize for OutcomeProposal {
    fn encode_size(&self) -> usize {
        PublicKey::SIZE + self.outcome.encode_size()
    }
}

/// Stake custody for a single game.
///
/// `held()` is always `paid_in - paid_out`. Deposits are zeroed before the matching payout is
/// booked, so a participant's deposit can only ever be paid out once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Escrow {
    deposits: Vec<(PublicKey, u64)>,
    paid_in: u64,
    paid_out: u64,
}

impl Escrow {
    pub fn held(&self) -> u64 {
        self.paid_in - self.paid_out
    }

    pub fn paid_in(&self) -> u64 {
        self.paid_in
    }

    pub fn paid_out(&self) -> u64 {
        self.paid_out
    }

    pub fn deposit_of(&self, participant: &PublicKey) -> u64 {
        self.deposits
            .iter()
            .find(|(owner, _)| owner == participant)
            .map(|(_, amount)| *amount)
            .unwrap_or(0)
    }

    /// Sum of all outstanding (not yet taken) deposits.
    pub fn outstanding(&self) -> u64 {
        self.deposits.iter().map(|(_, amount)| *amount).sum()
    }

    pub fn deposit(&mut self, participant: &PublicKey, amount: u64) -> Result<(), GameError> {
        let paid_in = self
            .paid_in
            .checked_add(amount)
            .ok_or(GameError::EscrowOverflow {
                amount,
                paid_in: self.paid_in,
            })?;
        match self
            .deposits
            .iter_mut()
            .find(|(owner, _)| owner == participant)
        {
            Some((_, balance)) => *balance += amount,
            None => self.deposits.push((participant.clone(), amount)),
        }
        self.paid_in = paid_in;
        Ok(())
    }

    /// Zero a participant's deposit and return what it held.
    pub fn take_deposit(&mut self, participant: &PublicKey) -> u64 {
        match self
            .deposits
            .iter_mut()
            .find(|(owner, _)| owner == participant)
        {
            Some((_, balance)) => std::mem::take(balance),
            None => 0,
        }
    }

    /// Zero every deposit and return their sum.
    pub fn take_all(&mut self) -> u64 {
        self.deposits
            .iter_mut()
            .map(|(_, balance)| std::mem::take(balance))
            .sum()
    }

    /// Release `amount` from custody.
    pub fn payout(&mut self, amount: u64) -> Result<(), GameError> {
        let held = self.held();
        if amount > held {
            return Err(GameError::InsufficientEscrow {
                requested: amount,
                held,
            });
        }
        self.paid_out += amount;
        Ok(())
    }
}

impl Write for Escrow {
    fn write(&self, writer: &mut impl BufMut) {
        self.deposits.write(writer);
        self.paid_in.write(writer);
        self.paid_out.write(writer);
    }
}

impl Read for Escrow {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let deposits = Vec::<(PublicKey, u64)>::read_range(reader, 0..=2)?;
        let paid_in = u64::read(reader)?;
        let paid_out = u64::read(reader)?;
        if paid_out > paid_in {
            return Err(Error::Invalid("Escrow", "paid out exceeds paid in"));
        }
        Ok(Self {
            deposits,
            paid_in,
            paid_out,
        })
    }
}

impl EncodeSize for Escrow {
    fn encode_size(&self) -> usize {
        self.deposits.encode_size() + self.paid_in.encode_size() + self.paid_out.encode_size()
    }
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum GameInvariantError {
    #[error("current turn is not a participant")]
    TurnNotParticipant,
    #[error("active game has no opponent")]
    MissingOpponent,
    #[error("escrow does not balance (outstanding={outstanding}, held={held})")]
    EscrowImbalance { outstanding: u64, held: u64 },
    #[error("terminal game still holds stake ({held})")]
    TerminalHoldsStake { held: u64 },
    #[error("terminal game has superposed pieces")]
    TerminalSuperposition,
    #[error("piece anchored at {square} has a malformed superposition")]
    MalformedSuperposition { square: String },
    #[error("piece key does not match its position at {square}")]
    MisplacedPiece { square: String },
}

/// Per-player counts derived from the move history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub classical_moves: u32,
    pub quantum_splits: u32,
    pub collapses: u32,
    pub captures: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Game {
    pub id: GameId,
    pub creator: PublicKey,
    pub opponent: Option<PublicKey>,
    /// Stake each player escrows.
    pub stake: u64,
    pub status: GameStatus,
    pub current_turn: PublicKey,
    pub created_at: u64,
    pub last_action_time: u64,
    pub timeout_secs: u64,
    pub winner: Option<PublicKey>,
    pub pending_outcome: Option<OutcomeProposal>,
    pub escrow: Escrow,
    pub board: Board,
    pub moves: Vec<Move>,
}

impl Game {
    /// A freshly created game on the standard starting position. The creator plays white and
    /// holds the first turn.
    pub fn new(id: GameId, creator: PublicKey, stake: u64, timeout_secs: u64, now: u64) -> Self {
        Self {
            id,
            current_turn: creator.clone(),
            creator,
            opponent: None,
            stake,
            status: GameStatus::Created,
            created_at: now,
            last_action_time: now,
            timeout_secs,
            winner: None,
            pending_outcome: None,
            escrow: Escrow::default(),
            board: Board::standard(),
            moves: Vec::new(),
        }
    }

    pub fn is_participant(&self, who: &PublicKey) -> bool {
        &self.creator == who || self.opponent.as_ref() == Some(who)
    }

    /// The other participant, if `who` is one and the game has two.
    pub fn other_player(&self, who: &PublicKey) -> Option<&PublicKey> {
        let opponent = self.opponent.as_ref()?;
        if &self.creator == who {
            Some(opponent)
        } else if opponent == who {
            Some(&self.creator)
        } else {
            None
        }
    }

    pub fn color_of(&self, who: &PublicKey) -> Option<Color> {
        if &self.creator == who {
            Some(Color::White)
        } else if self.opponent.as_ref() == Some(who) {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Player count derived from the history, attributing each move to its mover.
    pub fn stats(&self, who: &PublicKey) -> PlayerStats {
        let mut stats = PlayerStats::default();
        for entry in self.moves.iter().filter(|entry| &entry.mover == who) {
            match &entry.kind {
                MoveKind::Standard { .. } => stats.classical_moves += 1,
                MoveKind::QuantumSplit { .. } => stats.quantum_splits += 1,
                MoveKind::Collapse { .. } => stats.collapses += 1,
                MoveKind::Measure { measured, .. } => stats.collapses += measured.len() as u32,
            }
            stats.captures += entry.captures().len() as u32;
        }
        stats
    }

    pub fn validate_invariants(&self) -> Result<(), GameInvariantError> {
        if self.status == GameStatus::Active {
            if self.opponent.is_none() {
                return Err(GameInvariantError::MissingOpponent);
            }
            if !self.is_participant(&self.current_turn) {
                return Err(GameInvariantError::TurnNotParticipant);
            }
        }

        let outstanding = self.escrow.outstanding();
        let held = self.escrow.held();
        if outstanding != held {
            return Err(GameInvariantError::EscrowImbalance { outstanding, held });
        }

        if self.status.is_terminal() {
            if held != 0 {
                return Err(GameInvariantError::TerminalHoldsStake { held });
            }
            if self.board.has_superposed() {
                return Err(GameInvariantError::TerminalSuperposition);
            }
        }

        if let Some(square) = self.board.misplaced() {
            return Err(GameInvariantError::MisplacedPiece {
                square: square.to_string(),
            });
        }

        for piece in self.board.pieces() {
            let Some(quantum) = &piece.quantum else {
                continue;
            };
            let len = quantum.possible_positions.len();
            let sum: u32 = quantum.weights.iter().map(|w| *w as u32).sum();
            if len != quantum.weights.len()
                || !(MIN_SUPERPOSITION_POSITIONS..=MAX_SUPERPOSITION_POSITIONS).contains(&len)
                || sum != 100
            {
                return Err(GameInvariantError::MalformedSuperposition {
                    square: piece.position.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Write for Game {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.write(writer);
        self.creator.write(writer);
        self.opponent.write(writer);
        self.stake.write(writer);
        self.status.write(writer);
        self.current_turn.write(writer);
        self.created_at.write(writer);
        self.last_action_time.write(writer);
        self.timeout_secs.write(writer);
        self.winner.write(writer);
        self.pending_outcome.write(writer);
        self.escrow.write(writer);
        self.board.write(writer);
        self.moves.write(writer);
    }
}

impl Read for Game {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            id: u64::read(reader)?,
            creator: PublicKey::read(reader)?,
            opponent: Option::<PublicKey>::read(reader)?,
            stake: u64::read(reader)?,
            status: GameStatus::read(reader)?,
            current_turn: PublicKey::read(reader)?,
            created_at: u64::read(reader)?,
            last_action_time: u64::read(reader)?,
            timeout_secs: u64::read(reader)?,
            winner: Option::<PublicKey>::read(reader)?,
            pending_outcome: Option::<OutcomeProposal>::read(reader)?,
            escrow: Escrow::read(reader)?,
            board: Board::read(reader)?,
            moves: Vec::<Move>::read_range(reader, 0..=MAX_MOVE_HISTORY)?,
        })
    }
}

impl EncodeSize for Game {
    fn encode_size(&self) -> usize {
        self.id.encode_size()
            + self.creator.encode_size()
            + self.opponent.encode_size()
            + self.stake.encode_size()
            + self.status.encode_size()
            + self.current_turn.encode_size()
            + self.created_at.encode_size()
            + self.last_action_time.encode_size()
            + self.timeout_secs.encode_size()
            + self.winner.encode_size()
            + self.pending_outcome.encode_size()
            + self.escrow.encode_size()
            + self.board.encode_size()
            + self.moves.encode_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Position;
    use commonware_codec::Encode;
    use commonware_cryptography::{ed25519::PrivateKey, Signer};

    fn sq(s: &str) -> Position {
        s.parse().expect("valid square")
    }

    #[test]
    fn escrow_tracks_paid_in_and_out() {
        let alice = PrivateKey::from_seed(1).public_key();
        let bob = PrivateKey::from_seed(2).public_key();
        let mut escrow = Escrow::default();
        escrow.deposit(&alice, 100).expect("deposit");
        escrow.deposit(&bob, 100).expect("deposit");
        assert_eq!(escrow.held(), 200);

        let taken = escrow.take_deposit(&alice);
        assert_eq!(taken, 100);
        assert_eq!(escrow.take_deposit(&alice), 0);
        escrow.payout(taken).expect("payout");
        assert_eq!(escrow.held(), 100);
        assert_eq!(escrow.outstanding(), 100);

        assert_eq!(
            escrow.payout(101),
            Err(GameError::InsufficientEscrow {
                requested: 101,
                held: 100
            })
        );
    }

    #[test]
    fn escrow_deposit_rejects_overflow() {
        let alice = PrivateKey::from_seed(1).public_key();
        let bob = PrivateKey::from_seed(2).public_key();
        let mut escrow = Escrow::default();
        escrow.deposit(&alice, u64::MAX - 1).expect("deposit");
        assert_eq!(
            escrow.deposit(&bob, 2),
            Err(GameError::EscrowOverflow {
                amount: 2,
                paid_in: u64::MAX - 1,
            })
        );
        assert_eq!(escrow.deposit_of(&bob), 0);
        assert_eq!(escrow.held(), u64::MAX - 1);
        escrow.deposit(&bob, 1).expect("fills to the limit");
        assert_eq!(escrow.paid_in(), u64::MAX);
    }

    #[test]
    fn invariants_reject_misplaced_piece() {
        let alice = PrivateKey::from_seed(1).public_key();
        let mut game = Game::new(1, alice, 100, 300, 0);
        if let Some(knight) = game.board.get_mut(sq("g1")) {
            knight.position = sq("f3");
        }
        assert_eq!(
            game.validate_invariants(),
            Err(GameInvariantError::MisplacedPiece {
                square: "g1".to_string(),
            })
        );
    }

    #[test]
    fn new_game_starts_with_creator_to_move() {
        let alice = PrivateKey::from_seed(1).public_key();
        let game = Game::new(7, alice.clone(), 100, 300, 1_000);
        assert_eq!(game.status, GameStatus::Created);
        assert_eq!(game.current_turn, alice);
        assert_eq!(game.color_of(&alice), Some(Color::White));
        assert_eq!(game.board.len(), 32);
        game.validate_invariants().expect("valid invariants");
    }

    #[test]
    fn invariants_reject_terminal_superposition() {
        let alice = PrivateKey::from_seed(1).public_key();
        let mut game = Game::new(1, alice, 100, 300, 0);
        game.status = GameStatus::Cancelled;
        if let Some(knight) = game.board.get_mut(sq("g1")) {
            knight.quantum = Some(crate::board::QuantumState {
                possible_positions: vec![sq("f3"), sq("h3")],
                weights: vec![50, 50],
            });
        }
        assert_eq!(
            game.validate_invariants(),
            Err(GameInvariantError::TerminalSuperposition)
        );
    }

    #[test]
    fn game_record_round_trips_through_codec() {
        let alice = PrivateKey::from_seed(1).public_key();
        let bob = PrivateKey::from_seed(2).public_key();
        let mut game = Game::new(3, alice.clone(), 100, 300, 10);
        game.opponent = Some(bob.clone());
        game.status = GameStatus::Active;
        game.escrow.deposit(&alice, 100).expect("deposit");
        game.escrow.deposit(&bob, 100).expect("deposit");
        game.pending_outcome = Some(OutcomeProposal {
            proposer: bob,
            outcome: Outcome::Draw,
        });
        game.moves.push(Move {
            mover: alice,
            timestamp: 11,
            kind: MoveKind::Standard {
                from: sq("e2"),
                to: sq("e4"),
                captured: None,
            },
        });

        let encoded = game.encode();
        assert_eq!(encoded.len(), game.encode_size());
        let decoded = Game::read(&mut &encoded[..]).expect("decode");
        assert_eq!(decoded, game);
    }
}
