//! Common types used throughout qchess: the board model, the game record, moves, and the
//! transactions, events and storage keys the ledger works with.

pub mod board;
pub mod error;
pub mod execution;
pub mod game;
pub mod moves;

pub use board::{Board, Color, Piece, PieceKind, Position, QuantumState};
pub use error::GameError;
pub use execution::{Account, Event, Instruction, Key, Transaction, Value, NAMESPACE};
pub use game::{
    Escrow, Game, GameId, GameInvariantError, GameStatus, Outcome, OutcomeProposal, PlayerStats,
};
pub use moves::{Measurement, Move, MoveKind, MoveRequest};
