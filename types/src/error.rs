use thiserror::Error;

use crate::board::Position;
use crate::game::GameId;

/// Reasons a game operation is rejected.
///
/// A rejected operation is never committed: the game it targets is left as it was.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("weights must be non-empty and sum to 100")]
    InvalidProbabilityDistribution,

    #[error("not the caller's turn")]
    NotYourTurn,

    #[error("game is not active")]
    GameNotActive,

    #[error("timeout has not elapsed")]
    TimeoutNotElapsed,

    #[error("caller is not a player in this game")]
    NotAPlayer,

    #[error("winner must be one of the players")]
    InvalidWinner,

    #[error("game is already active")]
    GameAlreadyActive,

    #[error("insufficient escrow (requested={requested}, held={held})")]
    InsufficientEscrow { requested: u64, held: u64 },

    #[error("escrow overflow (paid_in={paid_in}, amount={amount})")]
    EscrowOverflow { amount: u64, paid_in: u64 },

    #[error("game not found: {0}")]
    GameNotFound(GameId),

    #[error("stake mismatch (expected={expected}, got={got})")]
    StakeMismatch { expected: u64, got: u64 },

    #[error("stake out of range (got={got}, min={min}, max={max})")]
    InvalidStake { got: u64, min: u64, max: u64 },

    #[error("timeout too short (got={got}s, min={min}s)")]
    TimeoutTooShort { got: u64, min: u64 },

    #[error("creator cannot join their own game")]
    CannotJoinOwnGame,

    #[error("no piece at {0}")]
    PieceNotFound(Position),

    #[error("piece at {0} belongs to the opponent")]
    NotYourPiece(Position),

    #[error("piece at {0} is superposed and must collapse first")]
    PieceSuperposed(Position),

    #[error("square {0} is occupied by a friendly piece")]
    SquareOccupied(Position),

    #[error("invalid superposition: {0}")]
    InvalidSuperposition(&'static str),

    #[error("too many superposed pieces (max={max})")]
    TooManySuperposedPieces { max: u8 },

    #[error("move history is full (max={max})")]
    MoveLimitReached { max: usize },

    #[error("invalid move: {0}")]
    InvalidMove(&'static str),

    #[error("no payable balance to withdraw")]
    NothingToWithdraw,

    #[error("transaction signature is invalid")]
    InvalidSignature,

    #[error("nonce mismatch (expected={expected}, got={got})")]
    NonceMismatch { expected: u64, got: u64 },
}
