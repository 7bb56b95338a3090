use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, ReadRangeExt, Write};
use commonware_cryptography::ed25519::PublicKey;

use crate::board::{PieceKind, Position, MAX_PIECES, MAX_SUPERPOSITION_POSITIONS};

/// A move as submitted by a player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveRequest {
    /// Move a classical piece from one square to another.
    /// Binary: [0] [from:u8] [to:u8]
    Standard { from: Position, to: Position },

    /// Put a classical piece into superposition over `positions`.
    /// Binary: [1] [from:u8] [positions:varint-len u8...] [weights:varint-len u8...]
    QuantumSplit {
        from: Position,
        positions: Vec<Position>,
        weights: Vec<u8>,
    },

    /// Resolve the superposed piece anchored at `target` using `seed`.
    /// Binary: [2] [target:u8] [seed:u64 BE]
    Collapse { target: Position, seed: u64 },

    /// Resolve each superposed piece anchored at `positions`, in order. The piece at index `i`
    /// uses `seed + i`.
    /// Binary: [3] [positions:varint-len u8...] [seed:u64 BE]
    Measure { positions: Vec<Position>, seed: u64 },
}

impl Write for MoveRequest {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Standard { from, to } => {
                0u8.write(writer);
                from.write(writer);
                to.write(writer);
            }
            Self::QuantumSplit {
                from,
                positions,
                weights,
            } => {
                1u8.write(writer);
                from.write(writer);
                positions.write(writer);
                weights.write(writer);
            }
            Self::Collapse { target, seed } => {
                2u8.write(writer);
                target.write(writer);
                seed.write(writer);
            }
            Self::Measure { positions, seed } => {
                3u8.write(writer);
                positions.write(writer);
                seed.write(writer);
            }
        }
    }
}

impl Read for MoveRequest {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let request = match u8::read(reader)? {
            0 => Self::Standard {
                from: Position::read(reader)?,
                to: Position::read(reader)?,
            },
            1 => Self::QuantumSplit {
                from: Position::read(reader)?,
                positions: Vec::<Position>::read_range(reader, 0..=MAX_SUPERPOSITION_POSITIONS)?,
                weights: Vec::<u8>::read_range(reader, 0..=MAX_SUPERPOSITION_POSITIONS)?,
            },
            2 => Self::Collapse {
                target: Position::read(reader)?,
                seed: u64::read(reader)?,
            },
            3 => Self::Measure {
                positions: Vec::<Position>::read_range(reader, 0..=MAX_PIECES)?,
                seed: u64::read(reader)?,
            },
            i => return Err(Error::InvalidEnum(i)),
        };
        Ok(request)
    }
}

impl EncodeSize for MoveRequest {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::Standard { from, to } => from.encode_size() + to.encode_size(),
            Self::QuantumSplit {
                from,
                positions,
                weights,
            } => from.encode_size() + positions.encode_size() + weights.encode_size(),
            Self::Collapse { target, seed } => target.encode_size() + seed.encode_size(),
            Self::Measure { positions, seed } => positions.encode_size() + seed.encode_size(),
        }
    }
}

/// One piece resolved by a measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Measurement {
    pub origin: Position,
    pub resolved: Position,
    pub captured: Option<PieceKind>,
}

impl Write for Measurement {
    fn write(&self, writer: &mut impl BufMut) {
        self.origin.write(writer);
        self.resolved.write(writer);
        self.captured.write(writer);
    }
}

impl Read for Measurement {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            origin: Position::read(reader)?,
            resolved: Position::read(reader)?,
            captured: Option::<PieceKind>::read(reader)?,
        })
    }
}

impl EncodeSize for Measurement {
    fn encode_size(&self) -> usize {
        self.origin.encode_size() + self.resolved.encode_size() + self.captured.encode_size()
    }
}

/// What an accepted move did to the board.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveKind {
    Standard {
        from: Position,
        to: Position,
        captured: Option<PieceKind>,
    },
    QuantumSplit {
        from: Position,
        possible_positions: Vec<Position>,
        weights: Vec<u8>,
    },
    /// `forced` collapses are the ones applied automatically before a game is finalized.
    Collapse {
        target: Position,
        seed: u64,
        resolved: Position,
        captured: Option<PieceKind>,
        forced: bool,
    },
    /// Pieces a measurement resolved, in resolution order. Listed pieces captured before their
    /// turn are absent.
    Measure {
        seed: u64,
        measured: Vec<Measurement>,
    },
}

impl Write for MoveKind {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Standard { from, to, captured } => {
                0u8.write(writer);
                from.write(writer);
                to.write(writer);
                captured.write(writer);
            }
            Self::QuantumSplit {
                from,
                possible_positions,
                weights,
            } => {
                1u8.write(writer);
                from.write(writer);
                possible_positions.write(writer);
                weights.write(writer);
            }
            Self::Collapse {
                target,
                seed,
                resolved,
                captured,
                forced,
            } => {
                2u8.write(writer);
                target.write(writer);
                seed.write(writer);
                resolved.write(writer);
                captured.write(writer);
                forced.write(writer);
            }
            Self::Measure { seed, measured } => {
                3u8.write(writer);
                seed.write(writer);
                measured.write(writer);
            }
        }
    }
}

impl Read for MoveKind {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = match u8::read(reader)? {
            0 => Self::Standard {
                from: Position::read(reader)?,
                to: Position::read(reader)?,
                captured: Option::<PieceKind>::read(reader)?,
            },
            1 => Self::QuantumSplit {
                from: Position::read(reader)?,
                possible_positions: Vec::<Position>::read_range(
                    reader,
                    0..=MAX_SUPERPOSITION_POSITIONS,
                )?,
                weights: Vec::<u8>::read_range(reader, 0..=MAX_SUPERPOSITION_POSITIONS)?,
            },
            2 => Self::Collapse {
                target: Position::read(reader)?,
                seed: u64::read(reader)?,
                resolved: Position::read(reader)?,
                captured: Option::<PieceKind>::read(reader)?,
                forced: bool::read(reader)?,
            },
            3 => Self::Measure {
                seed: u64::read(reader)?,
                measured: Vec::<Measurement>::read_range(reader, 0..=MAX_PIECES)?,
            },
            i => return Err(Error::InvalidEnum(i)),
        };
        Ok(kind)
    }
}

impl EncodeSize for MoveKind {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::Standard { from, to, captured } => {
                from.encode_size() + to.encode_size() + captured.encode_size()
            }
            Self::QuantumSplit {
                from,
                possible_positions,
                weights,
            } => from.encode_size() + possible_positions.encode_size() + weights.encode_size(),
            Self::Collapse {
                target,
                seed,
                resolved,
                captured,
                forced,
            } => {
                target.encode_size()
                    + seed.encode_size()
                    + resolved.encode_size()
                    + captured.encode_size()
                    + forced.encode_size()
            }
            Self::Measure { seed, measured } => seed.encode_size() + measured.encode_size(),
        }
    }
}

/// An entry in a game's append-only move history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Move {
    pub mover: PublicKey,
    pub timestamp: u64,
    pub kind: MoveKind,
}

impl Move {
    /// Opposing pieces this move removed from the board.
    pub fn captures(&self) -> Vec<PieceKind> {
        match &self.kind {
            MoveKind::Standard { captured, .. } | MoveKind::Collapse { captured, .. } => {
                captured.iter().copied().collect()
            }
            MoveKind::QuantumSplit { .. } => Vec::new(),
            MoveKind::Measure { measured, .. } => measured
                .iter()
                .filter_map(|measurement| measurement.captured)
                .collect(),
        }
    }
}

impl Write for Move {
    fn write(&self, writer: &mut impl BufMut) {
        self.mover.write(writer);
        self.timestamp.write(writer);
        self.kind.write(writer);
    }
}

impl Read for Move {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            mover: PublicKey::read(reader)?,
            timestamp: u64::read(reader)?,
            kind: MoveKind::read(reader)?,
        })
    }
}

impl EncodeSize for Move {
    fn encode_size(&self) -> usize {
        self.mover.encode_size() + self.timestamp.encode_size() + self.kind.encode_size()
    }
}
