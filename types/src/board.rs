//! Board, piece and superposition types.
//!
//! The board is sparse: only squares that anchor a piece are present. A superposed piece stays
//! keyed by the square it split from until it collapses, while the squares it may resolve to are
//! carried in its [QuantumState].

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error as ThisError;

/// Width and height of the board.
pub const BOARD_SIZE: u8 = 8;

/// Upper bound on pieces a decoded board may carry.
pub const MAX_PIECES: usize = 32;

/// Upper bound on candidate squares for a single superposed piece.
pub const MAX_SUPERPOSITION_POSITIONS: usize = 8;

/// Minimum candidate squares for a superposed piece.
pub const MIN_SUPERPOSITION_POSITIONS: usize = 2;

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
#[error("invalid square: {0}")]
pub struct ParsePositionError(pub String);

/// A square on the board, `file` and `rank` both in `0..8` (`a1` is `(0, 0)`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    file: u8,
    rank: u8,
}

impl Position {
    pub const fn new(file: u8, rank: u8) -> Option<Self> {
        if file < BOARD_SIZE && rank < BOARD_SIZE {
            Some(Self { file, rank })
        } else {
            None
        }
    }

    pub fn file(&self) -> u8 {
        self.file
    }

    pub fn rank(&self) -> u8 {
        self.rank
    }

    /// Square index in `0..64`, rank-major from `a1`.
    pub fn index(&self) -> u8 {
        self.rank * BOARD_SIZE + self.file
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::new(index % BOARD_SIZE, index / BOARD_SIZE)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file) as char, self.rank + 1)
    }
}

impl FromStr for Position {
    type Err = ParsePositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.trim().as_bytes();
        if bytes.len() != 2 {
            return Err(ParsePositionError(s.to_string()));
        }
        let file = bytes[0].to_ascii_lowercase().wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        Self::new(file, rank).ok_or_else(|| ParsePositionError(s.to_string()))
    }
}

impl Serialize for Position {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

impl Write for Position {
    fn write(&self, writer: &mut impl BufMut) {
        self.index().write(writer);
    }
}

impl Read for Position {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let index = u8::read(reader)?;
        Self::from_index(index).ok_or(Error::Invalid("Position", "square out of range"))
    }
}

impl FixedSize for Position {
    const SIZE: usize = 1;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PieceKind {
    Pawn = 0,
    Knight = 1,
    Bishop = 2,
    Rook = 3,
    Queen = 4,
    King = 5,
}

impl PieceKind {
    pub fn symbol(&self) -> char {
        match self {
            Self::Pawn => 'p',
            Self::Knight => 'n',
            Self::Bishop => 'b',
            Self::Rook => 'r',
            Self::Queen => 'q',
            Self::King => 'k',
        }
    }
}

impl Write for PieceKind {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for PieceKind {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        match value {
            0 => Ok(Self::Pawn),
            1 => Ok(Self::Knight),
            2 => Ok(Self::Bishop),
            3 => Ok(Self::Rook),
            4 => Ok(Self::Queen),
            5 => Ok(Self::King),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for PieceKind {
    const SIZE: usize = 1;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Color {
    White = 0,
    Black = 1,
}

impl Color {
    pub fn opposite(&self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

impl Write for Color {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for Color {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        match value {
            0 => Ok(Self::White),
            1 => Ok(Self::Black),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for Color {
    const SIZE: usize = 1;
}

/// Weighted candidate squares of a superposed piece.
///
/// `possible_positions` and `weights` are parallel; weights are percentages that are expected to
/// sum to exactly 100. Validation happens in the execution layer when the split is submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumState {
    pub possible_positions: Vec<Position>,
    pub weights: Vec<u8>,
}

impl QuantumState {
    pub fn contains(&self, square: Position) -> bool {
        self.possible_positions.contains(&square)
    }
}

impl Write for QuantumState {
    fn write(&self, writer: &mut impl BufMut) {
        self.possible_positions.write(writer);
        self.weights.write(writer);
    }
}

impl Read for QuantumState {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let possible_positions =
            Vec::<Position>::read_range(reader, 0..=MAX_SUPERPOSITION_POSITIONS)?;
        let weights = Vec::<u8>::read_range(reader, 0..=MAX_SUPERPOSITION_POSITIONS)?;
        if possible_positions.len() != weights.len() {
            return Err(Error::Invalid("QuantumState", "length mismatch"));
        }
        Ok(Self {
            possible_positions,
            weights,
        })
    }
}

impl EncodeSize for QuantumState {
    fn encode_size(&self) -> usize {
        self.possible_positions.encode_size() + self.weights.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantum: Option<QuantumState>,
}

impl Piece {
    pub fn new(kind: PieceKind, color: Color, position: Position) -> Self {
        Self {
            kind,
            color,
            position,
            quantum: None,
        }
    }

    pub fn is_superposed(&self) -> bool {
        self.quantum.is_some()
    }

    /// Whether this piece claims `square`: its anchor, or any of its candidate squares.
    pub fn covers(&self, square: Position) -> bool {
        self.position == square
            || self
                .quantum
                .as_ref()
                .is_some_and(|quantum| quantum.contains(square))
    }

    pub fn symbol(&self) -> char {
        match self.color {
            Color::White => self.kind.symbol().to_ascii_uppercase(),
            Color::Black => self.kind.symbol(),
        }
    }
}

impl Write for Piece {
    fn write(&self, writer: &mut impl BufMut) {
        self.kind.write(writer);
        self.color.write(writer);
        self.position.write(writer);
        self.quantum.write(writer);
    }
}

impl Read for Piece {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            kind: PieceKind::read(reader)?,
            color: Color::read(reader)?,
            position: Position::read(reader)?,
            quantum: Option::<QuantumState>::read(reader)?,
        })
    }
}

impl EncodeSize for Piece {
    fn encode_size(&self) -> usize {
        self.kind.encode_size()
            + self.color.encode_size()
            + self.position.encode_size()
            + self.quantum.encode_size()
    }
}

const BACK_RANK: [PieceKind; 8] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::King,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
];

/// Sparse board keyed by each piece's anchor square.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pieces: BTreeMap<Position, Piece>,
}

impl Board {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Standard chess starting position.
    pub fn standard() -> Self {
        let mut board = Self::empty();
        for file in 0..BOARD_SIZE {
            for (color, back, pawns) in [(Color::White, 0, 1), (Color::Black, 7, 6)] {
                if let Some(square) = Position::new(file, back) {
                    board.place(Piece::new(BACK_RANK[file as usize], color, square));
                }
                if let Some(square) = Position::new(file, pawns) {
                    board.place(Piece::new(PieceKind::Pawn, color, square));
                }
            }
        }
        board
    }

    /// Put a piece on its anchor square, returning whatever was there.
    pub fn place(&mut self, piece: Piece) -> Option<Piece> {
        self.pieces.insert(piece.position, piece)
    }

    pub fn remove(&mut self, square: Position) -> Option<Piece> {
        self.pieces.remove(&square)
    }

    pub fn get(&self, square: Position) -> Option<&Piece> {
        self.pieces.get(&square)
    }

    pub fn get_mut(&mut self, square: Position) -> Option<&mut Piece> {
        self.pieces.get_mut(&square)
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn pieces(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.values()
    }

    /// First key whose piece records a different position.
    pub fn misplaced(&self) -> Option<Position> {
        self.pieces
            .iter()
            .find(|(square, piece)| **square != piece.position)
            .map(|(square, _)| *square)
    }

    /// Anchor squares of superposed pieces, in board order.
    pub fn superposed_squares(&self) -> Vec<Position> {
        self.pieces
            .values()
            .filter(|piece| piece.is_superposed())
            .map(|piece| piece.position)
            .collect()
    }

    pub fn superposed_count(&self, color: Color) -> usize {
        self.pieces
            .values()
            .filter(|piece| piece.color == color && piece.is_superposed())
            .count()
    }

    pub fn has_superposed(&self) -> bool {
        self.pieces.values().any(Piece::is_superposed)
    }

    /// Whether a piece of `color`, other than the one anchored at `except`, claims `square`.
    pub fn friendly_covers(&self, color: Color, square: Position, except: Option<Position>) -> bool {
        self.pieces.values().any(|piece| {
            piece.color == color && Some(piece.position) != except && piece.covers(square)
        })
    }

    /// ASCII diagram from rank 8 down to rank 1. Uppercase is white, `+` marks an empty square
    /// that a superposed piece may resolve to.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(9 * BOARD_SIZE as usize * 2);
        for rank in (0..BOARD_SIZE).rev() {
            out.push((b'1' + rank) as char);
            out.push(' ');
            for file in 0..BOARD_SIZE {
                let Some(square) = Position::new(file, rank) else {
                    continue;
                };
                let symbol = match self.get(square) {
                    Some(piece) => piece.symbol(),
                    None if self
                        .pieces
                        .values()
                        .any(|piece| piece.quantum.as_ref().is_some_and(|q| q.contains(square))) =>
                    {
                        '+'
                    }
                    None => '.',
                };
                out.push(symbol);
            }
            out.push('\n');
        }
        out.push_str("  abcdefgh\n");
        out
    }
}

impl Write for Board {
    fn write(&self, writer: &mut impl BufMut) {
        let pieces: Vec<Piece> = self.pieces.values().cloned().collect();
        pieces.write(writer);
    }
}

impl Read for Board {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let pieces = Vec::<Piece>::read_range(reader, 0..=MAX_PIECES)?;
        let mut board = Self::empty();
        for piece in pieces {
            if board.place(piece).is_some() {
                return Err(Error::Invalid("Board", "duplicate square"));
            }
        }
        Ok(board)
    }
}

impl EncodeSize for Board {
    fn encode_size(&self) -> usize {
        let pieces: Vec<Piece> = self.pieces.values().cloned().collect();
        pieces.encode_size()
    }
}
