//! Piece movement and the classical/superposed lifecycle.
//!
//! A piece is either classical (a single square) or superposed (anchored at the square it split
//! from, with weighted candidate squares). Validation completes before the board is touched, so a
//! rejected call leaves the board unchanged.

use qchess_types::{Board, Color, GameError, Piece, PieceKind, Position, QuantumState};

use crate::resolver;

/// Result of resolving a superposed piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Collapsed {
    pub origin: Position,
    pub resolved: Position,
    pub captured: Option<PieceKind>,
    /// Old and new anchor of an opposing superposed piece moved off `resolved`.
    pub reanchored: Option<(Position, Position)>,
}

/// How the piece keyed at a square relates to that square.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Claim {
    Classical,
    /// Superposed with the square among its candidates.
    Superposed,
    /// Superposed and only anchored at the square.
    Anchor,
}

impl Claim {
    fn of(piece: &Piece, square: Position) -> Self {
        match &piece.quantum {
            None => Self::Classical,
            Some(quantum) if quantum.contains(square) => Self::Superposed,
            Some(_) => Self::Anchor,
        }
    }
}

/// Move the superposed piece anchored at `square` to its first candidate no piece is keyed on,
/// or to `fallback` when every candidate is taken. `fallback` must be free. Returns the new
/// anchor.
fn reanchor(board: &mut Board, square: Position, fallback: Position) -> Option<Position> {
    let mut piece = board.remove(square)?;
    piece.position = piece
        .quantum
        .as_ref()
        .and_then(|quantum| {
            quantum
                .possible_positions
                .iter()
                .copied()
                .find(|candidate| board.get(*candidate).is_none())
        })
        .unwrap_or(fallback);
    let anchor = piece.position;
    board.place(piece);
    Some(anchor)
}

/// Move a classical piece of `color` from `from` to `to`, capturing an opposing classical piece
/// on the destination. An opposing superposed piece merely anchored on `to` is not there and
/// gets re-anchored instead.
pub fn move_classical(
    board: &mut Board,
    color: Color,
    from: Position,
    to: Position,
) -> Result<Option<PieceKind>, GameError> {
    if from == to {
        return Err(GameError::InvalidMove("source and destination are the same square"));
    }
    let piece = board.get(from).ok_or(GameError::PieceNotFound(from))?;
    if piece.color != color {
        return Err(GameError::NotYourPiece(from));
    }
    if piece.is_superposed() {
        return Err(GameError::PieceSuperposed(from));
    }
    if board.friendly_covers(color, to, Some(from)) {
        return Err(GameError::SquareOccupied(to));
    }
    let occupant = board.get(to).map(|occupant| Claim::of(occupant, to));
    if occupant == Some(Claim::Superposed) {
        return Err(GameError::PieceSuperposed(to));
    }

    let Some(mut piece) = board.remove(from) else {
        return Err(GameError::PieceNotFound(from));
    };
    let captured = match occupant {
        Some(Claim::Anchor) => {
            reanchor(board, to, from);
            None
        }
        _ => board.remove(to).map(|piece| piece.kind),
    };
    piece.position = to;
    board.place(piece);
    Ok(captured)
}

/// Put the classical piece of `color` at `from` into superposition over `positions`.
///
/// Candidates may include the piece's own square and squares held or claimed by the opponent,
/// but never a square claimed by another friendly piece.
pub fn split(
    board: &mut Board,
    color: Color,
    from: Position,
    positions: &[Position],
    weights: &[u8],
    max_superposed: u8,
) -> Result<(), GameError> {
    let piece = board.get(from).ok_or(GameError::PieceNotFound(from))?;
    if piece.color != color {
        return Err(GameError::NotYourPiece(from));
    }
    if piece.is_superposed() {
        return Err(GameError::PieceSuperposed(from));
    }
    if positions.len() != weights.len() {
        return Err(GameError::InvalidSuperposition(
            "positions and weights differ in length",
        ));
    }
    if !(qchess_types::board::MIN_SUPERPOSITION_POSITIONS
        ..=qchess_types::board::MAX_SUPERPOSITION_POSITIONS)
        .contains(&positions.len())
    {
        return Err(GameError::InvalidSuperposition(
            "needs between 2 and 8 candidate squares",
        ));
    }
    for (i, square) in positions.iter().enumerate() {
        if positions[..i].contains(square) {
            return Err(GameError::InvalidSuperposition("duplicate candidate square"));
        }
    }
    resolver::validate_distribution(weights)?;
    if let Some(square) = positions
        .iter()
        .find(|square| board.friendly_covers(color, **square, Some(from)))
    {
        return Err(GameError::SquareOccupied(*square));
    }
    if board.superposed_count(color) >= max_superposed as usize {
        return Err(GameError::TooManySuperposedPieces {
            max: max_superposed,
        });
    }

    if let Some(piece) = board.get_mut(from) {
        piece.quantum = Some(QuantumState {
            possible_positions: positions.to_vec(),
            weights: weights.to_vec(),
        });
    }
    Ok(())
}

/// Resolve the piece anchored at `target` using `seed`.
///
/// Returns `None` when the piece is already classical. Landing on an opposing classical piece, or
/// on the anchor of an opposing superposed piece that lists the square, captures it. An opposing
/// superposed piece merely anchored on the square is re-anchored instead.
pub fn collapse(
    board: &mut Board,
    target: Position,
    seed: u64,
) -> Result<Option<Collapsed>, GameError> {
    let piece = board.get(target).ok_or(GameError::PieceNotFound(target))?;
    let Some(quantum) = &piece.quantum else {
        return Ok(None);
    };
    let index = resolver::resolve(&quantum.weights, seed)?;
    let resolved = *quantum
        .possible_positions
        .get(index)
        .ok_or(GameError::InvalidProbabilityDistribution)?;
    let color = piece.color;
    let occupant = match board.get(resolved) {
        Some(occupant) if resolved != target => {
            if occupant.color == color {
                return Err(GameError::SquareOccupied(resolved));
            }
            Some(Claim::of(occupant, resolved))
        }
        _ => None,
    };

    let Some(mut piece) = board.remove(target) else {
        return Err(GameError::PieceNotFound(target));
    };
    let mut reanchored = None;
    let captured = match occupant {
        Some(Claim::Anchor) => {
            reanchored = reanchor(board, resolved, target).map(|anchor| (resolved, anchor));
            None
        }
        Some(_) => board.remove(resolved).map(|piece| piece.kind),
        None => None,
    };
    piece.quantum = None;
    piece.position = resolved;
    board.place(piece);
    Ok(Some(Collapsed {
        origin: target,
        resolved,
        captured,
        reanchored,
    }))
}

/// Resolve the superposed pieces anchored at `positions` in order, the `i`-th with
/// `seed + i`. Every listed square must hold a superposed piece when the measurement
/// starts. A listed piece captured by an earlier resolution is skipped, and one re-anchored
/// by an earlier resolution is resolved at its new anchor. The board is left unchanged on
/// error.
pub fn measure(
    board: &mut Board,
    positions: &[Position],
    seed: u64,
) -> Result<Vec<Collapsed>, GameError> {
    if positions.is_empty() {
        return Err(GameError::InvalidMove("measurement names no squares"));
    }
    for (i, square) in positions.iter().enumerate() {
        if positions[..i].contains(square) {
            return Err(GameError::InvalidMove("duplicate measured square"));
        }
        let piece = board.get(*square).ok_or(GameError::PieceNotFound(*square))?;
        if !piece.is_superposed() {
            return Err(GameError::InvalidMove("measured square holds a classical piece"));
        }
    }

    let mut scratch = board.clone();
    let mut pending = positions.to_vec();
    let mut measured = Vec::with_capacity(pending.len());
    for i in 0..pending.len() {
        let square = pending[i];
        if !scratch.get(square).is_some_and(Piece::is_superposed) {
            continue;
        }
        let Some(collapsed) = collapse(&mut scratch, square, seed.wrapping_add(i as u64))? else {
            continue;
        };
        if let Some((from, to)) = collapsed.reanchored {
            if let Some(later) = pending[i + 1..].iter_mut().find(|later| **later == from) {
                *later = to;
            }
        }
        measured.push(collapsed);
    }
    *board = scratch;
    Ok(measured)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Position {
        s.parse().expect("valid square")
    }

    fn knight_split(board: &mut Board, weights: &[u8]) -> Result<(), GameError> {
        split(
            board,
            Color::White,
            sq("g1"),
            &[sq("f3"), sq("h3")],
            weights,
            3,
        )
    }

    #[test]
    fn classical_move_captures_opposing_piece() {
        let mut board = Board::empty();
        board.place(Piece::new(PieceKind::Rook, Color::White, sq("a1")));
        board.place(Piece::new(PieceKind::Bishop, Color::Black, sq("a7")));

        let captured = move_classical(&mut board, Color::White, sq("a1"), sq("a7"));
        assert_eq!(captured, Ok(Some(PieceKind::Bishop)));
        assert!(board.get(sq("a1")).is_none());
        let rook = board.get(sq("a7")).expect("rook moved");
        assert_eq!((rook.kind, rook.color), (PieceKind::Rook, Color::White));
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn classical_move_rejections() {
        let mut board = Board::standard();
        let before = board.clone();
        assert_eq!(
            move_classical(&mut board, Color::White, sq("e2"), sq("e2")),
            Err(GameError::InvalidMove("source and destination are the same square"))
        );
        assert_eq!(
            move_classical(&mut board, Color::White, sq("e4"), sq("e5")),
            Err(GameError::PieceNotFound(sq("e4")))
        );
        assert_eq!(
            move_classical(&mut board, Color::White, sq("e7"), sq("e5")),
            Err(GameError::NotYourPiece(sq("e7")))
        );
        assert_eq!(
            move_classical(&mut board, Color::White, sq("e1"), sq("e2")),
            Err(GameError::SquareOccupied(sq("e2")))
        );
        assert_eq!(board, before);
    }

    #[test]
    fn superposed_piece_must_collapse_before_moving() {
        let mut board = Board::standard();
        knight_split(&mut board, &[30, 70]).expect("split");
        assert_eq!(
            move_classical(&mut board, Color::White, sq("g1"), sq("f3")),
            Err(GameError::PieceSuperposed(sq("g1")))
        );
        // Candidate squares are claimed for the owner's other pieces too.
        assert_eq!(
            move_classical(&mut board, Color::White, sq("g2"), sq("h3")),
            Err(GameError::SquareOccupied(sq("h3")))
        );
        // The opponent may contest a candidate square.
        board.place(Piece::new(PieceKind::Queen, Color::Black, sq("d5")));
        assert_eq!(
            move_classical(&mut board, Color::Black, sq("d5"), sq("f3")),
            Ok(None)
        );
    }

    #[test]
    fn split_validates_candidates() {
        let mut board = Board::standard();
        let before = board.clone();
        assert_eq!(
            knight_split(&mut board, &[50]),
            Err(GameError::InvalidSuperposition(
                "positions and weights differ in length"
            ))
        );
        assert_eq!(
            knight_split(&mut board, &[50, 49]),
            Err(GameError::InvalidProbabilityDistribution)
        );
        assert_eq!(
            split(&mut board, Color::White, sq("g1"), &[sq("f3")], &[100], 3),
            Err(GameError::InvalidSuperposition(
                "needs between 2 and 8 candidate squares"
            ))
        );
        assert_eq!(
            split(
                &mut board,
                Color::White,
                sq("g1"),
                &[sq("f3"), sq("f3")],
                &[50, 50],
                3
            ),
            Err(GameError::InvalidSuperposition("duplicate candidate square"))
        );
        assert_eq!(
            split(
                &mut board,
                Color::White,
                sq("g1"),
                &[sq("f3"), sq("e2")],
                &[50, 50],
                3
            ),
            Err(GameError::SquareOccupied(sq("e2")))
        );
        assert_eq!(
            split(
                &mut board,
                Color::White,
                sq("b8"),
                &[sq("a6"), sq("c6")],
                &[50, 50],
                3
            ),
            Err(GameError::NotYourPiece(sq("b8")))
        );
        assert_eq!(board, before);
    }

    #[test]
    fn split_may_include_origin_and_enemy_squares() {
        let mut board = Board::standard();
        split(
            &mut board,
            Color::White,
            sq("d1"),
            &[sq("d1"), sq("d7")],
            &[50, 50],
            3,
        )
        .expect("contested square is allowed");
        assert!(board.get(sq("d1")).expect("queen").is_superposed());
    }

    #[test]
    fn superposition_cap_is_per_color() {
        let mut board = Board::standard();
        split(&mut board, Color::White, sq("b1"), &[sq("a3"), sq("c3")], &[50, 50], 2)
            .expect("first split");
        knight_split(&mut board, &[50, 50]).expect("second split");
        assert_eq!(
            split(&mut board, Color::White, sq("e2"), &[sq("e3"), sq("e4")], &[50, 50], 2),
            Err(GameError::TooManySuperposedPieces { max: 2 })
        );
        split(&mut board, Color::Black, sq("b8"), &[sq("a6"), sq("c6")], &[50, 50], 2)
            .expect("black has its own allowance");
        assert_eq!(board.superposed_count(Color::White), 2);
        assert_eq!(board.superposed_count(Color::Black), 1);
    }

    #[test]
    fn collapse_resolves_by_seed() {
        let mut board = Board::standard();
        knight_split(&mut board, &[30, 70]).expect("split");

        let mut low = board.clone();
        let collapsed = collapse(&mut low, sq("g1"), 29).expect("collapse");
        assert_eq!(
            collapsed,
            Some(Collapsed {
                origin: sq("g1"),
                resolved: sq("f3"),
                captured: None,
                reanchored: None,
            })
        );
        let knight = low.get(sq("f3")).expect("knight resolved");
        assert!(!knight.is_superposed());
        assert!(low.get(sq("g1")).is_none());

        let mut high = board;
        let collapsed = collapse(&mut high, sq("g1"), 30).expect("collapse");
        assert_eq!(collapsed.map(|c| c.resolved), Some(sq("h3")));
    }

    #[test]
    fn collapse_of_classical_piece_is_noop() {
        let mut board = Board::standard();
        let before = board.clone();
        assert_eq!(collapse(&mut board, sq("e2"), 7), Ok(None));
        assert_eq!(board, before);
        assert_eq!(
            collapse(&mut board, sq("e4"), 7),
            Err(GameError::PieceNotFound(sq("e4")))
        );
    }

    #[test]
    fn collapse_captures_piece_on_resolved_square() {
        let mut board = Board::empty();
        board.place(Piece::new(PieceKind::Knight, Color::White, sq("g1")));
        board.place(Piece::new(PieceKind::Pawn, Color::Black, sq("h3")));
        knight_split(&mut board, &[0, 100]).expect("split onto contested square");

        let collapsed = collapse(&mut board, sq("g1"), 0).expect("collapse");
        assert_eq!(
            collapsed.and_then(|c| c.captured),
            Some(PieceKind::Pawn)
        );
        let knight = board.get(sq("h3")).expect("knight");
        assert_eq!(knight.color, Color::White);
        assert_eq!(board.len(), 1);
    }

    fn rook_split_onto_g1(board: &mut Board) -> Result<(), GameError> {
        split(
            board,
            Color::Black,
            sq("g8"),
            &[sq("g1"), sq("g7")],
            &[100, 0],
            3,
        )
    }

    #[test]
    fn collapse_onto_bare_anchor_does_not_capture() {
        let mut board = Board::empty();
        board.place(Piece::new(PieceKind::Knight, Color::White, sq("g1")));
        board.place(Piece::new(PieceKind::Rook, Color::Black, sq("g8")));
        knight_split(&mut board, &[50, 50]).expect("knight split");
        rook_split_onto_g1(&mut board).expect("rook split");

        let collapsed = collapse(&mut board, sq("g8"), 0).expect("collapse");
        assert_eq!(
            collapsed,
            Some(Collapsed {
                origin: sq("g8"),
                resolved: sq("g1"),
                captured: None,
                reanchored: Some((sq("g1"), sq("f3"))),
            })
        );
        let rook = board.get(sq("g1")).expect("rook resolved");
        assert_eq!((rook.kind, rook.color), (PieceKind::Rook, Color::Black));
        assert!(!rook.is_superposed());

        // The knight keeps its superposition under its first free candidate.
        let knight = board.get(sq("f3")).expect("knight re-anchored");
        assert_eq!(knight.kind, PieceKind::Knight);
        assert!(knight.is_superposed());
        assert!(knight.covers(sq("h3")));
        assert_eq!(board.superposed_count(Color::White), 1);
        assert_eq!(board.len(), 2);

        let collapsed = collapse(&mut board, sq("f3"), 99).expect("knight collapse");
        assert_eq!(collapsed.map(|c| c.resolved), Some(sq("h3")));
    }

    #[test]
    fn bare_anchor_falls_back_to_vacated_square() {
        let mut board = Board::empty();
        board.place(Piece::new(PieceKind::Knight, Color::White, sq("g1")));
        board.place(Piece::new(PieceKind::Rook, Color::Black, sq("g8")));
        board.place(Piece::new(PieceKind::Pawn, Color::Black, sq("f3")));
        board.place(Piece::new(PieceKind::Pawn, Color::Black, sq("h3")));
        knight_split(&mut board, &[50, 50]).expect("knight split");
        rook_split_onto_g1(&mut board).expect("rook split");

        let collapsed = collapse(&mut board, sq("g8"), 0).expect("collapse");
        assert_eq!(collapsed.and_then(|c| c.captured), None);
        let knight = board.get(sq("g8")).expect("knight anchored on the vacated square");
        assert_eq!(knight.color, Color::White);
        assert!(knight.is_superposed());
        assert_eq!(board.len(), 4);
    }

    #[test]
    fn collapse_captures_superposed_piece_listing_the_square() {
        let mut board = Board::empty();
        board.place(Piece::new(PieceKind::Queen, Color::White, sq("g1")));
        board.place(Piece::new(PieceKind::Rook, Color::Black, sq("g8")));
        split(
            &mut board,
            Color::White,
            sq("g1"),
            &[sq("g1"), sq("d4")],
            &[50, 50],
            3,
        )
        .expect("queen split");
        rook_split_onto_g1(&mut board).expect("rook split");

        let collapsed = collapse(&mut board, sq("g8"), 0).expect("collapse");
        assert_eq!(collapsed.and_then(|c| c.captured), Some(PieceKind::Queen));
        assert_eq!(board.superposed_count(Color::White), 0);
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn classical_move_onto_bare_anchor_reanchors() {
        let mut board = Board::empty();
        board.place(Piece::new(PieceKind::Knight, Color::White, sq("g1")));
        board.place(Piece::new(PieceKind::Rook, Color::Black, sq("g8")));
        knight_split(&mut board, &[50, 50]).expect("knight split");

        assert_eq!(
            move_classical(&mut board, Color::Black, sq("g8"), sq("g1")),
            Ok(None)
        );
        assert_eq!(board.get(sq("g1")).map(|p| p.color), Some(Color::Black));
        assert!(board.get(sq("f3")).expect("knight").is_superposed());
        assert_eq!(board.len(), 2);

        // A superposed piece listing its anchor cannot be taken by a classical move.
        let mut board = Board::empty();
        board.place(Piece::new(PieceKind::Queen, Color::White, sq("d1")));
        board.place(Piece::new(PieceKind::Rook, Color::Black, sq("d8")));
        split(&mut board, Color::White, sq("d1"), &[sq("d1"), sq("d4")], &[50, 50], 3)
            .expect("queen split");
        assert_eq!(
            move_classical(&mut board, Color::Black, sq("d8"), sq("d1")),
            Err(GameError::PieceSuperposed(sq("d1")))
        );
    }

    #[test]
    fn measure_resolves_listed_pieces_in_order() {
        let mut board = Board::standard();
        knight_split(&mut board, &[30, 70]).expect("white split");
        split(&mut board, Color::Black, sq("b8"), &[sq("a6"), sq("c6")], &[50, 50], 3)
            .expect("black split");

        // g1 uses seed 29 (f3), b8 uses seed 30 (a6).
        let measured = measure(&mut board, &[sq("g1"), sq("b8")], 29).expect("measure");
        let resolved: Vec<_> = measured.iter().map(|c| (c.origin, c.resolved)).collect();
        assert_eq!(
            resolved,
            vec![(sq("g1"), sq("f3")), (sq("b8"), sq("a6"))]
        );
        assert!(!board.has_superposed());
        assert_eq!(board.get(sq("a6")).map(|p| p.kind), Some(PieceKind::Knight));
    }

    #[test]
    fn measure_rejects_bad_square_lists() {
        let mut board = Board::standard();
        knight_split(&mut board, &[30, 70]).expect("split");
        let before = board.clone();
        assert_eq!(
            measure(&mut board, &[], 0),
            Err(GameError::InvalidMove("measurement names no squares"))
        );
        assert_eq!(
            measure(&mut board, &[sq("g1"), sq("g1")], 0),
            Err(GameError::InvalidMove("duplicate measured square"))
        );
        assert_eq!(
            measure(&mut board, &[sq("g1"), sq("e4")], 0),
            Err(GameError::PieceNotFound(sq("e4")))
        );
        assert_eq!(
            measure(&mut board, &[sq("g1"), sq("e2")], 0),
            Err(GameError::InvalidMove("measured square holds a classical piece"))
        );
        assert_eq!(board, before);
    }

    #[test]
    fn measure_skips_captured_and_follows_reanchored_pieces() {
        // The rook resolves onto the queen's candidate d4 anchor and captures her.
        let mut board = Board::empty();
        board.place(Piece::new(PieceKind::Queen, Color::White, sq("d4")));
        board.place(Piece::new(PieceKind::Rook, Color::Black, sq("d8")));
        split(&mut board, Color::White, sq("d4"), &[sq("d4"), sq("a4")], &[50, 50], 3)
            .expect("queen split");
        split(&mut board, Color::Black, sq("d8"), &[sq("d4"), sq("d7")], &[100, 0], 3)
            .expect("rook split");
        let measured = measure(&mut board, &[sq("d8"), sq("d4")], 0).expect("measure");
        assert_eq!(measured.len(), 1);
        assert_eq!(measured[0].captured, Some(PieceKind::Queen));
        assert_eq!(board.len(), 1);

        // The rook lands on the knight's bare anchor; the knight then resolves from f3.
        let mut board = Board::empty();
        board.place(Piece::new(PieceKind::Knight, Color::White, sq("g1")));
        board.place(Piece::new(PieceKind::Rook, Color::Black, sq("g8")));
        knight_split(&mut board, &[50, 50]).expect("knight split");
        rook_split_onto_g1(&mut board).expect("rook split");
        let measured = measure(&mut board, &[sq("g8"), sq("g1")], 0).expect("measure");
        let resolved: Vec<_> = measured.iter().map(|c| (c.origin, c.resolved)).collect();
        // The knight uses seed 1, below 50, so it stays on f3.
        assert_eq!(
            resolved,
            vec![(sq("g8"), sq("g1")), (sq("f3"), sq("f3"))]
        );
        assert!(!board.has_superposed());
        assert_eq!(board.len(), 2);
    }
}
