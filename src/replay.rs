//! Sequential replay of algebraic move lists.
//!
//! Each game gets its own [`Board`], created from the engine's start position.
//! A game either replays completely, yielding one [`Snapshot`] per token, or
//! fails with a single [`ExtractionError::MoveApplication`] and yields nothing.

use crate::attacks::{attacks_from, is_square_attacked};
use crate::board::{Board, CastleSide, Color, Piece, PieceKind, Snapshot, Square};
use crate::errors::{ExtractionError, MoveRejection, Result};
use crate::san::SanMove;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Quiet,
    DoublePush,
    EnPassant,
    Castle(CastleSide),
}

/// A fully resolved move: origin, destination and special handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
    pub kind: MoveKind,
}

impl Board {
    /// Parse, resolve and play one algebraic token
    ///
    /// On error the board is left untouched.
    pub fn apply_san(&mut self, token: &str) -> std::result::Result<Move, MoveRejection> {
        let san = SanMove::parse(token)?;
        let mv = self.resolve(&san)?;
        self.make_move(mv);
        Ok(mv)
    }

    /// Find the single legal move a parsed token denotes
    pub fn resolve(&self, san: &SanMove) -> std::result::Result<Move, MoveRejection> {
        match *san {
            SanMove::Castle(side) => self.resolve_castle(side),
            SanMove::Normal {
                kind,
                from_file,
                from_rank,
                capture,
                to,
                promotion,
            } => self.resolve_normal(kind, from_file, from_rank, capture, to, promotion),
        }
    }

    /// Whether `color`'s king is currently attacked
    pub fn in_check(&self, color: Color) -> bool {
        match self.placement.king_square(color) {
            Some(king) => is_square_attacked(&self.placement, king, color.opposite()),
            None => false,
        }
    }

    fn resolve_normal(
        &self,
        kind: PieceKind,
        from_file: Option<u8>,
        from_rank: Option<u8>,
        capture: bool,
        to: Square,
        promotion: Option<PieceKind>,
    ) -> std::result::Result<Move, MoveRejection> {
        let us = self.side_to_move;
        let target = self.piece_at(to);

        if target.is_some_and(|piece| piece.color == us) {
            return Err(MoveRejection::OwnPieceOnTarget);
        }
        let en_passant_target = kind == PieceKind::Pawn && self.en_passant == Some(to);
        if capture && target.is_none() && !en_passant_target {
            return Err(MoveRejection::NothingToCapture);
        }

        let promotes = kind == PieceKind::Pawn && to.rank() == us.promotion_rank();
        let promotion = match (promotes, promotion) {
            (true, None) => Some(PieceKind::Queen),
            (
                true,
                Some(
                    piece @ (PieceKind::Queen
                    | PieceKind::Rook
                    | PieceKind::Bishop
                    | PieceKind::Knight),
                ),
            ) => Some(piece),
            (false, None) => None,
            _ => return Err(MoveRejection::InvalidPromotion),
        };

        let mover = Piece::new(us, kind);
        let candidates: Vec<Move> = self
            .placement
            .pieces()
            .filter(|&(from, piece)| {
                piece == mover
                    && from_file.map_or(true, |file| from.file() == file)
                    && from_rank.map_or(true, |rank| from.rank() == rank)
            })
            .filter_map(|(from, _)| {
                let move_kind = if kind == PieceKind::Pawn {
                    self.pawn_move_kind(from, to)?
                } else if attacks_from(&self.placement, from, mover).contains(to) {
                    MoveKind::Quiet
                } else {
                    return None;
                };
                Some(Move {
                    from,
                    to,
                    promotion,
                    kind: move_kind,
                })
            })
            .collect();

        if candidates.is_empty() {
            return Err(MoveRejection::NoMatchingPiece);
        }

        let legal: Vec<Move> = candidates
            .into_iter()
            .filter(|mv| self.keeps_king_safe(*mv))
            .collect();

        match legal.as_slice() {
            [] => Err(MoveRejection::LeavesKingInCheck),
            [mv] => Ok(*mv),
            many => Err(MoveRejection::Ambiguous {
                candidates: many.len(),
            }),
        }
    }

    /// How a pawn on `from` reaches `to`, if it can
    fn pawn_move_kind(&self, from: Square, to: Square) -> Option<MoveKind> {
        let us = self.side_to_move;
        let forward = us.forward();
        let target = self.piece_at(to);

        if to.file() == from.file() {
            if target.is_some() {
                return None;
            }
            if from.offset(0, forward) == Some(to) {
                return Some(MoveKind::Quiet);
            }
            let middle = from.offset(0, forward)?;
            if from.rank() == us.pawn_rank()
                && middle.offset(0, forward) == Some(to)
                && !self.placement.is_occupied(middle)
            {
                return Some(MoveKind::DoublePush);
            }
            return None;
        }

        let diagonal =
            from.offset(-1, forward) == Some(to) || from.offset(1, forward) == Some(to);
        if !diagonal {
            return None;
        }
        if target.is_some() {
            return Some(MoveKind::Quiet);
        }
        if self.en_passant == Some(to) {
            let victim = Square::new(to.file(), from.rank());
            if self.piece_at(victim) == Some(Piece::new(us.opposite(), PieceKind::Pawn)) {
                return Some(MoveKind::EnPassant);
            }
        }
        None
    }

    fn resolve_castle(&self, side: CastleSide) -> std::result::Result<Move, MoveRejection> {
        let us = self.side_to_move;
        let them = us.opposite();
        let rank = us.back_rank();
        let unavailable = Err(MoveRejection::CastlingUnavailable(side));

        if !self.castling.has(us, side) {
            return unavailable;
        }
        let king_from = Square::new(4, rank);
        let rook_from = Square::new(side.rook_home_file(), rank);
        if self.piece_at(king_from) != Some(Piece::new(us, PieceKind::King))
            || self.piece_at(rook_from) != Some(Piece::new(us, PieceKind::Rook))
        {
            return unavailable;
        }

        let (low, high) = match side {
            CastleSide::KingSide => (5, 7),
            CastleSide::QueenSide => (1, 4),
        };
        if (low..high).any(|file| self.placement.is_occupied(Square::new(file, rank))) {
            return unavailable;
        }

        // The king may not start on, cross or land on an attacked square
        let king_to = side.king_target_file();
        let (path_low, path_high) = if king_to > 4 { (4, king_to) } else { (king_to, 4) };
        if (path_low..=path_high)
            .any(|file| is_square_attacked(&self.placement, Square::new(file, rank), them))
        {
            return unavailable;
        }

        Ok(Move {
            from: king_from,
            to: Square::new(king_to, rank),
            promotion: None,
            kind: MoveKind::Castle(side),
        })
    }

    fn keeps_king_safe(&self, mv: Move) -> bool {
        let mut next = self.clone();
        next.make_move(mv);
        !next.in_check(self.side_to_move)
    }

    /// Play a resolved move and update rights, en-passant target and clocks
    pub(crate) fn make_move(&mut self, mv: Move) {
        let us = self.side_to_move;
        let Some(moving) = self.placement.take(mv.from) else {
            debug_assert!(false, "no piece on {}", mv.from);
            return;
        };

        let mut captured = self.placement.take(mv.to);
        match mv.kind {
            MoveKind::EnPassant => {
                captured = self.placement.take(Square::new(mv.to.file(), mv.from.rank()));
            }
            MoveKind::Castle(side) => {
                let rank = us.back_rank();
                let rook = self
                    .placement
                    .take(Square::new(side.rook_home_file(), rank));
                self.placement
                    .put(Square::new(side.rook_target_file(), rank), rook);
            }
            MoveKind::Quiet | MoveKind::DoublePush => {}
        }

        let placed = match mv.promotion {
            Some(kind) => Piece::new(us, kind),
            None => moving,
        };
        self.placement.put(mv.to, Some(placed));

        if moving.kind == PieceKind::King {
            self.castling.remove_color(us);
        }
        self.revoke_rook_rights(mv.from);
        self.revoke_rook_rights(mv.to);

        self.en_passant = match mv.kind {
            MoveKind::DoublePush => mv.from.offset(0, us.forward()),
            _ => None,
        };

        if moving.kind == PieceKind::Pawn || captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }
        if us == Color::Black {
            self.fullmove_number += 1;
        }
        self.side_to_move = us.opposite();
    }

    /// A rook leaving or being captured on its home corner loses that right
    fn revoke_rook_rights(&mut self, square: Square) {
        for color in Color::ALL {
            if square.rank() != color.back_rank() {
                continue;
            }
            for side in [CastleSide::KingSide, CastleSide::QueenSide] {
                if square.file() == side.rook_home_file() {
                    self.castling.remove(color, side);
                }
            }
        }
    }
}

/// Replays move lists from a fixed start position
#[derive(Debug, Clone)]
pub struct MoveReplayEngine {
    start: Board,
}

impl Default for MoveReplayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveReplayEngine {
    /// Engine starting every game from the standard initial position
    pub fn new() -> Self {
        Self {
            start: Board::starting_position(),
        }
    }

    /// Engine starting every game from a custom position
    pub fn from_position(start: Board) -> Self {
        Self { start }
    }

    pub fn start_position(&self) -> &Board {
        &self.start
    }

    /// Apply every token in order; `snapshots[t]` is the position after move `t`
    pub fn replay<S: AsRef<str>>(&self, moves: &[S]) -> Result<Vec<Snapshot>> {
        let mut board = self.start.clone();
        let mut snapshots = Vec::with_capacity(moves.len());
        for (ply, token) in moves.iter().enumerate() {
            let token = token.as_ref();
            board
                .apply_san(token)
                .map_err(|reason| ExtractionError::MoveApplication {
                    ply,
                    token: token.to_string(),
                    reason,
                })?;
            snapshots.push(board.snapshot());
        }
        Ok(snapshots)
    }

    /// Replay and return the final board instead of the snapshots
    pub fn final_position<S: AsRef<str>>(&self, moves: &[S]) -> Result<Board> {
        let mut board = self.start.clone();
        for (ply, token) in moves.iter().enumerate() {
            let token = token.as_ref();
            board
                .apply_san(token)
                .map_err(|reason| ExtractionError::MoveApplication {
                    ply,
                    token: token.to_string(),
                    reason,
                })?;
        }
        Ok(board)
    }
}
