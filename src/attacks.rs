//! Attacked-square geometry and the per-channel attack tensor.
//!
//! A square counts as attacked when a piece could capture on it if it held an
//! enemy piece. Sliding rays stop at the first occupied square and include it,
//! whatever its color, so defended pieces are marked as well.

use ndarray::{Array3, Array4, ArrayViewMut3, Axis};
use rayon::prelude::*;

use crate::board::{Color, Piece, PieceKind, Snapshot, Square, SquareSet, NUM_CHANNELS};

pub const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

pub const KING_OFFSETS: [(i8, i8); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

pub const ROOK_DIRECTIONS: [(i8, i8); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

pub const BISHOP_DIRECTIONS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];

pub const QUEEN_DIRECTIONS: [(i8, i8); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, -1),
    (-1, 1),
];

/// Ray directions of a sliding piece; empty for non-sliders
pub fn slider_directions(kind: PieceKind) -> &'static [(i8, i8)] {
    match kind {
        PieceKind::Rook => &ROOK_DIRECTIONS,
        PieceKind::Bishop => &BISHOP_DIRECTIONS,
        PieceKind::Queen => &QUEEN_DIRECTIONS,
        _ => &[],
    }
}

/// Squares along one direction up to and including the first occupied one
pub fn ray_attacks(snapshot: &Snapshot, from: Square, direction: (i8, i8)) -> SquareSet {
    let mut attacked = SquareSet::EMPTY;
    let mut current = from;
    while let Some(next) = current.offset(direction.0, direction.1) {
        attacked.insert(next);
        if snapshot.is_occupied(next) {
            break;
        }
        current = next;
    }
    attacked
}

fn step_attacks(from: Square, offsets: &[(i8, i8)]) -> SquareSet {
    offsets
        .iter()
        .filter_map(|&(df, dr)| from.offset(df, dr))
        .collect()
}

/// Diagonal capture squares of a pawn; the advance square is never included
pub fn pawn_attacks(from: Square, color: Color) -> SquareSet {
    let forward = color.forward();
    step_attacks(from, &[(-1, forward), (1, forward)])
}

/// Squares attacked by `piece` standing on `from`
pub fn attacks_from(snapshot: &Snapshot, from: Square, piece: Piece) -> SquareSet {
    match piece.kind {
        PieceKind::Pawn => pawn_attacks(from, piece.color),
        PieceKind::Knight => step_attacks(from, &KNIGHT_OFFSETS),
        PieceKind::King => step_attacks(from, &KING_OFFSETS),
        PieceKind::Rook | PieceKind::Bishop | PieceKind::Queen => slider_directions(piece.kind)
            .iter()
            .fold(SquareSet::EMPTY, |acc, &dir| {
                acc | ray_attacks(snapshot, from, dir)
            }),
    }
}

/// Whether any piece of color `by` attacks `target`
///
/// Looks outward from the target instead of iterating every attacker, which
/// keeps king-safety checks during replay cheap.
pub fn is_square_attacked(snapshot: &Snapshot, target: Square, by: Color) -> bool {
    let holds = |square: Option<Square>, kind: PieceKind| {
        square.and_then(|sq| snapshot.piece_at(sq)) == Some(Piece::new(by, kind))
    };

    // A pawn of `by` attacks forward, so look one rank behind the target
    let back = -by.forward();
    if holds(target.offset(-1, back), PieceKind::Pawn)
        || holds(target.offset(1, back), PieceKind::Pawn)
    {
        return true;
    }

    if KNIGHT_OFFSETS
        .iter()
        .any(|&(df, dr)| holds(target.offset(df, dr), PieceKind::Knight))
    {
        return true;
    }

    if KING_OFFSETS
        .iter()
        .any(|&(df, dr)| holds(target.offset(df, dr), PieceKind::King))
    {
        return true;
    }

    let first_blocker = |direction: (i8, i8)| -> Option<Piece> {
        let mut current = target;
        while let Some(next) = current.offset(direction.0, direction.1) {
            if let Some(piece) = snapshot.piece_at(next) {
                return Some(piece);
            }
            current = next;
        }
        None
    };

    let slides = |directions: &[(i8, i8)], kind: PieceKind| {
        directions.iter().any(|&dir| {
            matches!(
                first_blocker(dir),
                Some(piece) if piece.color == by && (piece.kind == kind || piece.kind == PieceKind::Queen)
            )
        })
    };

    slides(&ROOK_DIRECTIONS, PieceKind::Rook) || slides(&BISHOP_DIRECTIONS, PieceKind::Bishop)
}

/// Converts snapshots into `(12, 8, 8)` attacked-square tensors
///
/// Entry `[channel, row, col]` is 1 when at least one piece of that channel
/// attacks the square. Attacker counts are not preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttackCalculator;

impl AttackCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Union of attacked squares per channel
    pub fn attack_sets(&self, snapshot: &Snapshot) -> [SquareSet; NUM_CHANNELS] {
        let mut sets = [SquareSet::EMPTY; NUM_CHANNELS];
        for (square, piece) in snapshot.pieces() {
            sets[piece.channel()] |= attacks_from(snapshot, square, piece);
        }
        sets
    }

    pub fn compute(&self, snapshot: &Snapshot) -> Array3<u8> {
        let mut tensor = Array3::zeros((NUM_CHANNELS, 8, 8));
        self.compute_into(snapshot, tensor.view_mut());
        tensor
    }

    /// Write the attack tensor into an existing `(12, 8, 8)` view
    pub fn compute_into(&self, snapshot: &Snapshot, mut out: ArrayViewMut3<u8>) {
        out.fill(0);
        for (channel, set) in self.attack_sets(snapshot).iter().enumerate() {
            for square in set.iter() {
                out[[channel, square.row(), square.col()]] = 1;
            }
        }
    }

    /// Stack the attack tensors of a snapshot sequence into `(time, 12, 8, 8)`
    pub fn compute_sequence(&self, snapshots: &[Snapshot]) -> Array4<u8> {
        let mut tensor = Array4::zeros((snapshots.len(), NUM_CHANNELS, 8, 8));
        for (t, snapshot) in snapshots.iter().enumerate() {
            self.compute_into(snapshot, tensor.index_axis_mut(Axis(0), t));
        }
        tensor
    }

    /// Compute many independent snapshots in parallel
    pub fn compute_batch(&self, snapshots: &[Snapshot]) -> Vec<Array3<u8>> {
        snapshots
            .par_iter()
            .map(|snapshot| self.compute(snapshot))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;

    fn sq(name: &str) -> Square {
        Square::parse(name).unwrap()
    }

    fn squares(names: &[&str]) -> SquareSet {
        names.iter().map(|name| sq(name)).collect()
    }

    const WHITE_KING: usize = 5;

    #[test]
    fn test_lone_king_on_e1() {
        let snapshot = Snapshot::from_placement("8/8/8/8/8/8/8/4K3").unwrap();
        let tensor = AttackCalculator::new().compute(&snapshot);

        let expected = squares(&["d1", "f1", "d2", "e2", "f2"]);
        for square in Square::all() {
            let want = u8::from(expected.contains(square));
            assert_eq!(
                tensor[[WHITE_KING, square.row(), square.col()]],
                want,
                "king channel at {square}"
            );
        }
        assert_eq!(tensor.sum(), 5);
    }

    #[test]
    fn test_king_in_center_attacks_eight_squares() {
        let snapshot = Snapshot::from_placement("8/8/8/8/3K4/8/8/8").unwrap();
        let sets = AttackCalculator::new().attack_sets(&snapshot);
        assert_eq!(sets[WHITE_KING].len(), 8);
    }

    #[test]
    fn test_pawn_attacks_diagonals_only() {
        let snapshot = Snapshot::from_placement("8/8/8/3p4/8/8/4P3/8").unwrap();
        let sets = AttackCalculator::new().attack_sets(&snapshot);
        assert_eq!(sets[Piece::new(Color::White, PieceKind::Pawn).channel()], squares(&["d3", "f3"]));
        assert_eq!(sets[Piece::new(Color::Black, PieceKind::Pawn).channel()], squares(&["c4", "e4"]));
    }

    #[test]
    fn test_edge_pawn_has_single_attack() {
        let snapshot = Snapshot::from_placement("8/8/8/8/8/8/P7/8").unwrap();
        let set = attacks_from(&snapshot, sq("a2"), Piece::new(Color::White, PieceKind::Pawn));
        assert_eq!(set, squares(&["b3"]));
    }

    #[test]
    fn test_knight_in_corner() {
        let snapshot = Snapshot::from_placement("8/8/8/8/8/8/8/N7").unwrap();
        let set = attacks_from(&snapshot, sq("a1"), Piece::new(Color::White, PieceKind::Knight));
        assert_eq!(set, squares(&["b3", "c2"]));
    }

    #[test]
    fn test_rook_ray_includes_first_blocker_of_either_color() {
        // Rook a1, own pawn a4, enemy knight d1
        let snapshot = Snapshot::from_placement("8/8/8/8/P7/8/8/R2n4").unwrap();
        let set = attacks_from(&snapshot, sq("a1"), Piece::new(Color::White, PieceKind::Rook));
        assert_eq!(set, squares(&["a2", "a3", "a4", "b1", "c1", "d1"]));
    }

    #[test]
    fn test_single_direction_ray() {
        let snapshot = Snapshot::from_placement("8/8/8/8/8/8/8/B7").unwrap();
        let ray = ray_attacks(&snapshot, sq("a1"), (1, 1));
        assert_eq!(ray.len(), 7);
        assert!(ray.contains(sq("h8")));
        assert!(ray_attacks(&snapshot, sq("a1"), (-1, 1)).is_empty());
    }

    #[test]
    fn test_queen_blocked_on_every_side() {
        let snapshot = Snapshot::from_placement("8/8/8/2ppp3/2pQp3/2ppp3/8/8").unwrap();
        let set = attacks_from(&snapshot, sq("d4"), Piece::new(Color::White, PieceKind::Queen));
        assert_eq!(set.len(), 8);
    }

    #[test]
    fn test_attack_entries_are_binary() {
        // Both rooks attack d4; the entry stays 1
        let snapshot = Snapshot::from_placement("8/8/8/8/R6R/8/8/8").unwrap();
        let tensor = AttackCalculator::new().compute(&snapshot);
        let rook = Piece::new(Color::White, PieceKind::Rook).channel();
        let d4 = sq("d4");
        assert_eq!(tensor[[rook, d4.row(), d4.col()]], 1);
        assert!(tensor.iter().all(|&v| v <= 1));
    }

    #[test]
    fn test_starting_position_attacks() {
        let snapshot = Board::starting_position().snapshot();
        let sets = AttackCalculator::new().attack_sets(&snapshot);
        let white = |kind| sets[Piece::new(Color::White, kind).channel()];

        assert_eq!(white(PieceKind::Pawn).len(), 8);
        assert!(white(PieceKind::Pawn).iter().all(|sq| sq.rank() == 2));
        assert_eq!(white(PieceKind::Knight), squares(&["a3", "c3", "f3", "h3", "d2", "e2"]));
        // Rooks only see their neighbours b1/g1 and a2/h2
        assert_eq!(white(PieceKind::Rook), squares(&["a2", "b1", "g1", "h2"]));
        assert_eq!(white(PieceKind::Queen), squares(&["c1", "c2", "d2", "e2", "e1"]));
    }

    #[test]
    fn test_reverse_query_matches_forward_sets() {
        let positions = [
            "r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8",
        ];
        let calculator = AttackCalculator::new();
        for placement in positions {
            let snapshot = Snapshot::from_placement(placement).unwrap();
            let sets = calculator.attack_sets(&snapshot);
            for color in Color::ALL {
                let union = sets[color.index() * 6..color.index() * 6 + 6]
                    .iter()
                    .fold(SquareSet::EMPTY, |acc, set| acc | *set);
                for square in Square::all() {
                    assert_eq!(
                        is_square_attacked(&snapshot, square, color),
                        union.contains(square),
                        "{placement}: {color:?} on {square}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_sequence_shape() {
        let snapshots = vec![Board::starting_position().snapshot(); 3];
        let tensor = AttackCalculator::new().compute_sequence(&snapshots);
        assert_eq!(tensor.shape(), &[3, NUM_CHANNELS, 8, 8]);
        let batch = AttackCalculator::new().compute_batch(&snapshots);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], tensor.index_axis(Axis(0), 0));
    }
}
