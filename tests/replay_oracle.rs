//! Replay and attack maps checked against the `chess` crate

use chess_tensor_extractor::attacks::AttackCalculator;
use chess_tensor_extractor::board::NUM_CHANNELS;
use chess_tensor_extractor::{
    Board, BoardEncoder, CastleSide, Color, MoveReplayEngine, Piece, PieceKind, Square,
};
use ndarray::Axis;

use chess::{BitBoard, BoardStatus, ChessMove, MoveGen};

const OPERA_GAME: &str = "e4 e5 Nf3 d6 d4 Bg4 dxe5 Bxf3 Qxf3 dxe5 Bc4 Nf6 Qb3 Qe7 Nc3 c6 \
                          Bg5 b5 Nxb5 cxb5 Bxb5+ Nbd7 O-O-O Rd8 Rxd7 Rxd7 Rd1 Qe6 Bxd7+ Nxd7 \
                          Qb8+ Nxb8 Rd8#";

fn chess_square(square: Square) -> chess::Square {
    chess::Square::make_square(
        chess::Rank::from_index(square.rank() as usize),
        chess::File::from_index(square.file() as usize),
    )
}

fn chess_color(color: Color) -> chess::Color {
    match color {
        Color::White => chess::Color::White,
        Color::Black => chess::Color::Black,
    }
}

fn chess_kind(kind: PieceKind) -> chess::Piece {
    match kind {
        PieceKind::Pawn => chess::Piece::Pawn,
        PieceKind::Rook => chess::Piece::Rook,
        PieceKind::Knight => chess::Piece::Knight,
        PieceKind::Bishop => chess::Piece::Bishop,
        PieceKind::Queen => chess::Piece::Queen,
        PieceKind::King => chess::Piece::King,
    }
}

fn san_letter(kind: chess::Piece) -> char {
    match kind {
        chess::Piece::Pawn => 'P',
        chess::Piece::Rook => 'R',
        chess::Piece::Knight => 'N',
        chess::Piece::Bishop => 'B',
        chess::Piece::Queen => 'Q',
        chess::Piece::King => 'K',
    }
}

fn oracle_piece(board: &chess::Board, square: Square) -> Option<Piece> {
    let sq = chess_square(square);
    let kind = board.piece_on(sq)?;
    let color = board.color_on(sq)?;
    let color = Color::ALL
        .into_iter()
        .find(|&c| chess_color(c) == color)?;
    let kind = PieceKind::ALL
        .into_iter()
        .find(|&k| chess_kind(k) == kind)?;
    Some(Piece::new(color, kind))
}

fn assert_same_position(ours: &Board, theirs: &chess::Board, context: &str) {
    for square in Square::all() {
        assert_eq!(
            ours.piece_at(square),
            oracle_piece(theirs, square),
            "{context}: square {square}"
        );
    }
    assert_eq!(
        chess_color(ours.side_to_move()),
        theirs.side_to_move(),
        "{context}: side to move"
    );
    for color in Color::ALL {
        let rights = theirs.castle_rights(chess_color(color));
        assert_eq!(
            ours.castling_rights().has(color, CastleSide::KingSide),
            rights.has_kingside(),
            "{context}: {color:?} kingside rights"
        );
        assert_eq!(
            ours.castling_rights().has(color, CastleSide::QueenSide),
            rights.has_queenside(),
            "{context}: {color:?} queenside rights"
        );
    }
}

/// Play `tokens` on both boards, requiring every resolved move to be legal
/// for the oracle too
fn replay_both(tokens: &[&str]) -> (Board, chess::Board) {
    let mut ours = Board::starting_position();
    let mut theirs = chess::Board::default();
    for (ply, token) in tokens.iter().enumerate() {
        let mv = ours
            .apply_san(token)
            .unwrap_or_else(|err| panic!("ply {ply} {token}: {err}"));
        let oracle_move = ChessMove::new(
            chess_square(mv.from),
            chess_square(mv.to),
            mv.promotion.map(chess_kind),
        );
        assert!(theirs.legal(oracle_move), "ply {ply} {token} is illegal");
        theirs = theirs.make_move_new(oracle_move);
        assert_same_position(&ours, &theirs, &format!("ply {ply} {token}"));
    }
    (ours, theirs)
}

#[test]
fn test_opera_game_matches_oracle() {
    let tokens: Vec<&str> = OPERA_GAME.split_whitespace().collect();
    let (_, theirs) = replay_both(&tokens);
    assert_eq!(theirs.status(), BoardStatus::Checkmate);

    let snapshots = MoveReplayEngine::new().replay(&tokens).unwrap();
    assert_eq!(snapshots.len(), tokens.len());
}

#[test]
fn test_en_passant_and_promotion_match_oracle() {
    replay_both(&[
        "e4", "Nf6", "e5", "d5", "exd6", "e6", "dxc7", "Qd7", "cxb8=Q", "Rxb8",
    ]);
}

#[test]
fn test_castling_and_disambiguation_match_oracle() {
    replay_both(&[
        "d4", "d5", "Nf3", "Nf6", "Nbd2", "Nbd7", "e3", "e6", "Bd3", "Bd6", "O-O", "O-O",
    ]);
}

/// Long-form SAN for an oracle move: pieces carry their full origin square
fn long_san(board: &chess::Board, mv: ChessMove) -> String {
    let from = mv.get_source();
    let to = mv.get_dest();
    let kind = board.piece_on(from).expect("move source holds a piece");
    let file = |sq: chess::Square| (b'a' + sq.get_file().to_index() as u8) as char;
    let rank = |sq: chess::Square| (b'1' + sq.get_rank().to_index() as u8) as char;

    let file_delta = from.get_file().to_index() as i32 - to.get_file().to_index() as i32;
    if kind == chess::Piece::King && file_delta.abs() == 2 {
        return if file_delta < 0 { "O-O" } else { "O-O-O" }.to_string();
    }

    let capture = board.piece_on(to).is_some()
        || (kind == chess::Piece::Pawn && from.get_file() != to.get_file());
    let mut san = String::new();
    if kind == chess::Piece::Pawn {
        if capture {
            san.push(file(from));
        }
    } else {
        san.push(san_letter(kind));
        san.push(file(from));
        san.push(rank(from));
    }
    if capture {
        san.push('x');
    }
    san.push(file(to));
    san.push(rank(to));
    if let Some(promotion) = mv.get_promotion() {
        san.push('=');
        san.push(san_letter(promotion));
    }
    san
}

fn next_random(state: &mut u64) -> usize {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    (*state >> 33) as usize
}

fn oracle_attack_bits(board: &chess::Board, color: chess::Color, kind: chess::Piece) -> u64 {
    let blockers = *board.combined();
    let mut union = 0u64;
    for sq in *board.pieces(kind) & *board.color_combined(color) {
        let attacks: BitBoard = match kind {
            chess::Piece::Pawn => chess::get_pawn_attacks(sq, color, !chess::EMPTY),
            chess::Piece::Knight => chess::get_knight_moves(sq),
            chess::Piece::King => chess::get_king_moves(sq),
            chess::Piece::Rook => chess::get_rook_moves(sq, blockers),
            chess::Piece::Bishop => chess::get_bishop_moves(sq, blockers),
            chess::Piece::Queen => {
                chess::get_rook_moves(sq, blockers) | chess::get_bishop_moves(sq, blockers)
            }
        };
        union |= attacks.0;
    }
    union
}

/// Per-channel piece counts read off the occupancy tensor must stay within
/// the starting material plus what promotions have added
fn assert_material_bound(ours: &Board, promoted: &[usize; 2], context: &str) {
    let occupancy = BoardEncoder::new().encode(ours.placement());
    for channel in 0..NUM_CHANNELS {
        let piece = Piece::from_channel(channel).unwrap();
        let count: usize = occupancy
            .index_axis(Axis(0), channel)
            .iter()
            .map(|&v| v as usize)
            .sum();
        assert_eq!(count, ours.placement().count(piece), "{context}: channel {channel}");

        let promotions = promoted[piece.color as usize];
        match piece.kind {
            PieceKind::King => assert_eq!(count, 1, "{context}: kings"),
            PieceKind::Pawn => assert!(
                count + promotions <= PieceKind::Pawn.starting_count(),
                "{context}: {count} pawns after {promotions} promotions"
            ),
            kind => assert!(
                count <= kind.starting_count() + promotions,
                "{context}: {count} of channel {channel} after {promotions} promotions"
            ),
        }
    }
}

#[test]
fn test_random_playouts_match_oracle() {
    let calculator = AttackCalculator::new();
    let mut seed = 0x5eed_u64;

    for game in 0..24 {
        let mut ours = Board::starting_position();
        let mut theirs = chess::Board::default();
        let mut promoted = [0usize; 2];

        for ply in 0..120 {
            let legal: Vec<ChessMove> = MoveGen::new_legal(&theirs).collect();
            if legal.is_empty() {
                break;
            }
            let mv = legal[next_random(&mut seed) % legal.len()];
            let token = long_san(&theirs, mv);
            if mv.get_promotion().is_some() {
                promoted[ours.side_to_move() as usize] += 1;
            }

            ours.apply_san(&token)
                .unwrap_or_else(|err| panic!("game {game} ply {ply} {token}: {err}"));
            theirs = theirs.make_move_new(mv);
            let context = format!("game {game} ply {ply} {token}");
            assert_same_position(&ours, &theirs, &context);
            assert_material_bound(&ours, &promoted, &context);

            let sets = calculator.attack_sets(ours.placement());
            for channel in 0..NUM_CHANNELS {
                let piece = Piece::from_channel(channel).unwrap();
                assert_eq!(
                    sets[channel].bits(),
                    oracle_attack_bits(&theirs, chess_color(piece.color), chess_kind(piece.kind)),
                    "{context}: attacks of channel {channel}"
                );
            }
        }
    }
}

#[test]
fn test_rejected_tokens_are_illegal_for_oracle() {
    let theirs = chess::Board::default();
    let legal: Vec<String> = MoveGen::new_legal(&theirs)
        .map(|mv| long_san(&theirs, mv))
        .collect();
    assert_eq!(legal.len(), 20);

    for token in ["e5", "Ke2", "Bc4", "O-O", "Nd2", "exd3"] {
        assert!(!legal.iter().any(|san| san == token));
        let mut ours = Board::starting_position();
        assert!(ours.apply_san(token).is_err(), "{token} should be rejected");
        assert_eq!(ours, Board::starting_position());
    }
}
