//! Standard algebraic notation (SAN) tokens as they appear in recorded games.
//!
//! The grammar itself is shakmaty's SAN parser. This module only normalises
//! the spellings found in older exports (digit-zero castling, a bare
//! promotion letter, `e.p.` and quality glyphs) and maps the result onto the
//! crate's own board types. Whether a parsed move can be played is decided
//! against a concrete [`Board`](crate::board::Board) by the replay engine.

use std::borrow::Cow;
use std::str::FromStr;

use shakmaty::san::San;
use shakmaty::{CastlingSide, Role};

use crate::board::{CastleSide, PieceKind, Square};
use crate::errors::MoveRejection;

/// A move request decoded from one algebraic token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanMove {
    Castle(CastleSide),
    Normal {
        kind: PieceKind,
        from_file: Option<u8>,
        from_rank: Option<u8>,
        capture: bool,
        to: Square,
        /// Explicit promotion piece; pawns reaching the last rank without one become queens
        promotion: Option<PieceKind>,
    },
}

impl SanMove {
    pub fn parse(token: &str) -> Result<SanMove, MoveRejection> {
        let text = normalize(token);
        if text.is_empty() {
            return Err(unparseable("empty token"));
        }
        let san = San::from_ascii(text.as_bytes())
            .map_err(|err| unparseable(&format!("{err} {token:?}")))?;
        SanMove::try_from(san)
    }
}

impl TryFrom<San> for SanMove {
    type Error = MoveRejection;

    fn try_from(san: San) -> Result<Self, Self::Error> {
        match san {
            San::Castle(CastlingSide::KingSide) => Ok(SanMove::Castle(CastleSide::KingSide)),
            San::Castle(CastlingSide::QueenSide) => Ok(SanMove::Castle(CastleSide::QueenSide)),
            San::Normal {
                role,
                file,
                rank,
                capture,
                to,
                promotion,
            } => {
                let kind = piece_kind(role);
                if promotion.is_some() && kind != PieceKind::Pawn {
                    return Err(unparseable("only pawns promote"));
                }
                if kind == PieceKind::Pawn && (rank.is_some() || (capture && file.is_none())) {
                    return Err(unparseable("pawn moves are disambiguated by file only"));
                }
                Ok(SanMove::Normal {
                    kind,
                    from_file: file.map(|f| f as u8),
                    from_rank: rank.map(|r| r as u8),
                    capture,
                    to: Square::new(to.file() as u8, to.rank() as u8),
                    promotion: promotion.map(piece_kind),
                })
            }
            San::Put { .. } => Err(unparseable("piece drops are not standard chess")),
            San::Null => Err(unparseable("null move")),
        }
    }
}

impl FromStr for SanMove {
    type Err = MoveRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SanMove::parse(s)
    }
}

fn unparseable(msg: &str) -> MoveRejection {
    MoveRejection::Unparseable(msg.to_string())
}

fn piece_kind(role: Role) -> PieceKind {
    match role {
        Role::Pawn => PieceKind::Pawn,
        Role::Knight => PieceKind::Knight,
        Role::Bishop => PieceKind::Bishop,
        Role::Rook => PieceKind::Rook,
        Role::Queen => PieceKind::Queen,
        Role::King => PieceKind::King,
    }
}

/// Rewrite export spellings into the form the SAN parser accepts
fn normalize(token: &str) -> Cow<'_, str> {
    let text = strip_annotations(token);
    match text {
        "0-0" => return Cow::Borrowed("O-O"),
        "0-0-0" => return Cow::Borrowed("O-O-O"),
        _ => {}
    }
    // `e8Q` is written `e8=Q` in SAN
    if let [.., b'1'..=b'8', b'Q' | b'R' | b'B' | b'N' | b'K' | b'P'] = text.as_bytes() {
        let (square, piece) = text.split_at(text.len() - 1);
        return Cow::Owned(format!("{square}={piece}"));
    }
    Cow::Borrowed(text)
}

/// Drop check/mate markers, move-quality glyphs and an `e.p.` suffix
fn strip_annotations(token: &str) -> &str {
    let mut text = token.trim();
    text = text.trim_end_matches(['+', '#', '!', '?']);
    if let Some(stripped) = text.strip_suffix("e.p.") {
        text = stripped.trim_end();
    }
    text.trim_end_matches(['+', '#'])
}
