use std::fmt;

use thiserror::Error;

use crate::board::CastleSide;

/// Why a single move token could not be applied to the current board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveRejection {
    /// The token does not follow algebraic notation
    Unparseable(String),
    /// No piece of the side to move can reach the destination
    NoMatchingPiece,
    /// More than one piece matches and the token does not disambiguate
    Ambiguous { candidates: usize },
    /// A capture was written but the destination holds nothing to take
    NothingToCapture,
    /// The destination is occupied by a piece of the side to move
    OwnPieceOnTarget,
    /// Promotion suffix on a move that does not promote, or to an invalid piece
    InvalidPromotion,
    /// Castling right lost, path blocked, or king passing through an attack
    CastlingUnavailable(CastleSide),
    /// Every geometric candidate would leave the mover's king attacked
    LeavesKingInCheck,
}

impl fmt::Display for MoveRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveRejection::Unparseable(msg) => write!(f, "unparseable token: {msg}"),
            MoveRejection::NoMatchingPiece => write!(f, "no piece can make this move"),
            MoveRejection::Ambiguous { candidates } => {
                write!(f, "ambiguous move, {candidates} pieces match")
            }
            MoveRejection::NothingToCapture => write!(f, "capture onto an empty square"),
            MoveRejection::OwnPieceOnTarget => write!(f, "destination holds an own piece"),
            MoveRejection::InvalidPromotion => write!(f, "invalid promotion"),
            MoveRejection::CastlingUnavailable(side) => write!(f, "cannot castle {side}"),
            MoveRejection::LeavesKingInCheck => write!(f, "move leaves the king in check"),
        }
    }
}

/// Errors produced while replaying games and assembling tensors
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// A move token was unparseable or illegal; the whole game is abandoned
    #[error("move {ply} ({token:?}) could not be applied: {reason}")]
    MoveApplication {
        ply: usize,
        token: String,
        reason: MoveRejection,
    },

    /// No snapshot of the game falls inside the configured ply window
    #[error("game of {snapshots} plies has no snapshot in window [{min_ply}, {max_ply})")]
    EmptyWindow {
        snapshots: usize,
        min_ply: usize,
        max_ply: usize,
    },

    /// The whole corpus pass produced nothing to stack
    #[error("no games survived extraction ({failed} failed, {excluded} excluded)")]
    BatchEmpty { failed: usize, excluded: usize },

    #[error("invalid FEN {fen:?}: {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    /// A corpus record could not be turned into a game
    #[error("corpus record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("array {name:?} not found in {path}")]
    MissingArray { name: String, path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl ExtractionError {
    pub(crate) fn invalid_fen(fen: &str, reason: impl Into<String>) -> Self {
        ExtractionError::InvalidFen {
            fen: fen.to_string(),
            reason: reason.into(),
        }
    }

    /// Per-game errors are absorbed by the pipeline; everything else aborts a run
    pub fn is_per_game(&self) -> bool {
        matches!(
            self,
            ExtractionError::MoveApplication { .. } | ExtractionError::EmptyWindow { .. }
        )
    }
}

// Convenience type alias
pub type Result<T> = std::result::Result<T, ExtractionError>;
