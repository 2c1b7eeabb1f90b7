//! # Chess Tensor Extractor
//!
//! Replays games written in Standard Algebraic Notation and turns every
//! position inside a configurable ply window into two fixed-shape tensors:
//! piece **occupancy** and **attacked squares**, each `(12, 8, 8)` with
//! channels ordered white P,R,N,B,Q,K then black p,r,n,b,q,k.
//!
//! ## Features
//!
//! - **Legal SAN replay**: castling, en passant, promotions (queen by default),
//!   disambiguation and king-safety checks, with whole-game atomic failure
//! - **Occupancy encoding**: one-hot piece planes, row 0 = rank 8
//! - **Attack maps**: per-channel union of attacked squares, sliders include
//!   their first blocker
//! - **Corpus loading**: JSON arrays, JSON lines and PGN files
//! - **Corpus pipeline**: windowing, failure/exclusion accounting, batch
//!   stacking to `(games, time, 12, 8, 8)`, sequential or rayon-parallel
//! - **`.npz` output**: `arr_0`-keyed archives readable by `numpy.load`
//!
//! ## Quick Start
//!
//! ```rust
//! use chess_tensor_extractor::{Game, PipelineConfig, PipelineDriver};
//!
//! let games = vec![
//!     Game::from_move_text("e4 e5 Nf3 Nc6 Bb5 a6", 1),
//!     Game::from_move_text("e4 e5 Ke3", 0), // illegal king move
//! ];
//!
//! let driver = PipelineDriver::new(PipelineConfig::new(2, 6)).unwrap();
//! let report = driver.run(&games).unwrap();
//!
//! assert_eq!(report.summary.failed, 1);
//! assert_eq!(report.batch.occupancy.shape(), &[1, 4, 12, 8, 8]);
//! ```

// Core modules
pub mod board;
pub mod errors;
pub mod san;

pub mod attacks;
pub mod config;
pub mod persistence;
pub mod pipeline;
pub mod position_encoder;
pub mod replay;
pub mod streaming_loader;
pub mod window;

// Re-export commonly used types
pub use attacks::AttackCalculator;
pub use board::{Board, CastleSide, Color, Piece, PieceKind, Snapshot, Square, SquareSet};
pub use config::PipelineConfig;
pub use errors::{ExtractionError, MoveRejection, Result};
pub use persistence::{read_npz, write_batch, write_npz, NpzArray, OutputPaths, ARRAY_KEY};
pub use pipeline::{
    BatchTensors, Game, GameOutcome, GameState, PipelineDriver, PipelineReport, PipelineSummary,
};
pub use position_encoder::BoardEncoder;
pub use replay::{Move, MoveKind, MoveReplayEngine};
pub use san::SanMove;
pub use streaming_loader::{CorpusFormat, CorpusLoader};
pub use window::PlyWindow;
