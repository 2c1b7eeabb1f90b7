//! Corpus-level orchestration
//!
//! Each game moves through `Pending → Replayed → Windowed → Encoded →
//! Accumulated`, or stops early in `Failed` (replay rejected a move) or
//! `Excluded` (nothing left after windowing). The driver takes a game as far
//! as `Encoded`; the [`Accumulator`] makes the final step. Games share no
//! state, so the parallel driver simply fills one outcome slot per game and
//! merges them in corpus order before the final stack.

use std::fmt;

use indicatif::ProgressBar;
use log::{debug, info, trace};
use ndarray::{concatenate, s, Array1, Array4, Array5, Axis};
use rayon::prelude::*;

use crate::attacks::AttackCalculator;
use crate::board::NUM_CHANNELS;
use crate::config::PipelineConfig;
use crate::errors::{ExtractionError, Result};
use crate::position_encoder::BoardEncoder;
use crate::replay::MoveReplayEngine;
use crate::window::PlyWindow;

/// Failure messages kept verbatim in the summary
pub const MAX_FAILURE_SAMPLES: usize = 5;

/// One corpus entry: SAN tokens in play order plus an opaque label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub moves: Vec<String>,
    pub label: i64,
}

impl Game {
    pub fn new<I, S>(moves: I, label: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            moves: moves.into_iter().map(Into::into).collect(),
            label,
        }
    }

    /// Split a whitespace-separated move string
    pub fn from_move_text(text: &str, label: i64) -> Self {
        Self::new(text.split_whitespace(), label)
    }

    pub fn plies(&self) -> usize {
        self.moves.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameState {
    Pending,
    Replayed,
    Windowed,
    Encoded,
    Accumulated,
    Failed,
    Excluded,
}

impl GameState {
    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// States reachable in one step
    pub fn successors(self) -> &'static [GameState] {
        match self {
            GameState::Pending => &[GameState::Replayed, GameState::Failed],
            GameState::Replayed => &[GameState::Windowed],
            GameState::Windowed => &[GameState::Encoded, GameState::Excluded],
            GameState::Encoded => &[GameState::Accumulated],
            GameState::Accumulated | GameState::Failed | GameState::Excluded => &[],
        }
    }

    pub fn can_advance_to(self, next: GameState) -> bool {
        self.successors().contains(&next)
    }
}

/// Per-game `(time, 12, 8, 8)` tensors for the windowed plies
#[derive(Debug, Clone, PartialEq)]
pub struct GameTensors {
    pub occupancy: Array4<u8>,
    pub attacks: Array4<u8>,
    pub label: i64,
}

impl GameTensors {
    pub fn frames(&self) -> usize {
        self.occupancy.len_of(Axis(0))
    }
}

#[derive(Debug)]
pub enum GameOutcome {
    Encoded(GameTensors),
    Failed(ExtractionError),
    Excluded(ExtractionError),
}

impl GameOutcome {
    pub fn state(&self) -> GameState {
        match self {
            GameOutcome::Encoded(_) => GameState::Encoded,
            GameOutcome::Failed(_) => GameState::Failed,
            GameOutcome::Excluded(_) => GameState::Excluded,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub total: usize,
    pub accumulated: usize,
    pub failed: usize,
    pub excluded: usize,
    pub failure_samples: Vec<String>,
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} games: {} accumulated, {} failed, {} excluded",
            self.total, self.accumulated, self.failed, self.excluded
        )?;
        for sample in &self.failure_samples {
            write!(f, "\n  {sample}")?;
        }
        Ok(())
    }
}

/// Stacked corpus output
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTensors {
    /// `(games, time, 12, 8, 8)`
    pub occupancy: Array5<u8>,
    /// `(games, time, 12, 8, 8)`
    pub attacks: Array5<u8>,
    pub labels: Array1<i64>,
}

impl BatchTensors {
    pub fn games(&self) -> usize {
        self.labels.len()
    }

    pub fn time_steps(&self) -> usize {
        self.occupancy.len_of(Axis(1))
    }

    /// Occupancy and attacks side by side: `(games, time, 24, 8, 8)`
    pub fn combined(&self) -> Result<Array5<u8>> {
        Ok(concatenate(
            Axis(2),
            &[self.occupancy.view(), self.attacks.view()],
        )?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub batch: BatchTensors,
    pub summary: PipelineSummary,
}

/// Collects per-game outcomes in corpus order and stacks them at the end
#[derive(Debug)]
pub struct Accumulator {
    time_steps: usize,
    games: Vec<GameTensors>,
    summary: PipelineSummary,
}

impl Accumulator {
    pub fn new(time_steps: usize) -> Self {
        Self {
            time_steps,
            games: Vec::new(),
            summary: PipelineSummary::default(),
        }
    }

    pub fn summary(&self) -> &PipelineSummary {
        &self.summary
    }

    /// Record the next game's outcome and return its terminal state
    pub fn push(&mut self, outcome: GameOutcome) -> GameState {
        let index = self.summary.total;
        self.summary.total += 1;
        match outcome {
            GameOutcome::Encoded(tensors) => {
                trace!("game {index}: accumulated {} frames", tensors.frames());
                self.games.push(tensors);
                self.summary.accumulated += 1;
                GameState::Accumulated
            }
            GameOutcome::Failed(err) => {
                debug!("game {index} failed: {err}");
                self.summary.failed += 1;
                if self.summary.failure_samples.len() < MAX_FAILURE_SAMPLES {
                    self.summary
                        .failure_samples
                        .push(format!("game {index}: {err}"));
                }
                GameState::Failed
            }
            GameOutcome::Excluded(err) => {
                debug!("game {index} excluded: {err}");
                self.summary.excluded += 1;
                GameState::Excluded
            }
        }
    }

    /// Stack every accumulated game into zero-padded batch arrays
    pub fn finish(self) -> Result<PipelineReport> {
        let Accumulator {
            time_steps,
            games,
            summary,
        } = self;

        info!("{summary}");
        if games.is_empty() {
            return Err(ExtractionError::BatchEmpty {
                failed: summary.failed,
                excluded: summary.excluded,
            });
        }

        let count = games.len();
        batch_elements(count, time_steps)?;
        let shape = (count, time_steps, NUM_CHANNELS, 8, 8);
        let mut occupancy = Array5::<u8>::zeros(shape);
        let mut attacks = Array5::<u8>::zeros(shape);
        let mut labels = Array1::<i64>::zeros(count);

        for (i, game) in games.into_iter().enumerate() {
            let frames = game.frames().min(time_steps);
            occupancy
                .slice_mut(s![i, ..frames, .., .., ..])
                .assign(&game.occupancy.slice(s![..frames, .., .., ..]));
            attacks
                .slice_mut(s![i, ..frames, .., .., ..])
                .assign(&game.attacks.slice(s![..frames, .., .., ..]));
            labels[i] = game.label;
        }

        Ok(PipelineReport {
            batch: BatchTensors {
                occupancy,
                attacks,
                labels,
            },
            summary,
        })
    }
}

/// Element count of one `(games, time, 12, 8, 8)` array, if ndarray can hold it
fn batch_elements(games: usize, time_steps: usize) -> Result<usize> {
    games
        .checked_mul(time_steps)
        .and_then(|n| n.checked_mul(NUM_CHANNELS * 64))
        .filter(|&n| n <= isize::MAX as usize)
        .ok_or_else(|| {
            ExtractionError::Configuration(format!(
                "a batch of {games} games x {time_steps} plies does not fit in memory"
            ))
        })
}

/// Runs replay, windowing and both encoders over a corpus
#[derive(Debug, Clone)]
pub struct PipelineDriver {
    config: PipelineConfig,
    window: PlyWindow,
    replay: MoveReplayEngine,
    encoder: BoardEncoder,
    attacks: AttackCalculator,
}

impl PipelineDriver {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let window = config.window()?;
        Ok(Self {
            config,
            window,
            replay: MoveReplayEngine::new(),
            encoder: BoardEncoder::new(),
            attacks: AttackCalculator::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn window(&self) -> PlyWindow {
        self.window
    }

    /// Take one game from `Pending` to `Encoded`, `Failed` or `Excluded`
    pub fn process_game(&self, game: &Game) -> GameOutcome {
        self.process_game_traced(game, |_| {})
    }

    /// Like [`process_game`](Self::process_game), calling `enter` with every
    /// state the game passes through
    pub fn process_game_traced<F>(&self, game: &Game, mut enter: F) -> GameOutcome
    where
        F: FnMut(GameState),
    {
        enter(GameState::Pending);
        let snapshots = match self.replay.replay(&game.moves) {
            Ok(snapshots) => snapshots,
            Err(err) => {
                enter(GameState::Failed);
                return GameOutcome::Failed(err);
            }
        };
        enter(GameState::Replayed);

        let windowed = self.window.select_nonempty(&snapshots);
        enter(GameState::Windowed);
        let windowed = match windowed {
            Ok(windowed) => windowed,
            Err(err) => {
                enter(GameState::Excluded);
                return GameOutcome::Excluded(err);
            }
        };

        let tensors = GameTensors {
            occupancy: self.encoder.encode_sequence(windowed),
            attacks: self.attacks.compute_sequence(windowed),
            label: game.label,
        };
        enter(GameState::Encoded);
        GameOutcome::Encoded(tensors)
    }

    /// Run the corpus using the configured execution mode
    pub fn run(&self, games: &[Game]) -> Result<PipelineReport> {
        self.run_with_progress(games, None)
    }

    pub fn run_with_progress(
        &self,
        games: &[Game],
        progress: Option<&ProgressBar>,
    ) -> Result<PipelineReport> {
        if self.config.parallel {
            self.run_parallel(games, progress)
        } else {
            self.run_sequential(games, progress)
        }
    }

    pub fn run_sequential(
        &self,
        games: &[Game],
        progress: Option<&ProgressBar>,
    ) -> Result<PipelineReport> {
        let mut accumulator = Accumulator::new(self.window.len());
        for game in games {
            accumulator.push(self.process_game(game));
            if let Some(pb) = progress {
                pb.inc(1);
            }
        }
        accumulator.finish()
    }

    pub fn run_parallel(
        &self,
        games: &[Game],
        progress: Option<&ProgressBar>,
    ) -> Result<PipelineReport> {
        let threads = self.config.worker_threads();
        debug!("processing {} games on {threads} threads", games.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?;
        let outcomes: Vec<GameOutcome> = pool.install(|| {
            games
                .par_iter()
                .map(|game| {
                    let outcome = self.process_game(game);
                    if let Some(pb) = progress {
                        pb.inc(1);
                    }
                    outcome
                })
                .collect()
        });

        let mut accumulator = Accumulator::new(self.window.len());
        for outcome in outcomes {
            accumulator.push(outcome);
        }
        accumulator.finish()
    }
}
