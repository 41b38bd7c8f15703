//! Turn optimizer: which sets to lay out and which rack tiles to move.

use crate::catalog::{CandidateSet, SetCatalog};
use crate::engine::{Engine, EngineStatus, StagedSearch};
use crate::error::{Result, SolveError};
use crate::model::{Assignment, Column, Model, Objective, Row};
use crate::state::{BoardState, MAX_COPIES, RackState, TileCounts};
use crate::{ALPHABET_SIZE, Meld, Tile, color};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Weight of the tie-break term when the objective is written as one scalar.
/// A layout holds at most 106 tiles, so at most 35 sets, and the tie-break
/// sum stays below 40: it can never outweigh one tile moved from the rack.
pub const TIE_BREAK_WEIGHT: f64 = 1.0 / 40.0;

/// Tunables for a solve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Wall-clock budget for one engine call.
    pub time_limit_ms: u64,
    /// Budget for the single retry after a timeout; `None` disables the retry.
    pub retry_time_limit_ms: Option<u64>,
    /// Minimum point value of a player's first meld.
    pub initial_meld_points: u32,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            time_limit_ms: 5_000,
            retry_time_limit_ms: Some(20_000),
            initial_meld_points: 30,
        }
    }
}

impl SolveOptions {
    /// Parse options from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_millis(self.time_limit_ms)
    }
}

/// A candidate set used in the new layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChosenSet {
    /// Catalog index.
    pub index: usize,
    pub set: CandidateSet,
    /// 1 or 2.
    pub copies: u8,
    /// The tile each wild in the set stands for.
    pub wildcards: Vec<Tile>,
}

impl ChosenSet {
    fn new(index: usize, set: &CandidateSet, copies: u8) -> Self {
        ChosenSet {
            index,
            set: set.clone(),
            copies,
            wildcards: set.wildcard_roles(),
        }
    }

    /// The set in display order, wilds at the slots they fill.
    pub fn to_meld(&self) -> Meld {
        self.set.to_meld()
    }
}

/// The new board layout and the rack tiles it consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Solution {
    pub sets: Vec<ChosenSet>,
    pub moved: TileCounts,
    pub objective: Objective,
}

impl Solution {
    pub fn tiles_played(&self) -> u32 {
        self.moved.total()
    }

    /// The objective as one number, `primary + TIE_BREAK_WEIGHT * secondary`.
    pub fn score(&self) -> f64 {
        self.objective.scalar(TIE_BREAK_WEIGHT)
    }

    /// Nothing moves from the rack; the driver should draw instead.
    pub fn is_pass(&self) -> bool {
        self.moved.is_empty()
    }

    /// Every set in the layout, one meld per copy.
    pub fn melds(&self) -> Vec<Meld> {
        self.sets
            .iter()
            .flat_map(|chosen| std::iter::repeat_n(chosen.to_meld(), chosen.copies as usize))
            .collect()
    }

    /// Tile counts of the whole new layout.
    pub fn layout(&self) -> Result<TileCounts> {
        let mut counts = [0u8; ALPHABET_SIZE];
        for chosen in &self.sets {
            for &(index, count) in chosen.set.composition() {
                counts[index] += count * chosen.copies;
            }
        }
        TileCounts::from_vector(&counts)
    }
}

/// A first meld laid entirely from the rack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitialMeld {
    pub sets: Vec<ChosenSet>,
    pub moved: TileCounts,
    pub points: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Goal {
    /// Most rack tiles moved; tie-break on sets the board already holds.
    MostTiles,
    /// Most meld points; tie-break on tiles.
    MostPoints,
}

/// Solves turns against a shared, read-only catalog. Holds no per-solve
/// state, so one optimizer may serve any number of threads.
pub struct PlayOptimizer<'c, E = StagedSearch> {
    catalog: &'c SetCatalog,
    engine: E,
    options: SolveOptions,
}

impl PlayOptimizer<'static, StagedSearch> {
    /// Optimizer over the process-wide catalog with default options.
    pub fn new() -> Result<Self> {
        Ok(Self::with_engine(
            SetCatalog::global()?,
            StagedSearch::default(),
            SolveOptions::default(),
        ))
    }
}

impl<'c, E: Engine> PlayOptimizer<'c, E> {
    pub fn with_engine(catalog: &'c SetCatalog, engine: E, options: SolveOptions) -> Self {
        PlayOptimizer {
            catalog,
            engine,
            options,
        }
    }

    pub fn with_options(mut self, options: SolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    pub fn catalog(&self) -> &'c SetCatalog {
        self.catalog
    }

    /// Find the layout that moves the most rack tiles while every board tile
    /// stays on the board.
    pub fn solve(&self, board: &BoardState, rack: &RackState) -> Result<Solution> {
        self.solve_within(board, rack, self.options.time_limit())
    }

    /// Like [`PlayOptimizer::solve`], but a timeout is retried once with the
    /// retry budget and then treated as no play. Returns `None` whenever the
    /// turn moves no tiles.
    pub fn solve_or_pass(
        &self,
        board: &BoardState,
        rack: &RackState,
    ) -> Result<Option<Solution>> {
        let first = self.solve(board, rack);
        let outcome = match (first, self.options.retry_time_limit_ms) {
            (Err(err), Some(retry_ms)) if err.is_retryable() => {
                log::warn!("{}; retrying with {} ms", err, retry_ms);
                self.solve_within(board, rack, Duration::from_millis(retry_ms))
            }
            (other, _) => other,
        };
        match outcome {
            Ok(solution) if solution.is_pass() => Ok(None),
            Ok(solution) => Ok(Some(solution)),
            Err(err) if err.is_retryable() => {
                log::warn!("{}; passing this turn", err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Solve independent (board, rack) pairs in parallel.
    pub fn solve_batch(&self, turns: &[(BoardState, RackState)]) -> Vec<Result<Solution>> {
        turns.par_iter().map(|(board, rack)| self.solve(board, rack)).collect()
    }

    /// Best first meld from the rack alone, by points. `None` when no meld
    /// reaches `SolveOptions::initial_meld_points`.
    pub fn solve_initial_meld(&self, rack: &RackState) -> Result<Option<InitialMeld>> {
        let board = BoardState::new();
        let model = self.model_for(&board, rack, Goal::MostPoints);
        let assignment = self.run(&model, self.options.time_limit())?;
        let solution = self.decode(&model, &board, rack, &assignment)?;

        let points = assignment.objective.primary.max(0) as u32;
        log::debug!(
            "initial meld: best {} points with {} tiles (threshold {})",
            points,
            solution.tiles_played(),
            self.options.initial_meld_points
        );
        if solution.is_pass() || points < self.options.initial_meld_points {
            return Ok(None);
        }
        Ok(Some(InitialMeld {
            sets: solution.sets,
            moved: solution.moved,
            points,
        }))
    }

    /// The integer model for one turn. Tile rows are bounded
    /// `board[t] <= activity <= board[t] + min(rack[t], 2)`, which is the
    /// conservation constraint with the moved count folded in.
    pub fn model(&self, board: &BoardState, rack: &RackState) -> Model {
        self.model_for(board, rack, Goal::MostTiles)
    }

    fn solve_within(
        &self,
        board: &BoardState,
        rack: &RackState,
        limit: Duration,
    ) -> Result<Solution> {
        TileCounts::check_disjoint_supply(board, rack)?;
        let model = self.model_for(board, rack, Goal::MostTiles);
        let assignment = self.run(&model, limit)?;
        let solution = self.decode(&model, board, rack, &assignment)?;
        log::debug!(
            "solved turn: board {} tiles, rack {} tiles -> moved {} into {} sets (score {:.3})",
            board.total(),
            rack.total(),
            solution.tiles_played(),
            solution.sets.len(),
            solution.score()
        );
        Ok(solution)
    }

    pub(crate) fn model_for(&self, board: &BoardState, rack: &RackState, goal: Goal) -> Model {
        let rows = board
            .as_slice()
            .iter()
            .zip(rack.as_slice())
            .map(|(&on_board, &in_rack)| Row {
                lower: on_board,
                upper: on_board + in_rack.min(MAX_COPIES),
            })
            .collect();

        let columns = self
            .catalog
            .iter()
            .map(|set| {
                let (weight, bonus, bonus_cap) = match goal {
                    Goal::MostTiles => (set.len() as i32, 1, set.existing_copies(board)),
                    Goal::MostPoints => (set.points() as i32, set.len() as i32, MAX_COPIES),
                };
                Column {
                    entries: set.composition().to_vec(),
                    upper: MAX_COPIES,
                    weight,
                    bonus,
                    bonus_cap,
                }
            })
            .collect();

        // Number-major sweep keeps every set within 16 rows of its first tile.
        let order = (1..=13u8)
            .flat_map(|n| color::ALL.iter().map(move |&c| Tile::new(c, n).index()))
            .collect();

        let offset = match goal {
            Goal::MostTiles => -(board.total() as i32),
            Goal::MostPoints => 0,
        };

        Model {
            rows,
            columns,
            order,
            offset,
            // moved tiles are counted tile by tile; points depend on wild roles
            tile_rows: goal == Goal::MostTiles,
        }
    }

    fn run(&self, model: &Model, limit: Duration) -> Result<Assignment> {
        self.engine.optimize(model, limit).map_err(|status| match status {
            EngineStatus::Timeout { limit_ms } => SolveError::SolverTimeout { limit_ms },
            EngineStatus::Infeasible => SolveError::SolverInfeasible(
                "no layout keeps every board tile in a legal set".to_string(),
            ),
            EngineStatus::StateLimit { .. } | EngineStatus::Unsupported(_) => {
                SolveError::SolverInfeasible(status.to_string())
            }
        })
    }

    /// Turn an engine assignment into a [`Solution`], re-checking every bound.
    fn decode(
        &self,
        model: &Model,
        board: &BoardState,
        rack: &RackState,
        assignment: &Assignment,
    ) -> Result<Solution> {
        model
            .check(&assignment.copies)
            .map_err(SolveError::SolverInfeasible)?;

        let activity = model.activity(&assignment.copies);
        let mut moved = [0u8; ALPHABET_SIZE];
        for (i, &used) in activity.iter().enumerate() {
            let on_board = board.as_slice()[i] as u32;
            let extra = used.checked_sub(on_board).ok_or_else(|| {
                SolveError::SolverInfeasible(format!("layout drops a board copy of row {}", i))
            })?;
            if extra > rack.as_slice()[i] as u32 {
                return Err(SolveError::SolverInfeasible(format!(
                    "layout takes {} copies of row {} from a rack holding {}",
                    extra,
                    i,
                    rack.as_slice()[i]
                )));
            }
            moved[i] = extra as u8;
        }

        let sets = assignment
            .copies
            .iter()
            .enumerate()
            .filter(|(_, copies)| **copies > 0)
            .filter_map(|(j, &copies)| {
                self.catalog.get(j).map(|set| ChosenSet::new(j, set, copies))
            })
            .collect();
        let moved = TileCounts::from_vector(&moved)
            .map_err(|e| SolveError::SolverInfeasible(e.to_string()))?;

        Ok(Solution {
            sets,
            moved,
            objective: assignment.objective,
        })
    }
}
