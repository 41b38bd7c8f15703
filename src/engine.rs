//! Integer-optimization engines for [`Model`].

use crate::model::{Assignment, Model, Objective};
use crate::sweep::RunSweep;
use std::collections::HashMap;
use std::time::Duration;

/// How often (in units of search work) the clock is consulted.
const CLOCK_CHECK_INTERVAL: u64 = 256;

/// Memo entries the column search may fill before [`StagedSearch`] hands the
/// model to the number sweep.
pub const DEFAULT_STATE_LIMIT: usize = 50_000;

/// Units of search work allowed per memo state under a state limit. A single
/// step can enumerate many column combinations before it adds one entry.
const TICKS_PER_STATE: u64 = 64;

/// Cross-platform time tracker for timeout handling
#[derive(Clone, Copy)]
pub struct TimeTracker {
    #[cfg(not(target_arch = "wasm32"))]
    start: std::time::Instant,
    #[cfg(target_arch = "wasm32")]
    start_ms: f64,
    limit_ms: u64,
}

impl TimeTracker {
    pub fn new(limit: Duration) -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            start: std::time::Instant::now(),
            #[cfg(target_arch = "wasm32")]
            start_ms: js_sys::Date::now(),
            limit_ms: limit.as_millis().min(u64::MAX as u128) as u64,
        }
    }

    pub fn limit_ms(&self) -> u64 {
        self.limit_ms
    }

    pub fn elapsed(&self) -> Duration {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.start.elapsed()
        }
        #[cfg(target_arch = "wasm32")]
        {
            let now = js_sys::Date::now();
            Duration::from_millis((now - self.start_ms).max(0.0) as u64)
        }
    }

    pub fn remaining(&self) -> Duration {
        Duration::from_millis(self.limit_ms).saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= Duration::from_millis(self.limit_ms)
    }
}

/// Counts units of search work and looks at the clock on the first unit and
/// every `CLOCK_CHECK_INTERVAL` units after it.
pub(crate) struct Ticker {
    timer: TimeTracker,
    ticks: u64,
}

impl Ticker {
    pub(crate) fn new(timer: TimeTracker) -> Self {
        Ticker { timer, ticks: 0 }
    }

    pub(crate) fn tick(&mut self) -> Result<(), EngineStatus> {
        let due = self.ticks % CLOCK_CHECK_INTERVAL == 0;
        self.ticks += 1;
        if due && self.timer.is_expired() {
            return Err(EngineStatus::Timeout {
                limit_ms: self.timer.limit_ms(),
            });
        }
        Ok(())
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks
    }
}

/// Why an engine returned no optimal assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EngineStatus {
    #[error("model is infeasible")]
    Infeasible,
    #[error("time limit of {limit_ms} ms reached")]
    Timeout { limit_ms: u64 },
    #[error("search stopped after {states} memo states")]
    StateLimit { states: usize },
    #[error("engine cannot handle this model: {0}")]
    Unsupported(&'static str),
}

/// Something that can solve a [`Model`] to optimality within a time limit.
pub trait Engine: Send + Sync {
    fn optimize(&self, model: &Model, limit: Duration) -> Result<Assignment, EngineStatus>;
}

/// Exact memoized search.
///
/// Rows in `Model::order` are swept one at a time. Each column is anchored at
/// the first swept row it touches and decided when the sweep reaches that
/// row, so once the sweep moves past a row nothing can change it again and its
/// lower bound is checked right there. The memo key is the step plus the
/// activity of the rows still reachable from it (a window as wide as the
/// widest column) and of the global rows.
///
/// The memo grows quickly with the number of rows that have slack, so a
/// state limit can be set to give up early with [`EngineStatus::StateLimit`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorSearch {
    state_limit: Option<usize>,
}

impl AnchorSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state_limit(states: usize) -> Self {
        AnchorSearch {
            state_limit: Some(states),
        }
    }
}

impl Engine for AnchorSearch {
    fn optimize(&self, model: &Model, limit: Duration) -> Result<Assignment, EngineStatus> {
        let ticker = Ticker::new(TimeTracker::new(limit));
        let mut search = Search::new(model, ticker, self.state_limit);
        let best = search.step(0)?.ok_or(EngineStatus::Infeasible)?;
        let copies = search.replay()?;
        log::trace!(
            "anchor search: {} ticks, {} memo entries, best gain {:?}",
            search.ticker.ticks(),
            search.memo.len(),
            best
        );
        Ok(Assignment {
            objective: model.evaluate(&copies),
            copies,
        })
    }
}

/// The default engine: [`AnchorSearch`] settles small and mid-sized models
/// exactly, tie-break included. When its memo passes the state limit,
/// [`RunSweep`] finishes the job with the time that is left.
#[derive(Debug, Clone, Copy)]
pub struct StagedSearch {
    state_limit: usize,
}

impl Default for StagedSearch {
    fn default() -> Self {
        StagedSearch {
            state_limit: DEFAULT_STATE_LIMIT,
        }
    }
}

impl StagedSearch {
    pub fn with_state_limit(states: usize) -> Self {
        StagedSearch { state_limit: states }
    }
}

impl Engine for StagedSearch {
    fn optimize(&self, model: &Model, limit: Duration) -> Result<Assignment, EngineStatus> {
        let timer = TimeTracker::new(limit);
        let first = AnchorSearch::with_state_limit(self.state_limit);
        let outcome = match first.optimize(model, limit) {
            Err(EngineStatus::StateLimit { states }) => {
                log::debug!("column search passed {} states; sweeping by number instead", states);
                match RunSweep.optimize(model, timer.remaining()) {
                    Err(EngineStatus::Unsupported(reason)) => {
                        log::debug!(
                            "number sweep declined the model ({}); searching without a limit",
                            reason
                        );
                        AnchorSearch::new().optimize(model, timer.remaining())
                    }
                    other => other,
                }
            }
            other => other,
        };
        // later stages run on what is left; report the caller's budget
        outcome.map_err(|status| match status {
            EngineStatus::Timeout { .. } => EngineStatus::Timeout {
                limit_ms: timer.limit_ms(),
            },
            other => other,
        })
    }
}

#[derive(Debug, Clone)]
struct Entry {
    gain: Objective,
    choice: Vec<(usize, u8)>,
}

struct Search<'m> {
    model: &'m Model,
    ticker: Ticker,
    state_limit: Option<usize>,
    /// Columns decided at each step; the last step holds columns that touch
    /// only global rows.
    anchored: Vec<Vec<usize>>,
    global: Vec<usize>,
    window: usize,
    activity: Vec<u8>,
    memo: HashMap<Vec<u8>, Option<Entry>>,
}

impl<'m> Search<'m> {
    fn new(model: &'m Model, ticker: Ticker, state_limit: Option<usize>) -> Self {
        let n = model.order.len();
        let mut position = vec![None; model.rows.len()];
        for (pos, &row) in model.order.iter().enumerate() {
            position[row] = Some(pos);
        }

        let mut anchored = vec![Vec::new(); n + 1];
        let mut window = 0;
        for (j, column) in model.columns.iter().enumerate() {
            let usable = column.upper > 0
                && column
                    .entries
                    .iter()
                    .all(|&(row, coeff)| coeff <= model.rows[row].upper);
            if !usable {
                continue;
            }
            let swept: Vec<usize> = column
                .entries
                .iter()
                .filter_map(|&(row, _)| position[row])
                .collect();
            match (swept.iter().min(), swept.iter().max()) {
                (Some(&first), Some(&last)) => {
                    anchored[first].push(j);
                    window = window.max(last - first);
                }
                _ => anchored[n].push(j),
            }
        }

        Search {
            model,
            ticker,
            state_limit,
            anchored,
            global: model.global_rows(),
            window,
            activity: vec![0; model.rows.len()],
            memo: HashMap::new(),
        }
    }

    fn key(&self, step: usize) -> Vec<u8> {
        let order = &self.model.order;
        let end = (step + self.window + 1).min(order.len());
        let mut key = Vec::with_capacity(1 + end.saturating_sub(step) + self.global.len());
        key.push(step as u8);
        key.extend(order[step.min(end)..end].iter().map(|&row| self.activity[row]));
        key.extend(self.global.iter().map(|&row| self.activity[row]));
        key
    }

    /// Best gain from `step` onward given the current activities, or None when
    /// no completion satisfies the remaining bounds.
    fn step(&mut self, step: usize) -> Result<Option<Objective>, EngineStatus> {
        self.ticker.tick()?;

        let key = self.key(step);
        if let Some(entry) = self.memo.get(&key) {
            return Ok(entry.as_ref().map(|e| e.gain));
        }
        self.check_state_limit(self.memo.len())?;

        let mut best = None;
        self.choose(step, 0, &mut Vec::new(), Objective::default(), &mut best)?;
        let gain = best.as_ref().map(|e: &Entry| e.gain);
        self.memo.insert(key, best);
        Ok(gain)
    }

    /// Try every copy count for the `i`-th column anchored at `step`, then
    /// close the step.
    fn choose(
        &mut self,
        step: usize,
        i: usize,
        choice: &mut Vec<(usize, u8)>,
        gain: Objective,
        best: &mut Option<Entry>,
    ) -> Result<(), EngineStatus> {
        self.ticker.tick()?;
        self.check_state_limit(0)?;
        if i == self.anchored[step].len() {
            return self.close(step, choice, gain, best);
        }

        self.choose(step, i + 1, choice, gain, best)?;

        let j = self.anchored[step][i];
        let model = self.model;
        let column = &model.columns[j];
        let mut placed = 0;
        for copies in 1..=column.upper {
            let fits = column
                .entries
                .iter()
                .all(|&(row, coeff)| self.activity[row] + coeff <= model.rows[row].upper);
            if !fits {
                break;
            }
            for &(row, coeff) in &column.entries {
                self.activity[row] += coeff;
            }
            placed = copies;

            choice.push((j, copies));
            let next = Objective {
                primary: gain.primary + column.weight * copies as i32,
                secondary: gain.secondary + column.bonus * copies.min(column.bonus_cap) as i32,
            };
            self.choose(step, i + 1, choice, next, best)?;
            choice.pop();
        }
        for &(row, coeff) in &column.entries {
            self.activity[row] -= coeff * placed;
        }
        Ok(())
    }

    fn close(
        &mut self,
        step: usize,
        choice: &[(usize, u8)],
        gain: Objective,
        best: &mut Option<Entry>,
    ) -> Result<(), EngineStatus> {
        let rest = if step < self.model.order.len() {
            let row = self.model.order[step];
            if self.activity[row] < self.model.rows[row].lower {
                return Ok(());
            }
            self.step(step + 1)?
        } else {
            let satisfied = self
                .global
                .iter()
                .all(|&row| self.activity[row] >= self.model.rows[row].lower);
            satisfied.then_some(Objective::default())
        };

        if let Some(rest) = rest {
            let total = Objective {
                primary: gain.primary + rest.primary,
                secondary: gain.secondary + rest.secondary,
            };
            if best.as_ref().is_none_or(|b| total > b.gain) {
                *best = Some(Entry {
                    gain: total,
                    choice: choice.to_vec(),
                });
            }
        }
        Ok(())
    }

    /// Give up once the memo holds `states` entries or the work done passes
    /// what that many entries would allow.
    fn check_state_limit(&self, entries: usize) -> Result<(), EngineStatus> {
        match self.state_limit {
            Some(states)
                if entries >= states || self.ticker.ticks() > states as u64 * TICKS_PER_STATE =>
            {
                Err(EngineStatus::StateLimit { states })
            }
            _ => Ok(()),
        }
    }

    /// Walk the memo from the root, applying each step's best choice.
    fn replay(&mut self) -> Result<Vec<u8>, EngineStatus> {
        let mut copies = vec![0u8; self.model.columns.len()];
        self.activity.iter_mut().for_each(|a| *a = 0);
        for step in 0..=self.model.order.len() {
            let key = self.key(step);
            let Some(Some(entry)) = self.memo.get(&key) else {
                return Err(EngineStatus::Infeasible);
            };
            for &(j, x) in &entry.choice {
                copies[j] = x;
                for &(row, coeff) in &self.model.columns[j].entries {
                    self.activity[row] += coeff * x;
                }
            }
        }
        Ok(copies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Row};
    use crate::{PlayOptimizer, TileCounts};
    use assert_matches::assert_matches;

    fn column(entries: Vec<(usize, u8)>, weight: i32) -> Column {
        Column {
            entries,
            upper: 2,
            weight,
            bonus: 0,
            bonus_cap: 0,
        }
    }

    fn model(rows: Vec<Row>, columns: Vec<Column>, order: Vec<usize>) -> Model {
        Model {
            rows,
            columns,
            order,
            offset: 0,
            tile_rows: false,
        }
    }

    fn unit(lower: u8) -> Row {
        Row { lower, upper: 1 }
    }

    #[test]
    fn test_picks_heaviest_feasible_cover() {
        // rows 0..3 each hold at most one unit; row 0 must be covered
        let model = model(
            vec![unit(1), unit(0), unit(0)],
            vec![
                column(vec![(0, 1), (1, 1)], 2),
                column(vec![(0, 1), (1, 1), (2, 1)], 3),
                column(vec![(2, 1)], 1),
            ],
            vec![0, 1, 2],
        );
        let result = AnchorSearch::new().optimize(&model, Duration::from_secs(5)).unwrap();
        assert_eq!(result.copies, vec![0, 1, 0]);
        assert_eq!(result.objective.primary, 3);
        assert!(model.check(&result.copies).is_ok());
    }

    #[test]
    fn test_uses_two_copies_when_allowed() {
        let model = model(vec![Row { lower: 0, upper: 2 }], vec![column(vec![(0, 1)], 1)], vec![0]);
        let result = AnchorSearch::new().optimize(&model, Duration::from_secs(5)).unwrap();
        assert_eq!(result.copies, vec![2]);
    }

    #[test]
    fn test_global_row_lower_bound() {
        // row 1 is global and must be hit once; only column 1 touches it
        let model = model(
            vec![Row { lower: 0, upper: 2 }, unit(1)],
            vec![column(vec![(0, 2)], 5), column(vec![(0, 1), (1, 1)], 1)],
            vec![0],
        );
        let result = AnchorSearch::new().optimize(&model, Duration::from_secs(5)).unwrap();
        assert_eq!(result.copies, vec![0, 1]);
        assert!(model.check(&result.copies).is_ok());
    }

    #[test]
    fn test_secondary_breaks_ties() {
        let mut preferred = column(vec![(0, 1), (1, 1)], 2);
        preferred.bonus = 1;
        preferred.bonus_cap = 1;
        let model = model(
            vec![unit(1), unit(0), unit(0)],
            vec![column(vec![(0, 1), (2, 1)], 2), preferred],
            vec![0, 1, 2],
        );
        let result = AnchorSearch::new().optimize(&model, Duration::from_secs(5)).unwrap();
        assert_eq!(result.copies, vec![0, 1]);
        assert_eq!(result.objective, Objective { primary: 2, secondary: 1 });
    }

    #[test]
    fn test_infeasible_model() {
        let model = model(vec![unit(1)], vec![column(vec![(0, 2)], 1)], vec![0]);
        assert_matches!(
            AnchorSearch::new().optimize(&model, Duration::from_secs(5)),
            Err(EngineStatus::Infeasible)
        );
    }

    #[test]
    fn test_zero_budget_times_out() {
        let model = model(vec![unit(0)], vec![column(vec![(0, 1)], 1)], vec![0]);
        assert_matches!(
            AnchorSearch::new().optimize(&model, Duration::ZERO),
            Err(EngineStatus::Timeout { limit_ms: 0 })
        );
        assert_matches!(
            StagedSearch::default().optimize(&model, Duration::ZERO),
            Err(EngineStatus::Timeout { limit_ms: 0 })
        );
    }

    #[test]
    fn test_clock_is_checked_while_choosing() {
        // forty columns anchored at one row whose lower bound no choice
        // reaches: the search never leaves the first step
        let row = Row { lower: 200, upper: 255 };
        let columns = (0..40).map(|_| column(vec![(0, 1)], 1)).collect();
        let model = model(vec![row], columns, vec![0]);

        let timer = TimeTracker::new(Duration::from_secs(60));
        let result = AnchorSearch::new().optimize(&model, Duration::from_millis(50));
        assert_matches!(result, Err(EngineStatus::Timeout { limit_ms: 50 }));
        assert!(timer.elapsed() < Duration::from_secs(2), "took {:?}", timer.elapsed());
    }

    #[test]
    fn test_state_limit_stops_search() {
        let model = model(
            vec![unit(0), unit(0), unit(0)],
            vec![column(vec![(0, 1), (1, 1)], 2), column(vec![(1, 1), (2, 1)], 2)],
            vec![0, 1, 2],
        );
        assert_matches!(
            AnchorSearch::with_state_limit(1).optimize(&model, Duration::from_secs(5)),
            Err(EngineStatus::StateLimit { states: 1 })
        );
        let roomy = AnchorSearch::with_state_limit(100);
        assert!(roomy.optimize(&model, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_staged_search_hands_over_to_the_sweep() {
        let optimizer = PlayOptimizer::new().unwrap();
        let board = TileCounts::parse("r1 r2 r3 r4 r5 r6 b4 y4 k4").unwrap();
        let rack = TileCounts::parse("r7 b5 y5 k5 w").unwrap();
        let model = optimizer.model(&board, &rack);

        let exact = AnchorSearch::new().optimize(&model, Duration::from_secs(30)).unwrap();
        let staged = StagedSearch::with_state_limit(1)
            .optimize(&model, Duration::from_secs(30))
            .unwrap();
        assert_eq!(staged.objective.primary, exact.objective.primary);
        assert_eq!(exact.objective.primary, 5);
        assert!(model.check(&staged.copies).is_ok());
    }

    #[test]
    fn test_staged_search_without_a_tile_layout_stays_exact() {
        let model = model(
            vec![unit(1), unit(0), unit(0)],
            vec![
                column(vec![(0, 1), (1, 1)], 2),
                column(vec![(0, 1), (1, 1), (2, 1)], 3),
                column(vec![(2, 1)], 1),
            ],
            vec![0, 1, 2],
        );
        let result = StagedSearch::with_state_limit(1)
            .optimize(&model, Duration::from_secs(5))
            .unwrap();
        assert_eq!(result.copies, vec![0, 1, 0]);
    }
}
