//! Number-by-number sweep over the tile alphabet.
//!
//! Runs are followed as open tracks, per color. A track only remembers
//! whether it holds one, two, or at least three tiles: a run of six or more
//! still cuts into catalog runs of three to five, each keeping a real tile.
//! Groups are settled once all four colors of a number are placed. Every
//! layer of states is kept with a link to its best predecessor, so the
//! winning layout is read back after the sweep and then cut into catalog
//! sets.

use crate::engine::{Engine, EngineStatus, Ticker, TimeTracker};
use crate::model::{Assignment, Model};
use crate::state::MAX_COPIES;
use crate::{ALPHABET_SIZE, Tile, WILD_INDEX};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::time::Duration;

const NUMBERS: u8 = 13;
const COLORS: usize = 4;
/// Open runs of one color at one number: two real copies plus two wilds.
const MAX_TRACKS: u8 = 4;
/// One step per color, then one for the number's groups.
const STEPS_PER_NUMBER: usize = COLORS + 1;
const STEPS: usize = NUMBERS as usize * STEPS_PER_NUMBER;

const TRACK_BITS: u32 = 9;
const WILDS_SHIFT: u32 = 36;
const SHARE_SHIFT: u32 = 38;
const GROUPED_SHIFT: u32 = 40;
const TRACKS_MASK: u64 = (1 << WILDS_SHIFT) - 1;

/// Packed sweep state.
///
/// Bits `9c..9c+9` hold the open tracks of color `c` as three 3-bit counts
/// (one tile, two tiles, three or more). Above them sit the wilds placed so
/// far, the most copies one color gives to the current number's groups, and
/// the tiles those groups hold so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct State(u64);

impl State {
    fn tracks(self, color: usize) -> [u8; 3] {
        let bits = self.0 >> (TRACK_BITS * color as u32);
        [(bits & 7) as u8, ((bits >> 3) & 7) as u8, ((bits >> 6) & 7) as u8]
    }

    fn with_tracks(self, color: usize, [ones, twos, long]: [u8; 3]) -> State {
        let shift = TRACK_BITS * color as u32;
        let packed = (ones as u64) | ((twos as u64) << 3) | ((long as u64) << 6);
        State((self.0 & !(0x1FF << shift)) | (packed << shift))
    }

    fn wilds(self) -> u8 {
        ((self.0 >> WILDS_SHIFT) & 3) as u8
    }

    fn share(self) -> u8 {
        ((self.0 >> SHARE_SHIFT) & 3) as u8
    }

    fn grouped(self) -> u8 {
        ((self.0 >> GROUPED_SHIFT) & 15) as u8
    }

    fn with_counters(self, wilds: u8, share: u8, grouped: u8) -> State {
        State(
            (self.0 & TRACKS_MASK)
                | ((wilds as u64) << WILDS_SHIFT)
                | ((share as u64) << SHARE_SHIFT)
                | ((grouped as u64) << GROUPED_SHIFT),
        )
    }
}

/// What one step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    /// Copies of one (color, number): `extended` runs of three or more carry
    /// on, `opened` runs start here, `wilds` of the run slots are filled by
    /// wilds, and `grouped` copies join this number's groups.
    Place {
        extended: u8,
        opened: u8,
        wilds: u8,
        grouped: u8,
    },
    /// This number's groups take `wilds` more wilds.
    Close { wilds: u8 },
}

#[derive(Debug, Clone, Copy)]
struct Node {
    state: State,
    value: i32,
    /// Index of the best predecessor in the previous layer.
    from: u32,
}

/// Exact on the primary objective for models over the tile alphabet that
/// count moved tiles. The tie-break is only settled while cutting the chosen
/// runs and groups into catalog sets, one run or number at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSweep;

impl Engine for RunSweep {
    fn optimize(&self, model: &Model, limit: Duration) -> Result<Assignment, EngineStatus> {
        if !model.tile_rows {
            return Err(EngineStatus::Unsupported("columns are not weighted per tile"));
        }
        if model.rows.len() != ALPHABET_SIZE {
            return Err(EngineStatus::Unsupported("rows are not the tile alphabet"));
        }

        let mut sweep = Sweep {
            model,
            ticker: Ticker::new(TimeTracker::new(limit)),
        };
        let layers = sweep.run()?;
        let moves = sweep.trace(&layers)?;
        let copies = Cutter::new(model).layout(&moves)?;
        log::trace!(
            "run sweep: {} states over {} layers, {} ticks",
            layers.iter().map(Vec::len).sum::<usize>(),
            layers.len(),
            sweep.ticker.ticks()
        );

        model.check(&copies).map_err(|reason| {
            log::warn!("run sweep built a layout outside the model: {}", reason);
            EngineStatus::Infeasible
        })?;
        Ok(Assignment {
            objective: model.evaluate(&copies),
            copies,
        })
    }
}

fn tile_row(color: usize, number: u8) -> usize {
    Tile::new(color as u8, number).index()
}

/// Whether `total` group tiles at one number, wilds included, split into
/// groups when some color gives `share` copies to them.
fn groups_fit(share: u8, total: u8) -> bool {
    total == 0
        || (share.max(1)..=MAX_COPIES).any(|groups| (3 * groups..=4 * groups).contains(&total))
}

struct Sweep<'m> {
    model: &'m Model,
    ticker: Ticker,
}

impl Sweep<'_> {
    /// Layer `i` holds the states reached before step `i`. Step `i` places
    /// color `i % 5` of number `i / 5 + 1`, or closes that number's groups
    /// when `i % 5 == 4`.
    fn run(&mut self) -> Result<Vec<Vec<Node>>, EngineStatus> {
        let mut layers = Vec::with_capacity(STEPS + 1);
        layers.push(vec![Node {
            state: State(0),
            value: 0,
            from: 0,
        }]);

        for step in 0..STEPS {
            let mut next = Vec::new();
            for (i, node) in layers[step].iter().enumerate() {
                self.moves(step, node.state, |_, state, gain| {
                    next.push(Node {
                        state,
                        value: node.value + gain,
                        from: i as u32,
                    })
                })?;
            }
            next.sort_unstable_by(|a, b| {
                a.state
                    .cmp(&b.state)
                    .then(b.value.cmp(&a.value))
                    .then(a.from.cmp(&b.from))
            });
            next.dedup_by(|later, kept| later.state == kept.state);
            if next.is_empty() {
                return Err(EngineStatus::Infeasible);
            }
            if step % STEPS_PER_NUMBER == COLORS {
                let number = step / STEPS_PER_NUMBER + 1;
                log::trace!("run sweep: {} states after number {}", next.len(), number);
            }
            layers.push(next);
        }
        Ok(layers)
    }

    /// Walk predecessor links back from the best final state and recover the
    /// move taken at every step.
    fn trace(&mut self, layers: &[Vec<Node>]) -> Result<Vec<Move>, EngineStatus> {
        let last = layers.last().ok_or(EngineStatus::Infeasible)?;
        let (mut index, _) = last
            .iter()
            .enumerate()
            .max_by_key(|(i, node)| (node.value, Reverse(*i)))
            .ok_or(EngineStatus::Infeasible)?;

        let mut moves = Vec::with_capacity(STEPS);
        for step in (0..layers.len() - 1).rev() {
            let node = layers[step + 1][index];
            let prev = layers[step][node.from as usize];
            let mut taken = None;
            self.moves(step, prev.state, |m, state, gain| {
                if taken.is_none() && state == node.state && prev.value + gain == node.value {
                    taken = Some(m);
                }
            })?;
            moves.push(taken.ok_or(EngineStatus::Infeasible)?);
            index = node.from as usize;
        }
        moves.reverse();
        Ok(moves)
    }

    fn moves(
        &mut self,
        step: usize,
        state: State,
        mut emit: impl FnMut(Move, State, i32),
    ) -> Result<(), EngineStatus> {
        let number = (step / STEPS_PER_NUMBER) as u8 + 1;
        let color = step % STEPS_PER_NUMBER;
        let wild_row = self.model.rows[WILD_INDEX];
        let spare = wild_row.upper.saturating_sub(state.wilds());

        if color == COLORS {
            for wilds in 0..=spare {
                if !groups_fit(state.share(), state.grouped() + wilds) {
                    continue;
                }
                let used = state.wilds() + wilds;
                if number == NUMBERS && used < wild_row.lower {
                    continue;
                }
                self.ticker.tick()?;
                emit(Move::Close { wilds }, state.with_counters(used, 0, 0), wilds as i32);
            }
            return Ok(());
        }

        let [ones, twos, long] = state.tracks(color);
        // a run holding one tile after number 12 can no longer reach three
        if number == NUMBERS && ones > 0 {
            return Ok(());
        }
        let row = self.model.rows[tile_row(color, number)];
        let next_upper = match number {
            NUMBERS => 0,
            _ => self.model.rows[tile_row(color, number + 1)].upper,
        };

        for extended in 0..=long {
            for opened in 0..=MAX_TRACKS {
                // stopping one run and opening another is the same as carrying on
                if opened > 0 && (extended < long || number + 2 > NUMBERS) {
                    break;
                }
                let slots = ones + twos + extended + opened;
                if slots > MAX_TRACKS {
                    break;
                }
                for wilds in 0..=spare.min(slots) {
                    let real = slots - wilds;
                    for grouped in 0..=MAX_COPIES {
                        let placed = real + grouped;
                        if placed < row.lower || placed > row.upper {
                            continue;
                        }
                        // runs that must go on need room at the next number
                        let room = match number {
                            NUMBERS => 0,
                            _ => next_upper + spare - wilds,
                        };
                        let pending = opened + ones;
                        if pending > room {
                            continue;
                        }
                        let carried = (twos + extended).min(room - pending);
                        let next = state.with_tracks(color, [opened, ones, carried]).with_counters(
                            state.wilds() + wilds,
                            state.share().max(grouped),
                            state.grouped() + grouped,
                        );
                        self.ticker.tick()?;
                        let gain = (placed + wilds) as i32;
                        emit(
                            Move::Place {
                                extended,
                                opened,
                                wilds,
                                grouped,
                            },
                            next,
                            gain,
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

/// An open or finished run: its first number and which slots hold a wild.
#[derive(Debug, Clone)]
struct Track {
    start: u8,
    wild: Vec<bool>,
}

/// Turns the traced moves into column copies.
struct Cutter<'m> {
    model: &'m Model,
    columns: HashMap<Vec<(usize, u8)>, usize>,
}

impl<'m> Cutter<'m> {
    fn new(model: &'m Model) -> Self {
        let columns = model
            .columns
            .iter()
            .enumerate()
            .map(|(j, column)| {
                let mut key = column.entries.clone();
                key.sort_unstable();
                (key, j)
            })
            .collect();
        Cutter { model, columns }
    }

    fn layout(&self, moves: &[Move]) -> Result<Vec<u8>, EngineStatus> {
        let mut copies = vec![0u8; self.model.columns.len()];
        let mut open: Vec<Vec<Track>> = vec![Vec::new(); COLORS];
        let mut finished: Vec<(usize, Track)> = Vec::new();
        let mut shares = [0u8; COLORS];

        for (step, &m) in moves.iter().enumerate() {
            let number = (step / STEPS_PER_NUMBER) as u8 + 1;
            let color = step % STEPS_PER_NUMBER;
            match m {
                Move::Place {
                    extended,
                    opened,
                    wilds,
                    grouped,
                } => {
                    shares[color] = grouped;
                    let (mut carried, mut long): (Vec<Track>, Vec<Track>) =
                        std::mem::take(&mut open[color])
                            .into_iter()
                            .partition(|track| track.wild.len() < 3);
                    if extended as usize > long.len() {
                        return Err(EngineStatus::Infeasible);
                    }
                    // the newest runs carry on, the oldest stop
                    long.sort_by_key(|track| Reverse(track.start));
                    let stopped = long.split_off(extended as usize);
                    finished.extend(stopped.into_iter().map(|track| (color, track)));
                    carried.extend(long);
                    carried.extend((0..opened).map(|_| Track {
                        start: number,
                        wild: Vec::new(),
                    }));

                    // wilds take the last slots, so new runs get them first
                    let slots = carried.len();
                    for (i, track) in carried.iter_mut().enumerate() {
                        track.wild.push(i + wilds as usize >= slots);
                    }
                    open[color] = carried;
                }
                Move::Close { wilds } => {
                    self.place_groups(number, &shares, wilds, &mut copies)?;
                    shares = [0; COLORS];
                }
            }
        }

        for (color, tracks) in open.into_iter().enumerate() {
            finished.extend(tracks.into_iter().map(|track| (color, track)));
        }
        for (color, track) in &finished {
            self.cut_run(*color, track, &mut copies)?;
        }
        Ok(copies)
    }

    fn lookup(&self, rows: &[usize], wilds: u8) -> Option<usize> {
        let mut key: Vec<(usize, u8)> = rows.iter().map(|&row| (row, 1)).collect();
        if wilds > 0 {
            key.push((WILD_INDEX, wilds));
        }
        key.sort_unstable();
        self.columns.get(&key).copied()
    }

    /// Weight and tie-break credit of adding one copy of each of `picks`.
    fn score(&self, picks: &[usize], copies: &[u8]) -> (i32, i32) {
        let mut extra: Vec<(usize, u8)> = Vec::with_capacity(picks.len());
        let mut score = (0, 0);
        for &j in picks {
            let column = &self.model.columns[j];
            let before = copies[j]
                + extra
                    .iter()
                    .filter(|(k, _)| *k == j)
                    .map(|&(_, n)| n)
                    .sum::<u8>();
            score.0 += column.weight;
            if before < column.bonus_cap {
                score.1 += column.bonus;
            }
            extra.push((j, 1));
        }
        score
    }

    /// Split one finished run into catalog runs of three to five tiles,
    /// favoring splits that credit the tie-break.
    fn cut_run(&self, color: usize, track: &Track, copies: &mut [u8]) -> Result<(), EngineStatus> {
        let len = track.wild.len();
        // best[i]: best score for the first i slots, with the piece ending there
        let mut best: Vec<Option<((i32, i32), usize, usize)>> = vec![None; len + 1];
        best[0] = Some(((0, 0), 0, usize::MAX));
        for end in 3..=len {
            for size in 3..=5usize.min(end) {
                let begin = end - size;
                let Some((so_far, _, _)) = best[begin] else {
                    continue;
                };
                let rows: Vec<usize> = (begin..end)
                    .filter(|&i| !track.wild[i])
                    .map(|i| tile_row(color, track.start + i as u8))
                    .collect();
                let wilds = (size - rows.len()) as u8;
                let Some(j) = self.lookup(&rows, wilds) else {
                    continue;
                };
                let (weight, bonus) = self.score(&[j], copies);
                let total = (so_far.0 + weight, so_far.1 + bonus);
                if best[end].is_none_or(|(current, _, _)| total > current) {
                    best[end] = Some((total, begin, j));
                }
            }
        }

        let mut end = len;
        while end > 0 {
            let (_, begin, j) = best[end].ok_or(EngineStatus::Infeasible)?;
            copies[j] += 1;
            end = begin;
        }
        Ok(())
    }

    /// Form one or two groups at `number` from the copies each color gave
    /// and `wilds` wilds, favoring the split that credits the tie-break.
    fn place_groups(
        &self,
        number: u8,
        shares: &[u8; COLORS],
        wilds: u8,
        copies: &mut [u8],
    ) -> Result<(), EngineStatus> {
        if shares.iter().all(|&share| share == 0) && wilds == 0 {
            return Ok(());
        }
        let row = |color: usize| tile_row(color, number);
        let both: Vec<usize> = (0..COLORS).filter(|&c| shares[c] == 2).map(row).collect();
        let single: Vec<usize> = (0..COLORS).filter(|&c| shares[c] == 1).map(row).collect();

        let mut options: Vec<Vec<usize>> = Vec::new();
        if both.is_empty() {
            options.extend(self.lookup(&single, wilds).map(|j| vec![j]));
        }
        for mask in 0..(1usize << single.len()) {
            for left_wilds in 0..=wilds {
                let side = |left: bool| -> Vec<usize> {
                    let picked = single
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| ((mask >> i) & 1 == 1) == left)
                        .map(|(_, &r)| r);
                    both.iter().copied().chain(picked).collect()
                };
                let (left, right) = (side(true), side(false));
                if left.is_empty() || right.is_empty() {
                    continue;
                }
                let pair = (
                    self.lookup(&left, left_wilds),
                    self.lookup(&right, wilds - left_wilds),
                );
                if let (Some(a), Some(b)) = pair {
                    options.push(vec![a, b]);
                }
            }
        }

        let picks = options
            .iter()
            .max_by_key(|picks| self.score(picks, copies))
            .ok_or(EngineStatus::Infeasible)?;
        for &j in picks {
            copies[j] += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AnchorSearch;
    use crate::model::{Column, Row};
    use crate::optimizer::Goal;
    use crate::state::{BoardState, RackState};
    use crate::{PlayOptimizer, TileCounts};
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn counts(s: &str) -> TileCounts {
        TileCounts::parse(s).unwrap()
    }

    fn sweep(board: &BoardState, rack: &RackState) -> (Model, Assignment) {
        let model = PlayOptimizer::new().unwrap().model(board, rack);
        let result = RunSweep.optimize(&model, Duration::from_secs(30)).unwrap();
        assert!(model.check(&result.copies).is_ok());
        (model, result)
    }

    #[test]
    fn test_state_packing() {
        let state = State(0)
            .with_tracks(2, [1, 0, 4])
            .with_counters(2, 1, 7)
            .with_tracks(0, [3, 2, 1]);
        assert_eq!(state.tracks(2), [1, 0, 4]);
        assert_eq!(state.tracks(0), [3, 2, 1]);
        assert_eq!(state.tracks(1), [0, 0, 0]);
        assert_eq!((state.wilds(), state.share(), state.grouped()), (2, 1, 7));
        assert_eq!(state.with_counters(0, 0, 0).tracks(2), [1, 0, 4]);
    }

    #[test]
    fn test_groups_fit() {
        assert!(groups_fit(0, 0));
        assert!(groups_fit(1, 3));
        assert!(groups_fit(1, 6));
        assert!(!groups_fit(2, 5));
        assert!(groups_fit(2, 8));
        assert!(!groups_fit(0, 2));
        assert!(!groups_fit(1, 9));
    }

    #[test]
    fn test_extends_a_run_and_a_group() {
        let (_, result) = sweep(&counts("r4 r5 r6 b9 y9 k9"), &counts("r7 r9"));
        assert_eq!(result.objective.primary, 2);
    }

    #[test]
    fn test_four_singles_and_two_wilds_make_two_groups() {
        let (_, result) = sweep(&counts("r5 b5 y5 k5"), &counts("w w"));
        assert_eq!(result.objective.primary, 2);
    }

    #[test]
    fn test_long_run_with_wilds_is_cut_into_catalog_sets() {
        let board = counts("b1 b2 b3 b4 b5 b6 b7 b8 b9 b10 w");
        let (model, result) = sweep(&board, &counts("w b11"));
        assert_eq!(result.objective.primary, 2);
        assert_eq!(model.activity(&result.copies)[WILD_INDEX], 2);
    }

    #[test]
    fn test_board_that_is_not_a_layout_is_infeasible() {
        let model = PlayOptimizer::new().unwrap().model(&counts("r1 b7"), &counts("k2"));
        assert_matches!(
            RunSweep.optimize(&model, Duration::from_secs(5)),
            Err(EngineStatus::Infeasible)
        );
    }

    #[test]
    fn test_zero_budget_times_out() {
        let model = PlayOptimizer::new().unwrap().model(&counts("r4 r5 r6"), &counts("w"));
        assert_matches!(
            RunSweep.optimize(&model, Duration::ZERO),
            Err(EngineStatus::Timeout { limit_ms: 0 })
        );
    }

    #[test]
    fn test_declines_abstract_models() {
        let model = Model {
            rows: vec![Row { lower: 0, upper: 1 }],
            columns: vec![Column {
                entries: vec![(0, 1)],
                upper: 1,
                weight: 1,
                bonus: 0,
                bonus_cap: 0,
            }],
            order: vec![0],
            offset: 0,
            tile_rows: false,
        };
        assert_matches!(
            RunSweep.optimize(&model, Duration::from_secs(5)),
            Err(EngineStatus::Unsupported(_))
        );
    }

    #[test]
    fn test_agrees_with_column_search_on_random_turns() {
        let optimizer = PlayOptimizer::new().unwrap();
        let catalog = optimizer.catalog();
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..30 {
            let mut supply = [MAX_COPIES; ALPHABET_SIZE];
            let mut board = [0u8; ALPHABET_SIZE];
            for _ in 0..rng.gen_range(0..=4) {
                let set = catalog.get(rng.gen_range(0..catalog.len())).unwrap();
                if set.composition().iter().all(|&(i, c)| supply[i] >= c) {
                    for &(i, c) in set.composition() {
                        supply[i] -= c;
                        board[i] += c;
                    }
                }
            }
            let mut rack = [0u8; ALPHABET_SIZE];
            for _ in 0..rng.gen_range(0..=8) {
                let i = rng.gen_range(0..ALPHABET_SIZE);
                if supply[i] > 0 {
                    supply[i] -= 1;
                    rack[i] += 1;
                }
            }
            let board = TileCounts::from_vector(&board).unwrap();
            let rack = TileCounts::from_vector(&rack).unwrap();

            let model = optimizer.model(&board, &rack);
            let exact = AnchorSearch::new().optimize(&model, Duration::from_secs(30)).unwrap();
            let swept = RunSweep.optimize(&model, Duration::from_secs(30)).unwrap();
            let primary = (swept.objective.primary, exact.objective.primary);
            assert_eq!(primary.0, primary.1, "{:?} / {:?}", board, rack);
            assert!(model.check(&swept.copies).is_ok());
        }
    }

    #[test]
    fn test_declines_point_models() {
        let optimizer = PlayOptimizer::new().unwrap();
        let model = optimizer.model_for(&BoardState::new(), &counts("r10 r11 w"), Goal::MostPoints);
        assert_matches!(
            RunSweep.optimize(&model, Duration::from_secs(5)),
            Err(EngineStatus::Unsupported(_))
        );
    }
}
