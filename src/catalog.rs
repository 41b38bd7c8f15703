//! The universe of legal tile sets, generated once per process.

use crate::error::{Result, SolveError};
use crate::state::{BoardState, MAX_COPIES};
use crate::{Meld, MeldType, Tile, classify, color};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::OnceLock;

/// Run lengths generated as base patterns. Longer runs are not candidates.
pub const RUN_LENGTHS: [u8; 3] = [3, 4, 5];
/// Group sizes generated as base patterns.
pub const GROUP_SIZES: [usize; 2] = [3, 4];

static CATALOG: OnceLock<Result<SetCatalog>> = OnceLock::new();

/// A legal run or group as an order-independent tile multiset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CandidateSet {
    kind: MeldType,
    /// Canonical (sorted) tiles.
    tiles: Vec<Tile>,
    /// `(alphabet index, copies)` for each distinct tile type in the set.
    #[serde(skip)]
    composition: Vec<(usize, u8)>,
}

impl CandidateSet {
    fn new(kind: MeldType, mut tiles: Vec<Tile>) -> Self {
        tiles.sort();
        let mut composition: Vec<(usize, u8)> = Vec::new();
        for tile in &tiles {
            match composition.last_mut() {
                Some((index, count)) if *index == tile.index() => *count += 1,
                _ => composition.push((tile.index(), 1)),
            }
        }
        CandidateSet { kind, tiles, composition }
    }

    pub fn kind(&self) -> MeldType {
        self.kind
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn composition(&self) -> &[(usize, u8)] {
        &self.composition
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn wild_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_wild()).count()
    }

    /// Copies of this set that the board counts could supply on their own.
    pub fn existing_copies(&self, board: &BoardState) -> u8 {
        self.composition
            .iter()
            .map(|&(index, count)| board.as_slice()[index] / count)
            .min()
            .unwrap_or(0)
    }

    /// The tile each wild stands for, in the order the wilds are placed.
    ///
    /// Runs fill internal gaps first, then extend upward while the numbers
    /// stay at or below 13, then downward. Groups take the missing colors in
    /// color order.
    pub fn wildcard_roles(&self) -> Vec<Tile> {
        let wilds = self.wild_count();
        if wilds == 0 {
            return Vec::new();
        }
        let real: Vec<Tile> = self.tiles.iter().copied().filter(|t| !t.is_wild()).collect();
        let Some(first) = real.first().copied() else {
            return Vec::new();
        };
        let (Some(c), Some(n)) = (first.color(), first.number()) else {
            return Vec::new();
        };

        match self.kind {
            MeldType::Run => {
                let numbers: Vec<u8> = real.iter().filter_map(|t| t.number()).collect();
                let (lo, hi) = (numbers[0], numbers[numbers.len() - 1]);
                let mut roles: Vec<Tile> = (lo..=hi)
                    .filter(|k| !numbers.contains(k))
                    .map(|k| Tile::new(c, k))
                    .collect();
                let mut up = hi;
                while roles.len() < wilds && up < 13 {
                    up += 1;
                    roles.push(Tile::new(c, up));
                }
                let mut down = lo;
                while roles.len() < wilds && down > 1 {
                    down -= 1;
                    roles.push(Tile::new(c, down));
                }
                roles
            }
            MeldType::Group => color::ALL
                .iter()
                .filter(|&&col| !real.iter().any(|t| t.color() == Some(col)))
                .take(wilds)
                .map(|&col| Tile::new(col, n))
                .collect(),
        }
    }

    /// Lay the set out in display order with each wild at the slot it fills.
    pub fn to_meld(&self) -> Meld {
        let roles = self.wildcard_roles();
        let mut slots: Vec<(Tile, Tile)> = self
            .tiles
            .iter()
            .copied()
            .filter(|t| !t.is_wild())
            .map(|t| (t, t))
            .chain(roles.into_iter().map(|r| (r, Tile::wild())))
            .collect();
        match self.kind {
            MeldType::Run => slots.sort_by_key(|(stands_for, _)| stands_for.number()),
            MeldType::Group => slots.sort_by_key(|(stands_for, _)| stands_for.color()),
        }
        Meld::new(self.kind, slots.into_iter().map(|(_, placed)| placed).collect::<VecDeque<_>>())
    }

    /// Point value with each wild worth the tile it stands for.
    pub fn points(&self) -> u32 {
        self.to_meld().points()
    }
}

/// Every distinct candidate set, addressed by a stable integer index.
#[derive(Debug, Clone)]
pub struct SetCatalog {
    sets: Vec<CandidateSet>,
    by_tiles: HashMap<Vec<Tile>, usize>,
}

impl SetCatalog {
    /// Generate the catalog: base runs and groups, then every variant with one
    /// or two positions replaced by a wild. A 3-tile group with two wilds is
    /// skipped since its lone real tile no longer pins the group down.
    pub fn build() -> Result<Self> {
        let mut catalog = SetCatalog {
            sets: Vec::new(),
            by_tiles: HashMap::new(),
        };

        let mut bases: Vec<(MeldType, Vec<Tile>)> = Vec::new();
        for &c in &color::ALL {
            for start in 1..=13u8 {
                for &len in &RUN_LENGTHS {
                    if start + len <= 14 {
                        let tiles = (start..start + len).map(|n| Tile::new(c, n)).collect();
                        bases.push((MeldType::Run, tiles));
                    }
                }
            }
        }
        for number in 1..=13u8 {
            for &size in &GROUP_SIZES {
                for colors in color_subsets(size) {
                    let tiles = colors.into_iter().map(|c| Tile::new(c, number)).collect();
                    bases.push((MeldType::Group, tiles));
                }
            }
        }

        for (kind, tiles) in &bases {
            catalog.insert(*kind, tiles.clone())?;
        }
        for (kind, tiles) in &bases {
            for wilds in 1..=2 {
                if *kind == MeldType::Group && tiles.len() == 3 && wilds == 2 {
                    continue;
                }
                for positions in index_combinations(tiles.len(), wilds) {
                    let mut variant = tiles.clone();
                    for p in positions {
                        variant[p] = Tile::wild();
                    }
                    catalog.insert(*kind, variant)?;
                }
            }
        }

        log::debug!(
            "built set catalog: {} sets from {} base patterns",
            catalog.sets.len(),
            bases.len()
        );
        Ok(catalog)
    }

    /// The process-wide catalog, built on first use.
    pub fn global() -> Result<&'static SetCatalog> {
        CATALOG.get_or_init(SetCatalog::build).as_ref().map_err(Clone::clone)
    }

    fn insert(&mut self, kind: MeldType, tiles: Vec<Tile>) -> Result<()> {
        let set = CandidateSet::new(kind, tiles);
        if self.by_tiles.contains_key(&set.tiles) {
            return Ok(());
        }
        if classify(&set.tiles) != Some(kind) {
            return Err(SolveError::CatalogBuild(format!(
                "generated {:?} {:?} is not a legal {:?}",
                kind, set.tiles, kind
            )));
        }
        if set.composition.iter().any(|&(_, count)| count > MAX_COPIES) {
            return Err(SolveError::CatalogBuild(format!(
                "generated set {:?} needs more than {} copies of a tile",
                set.tiles, MAX_COPIES
            )));
        }
        self.by_tiles.insert(set.tiles.clone(), self.sets.len());
        self.sets.push(set);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CandidateSet> {
        self.sets.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidateSet> {
        self.sets.iter()
    }

    /// Index of the set whose canonical form matches `tiles` in any order.
    pub fn index_of(&self, tiles: &[Tile]) -> Option<usize> {
        let mut key = tiles.to_vec();
        key.sort();
        self.by_tiles.get(&key).copied()
    }
}

/// All `k`-element color subsets, in lexicographic order.
fn color_subsets(k: usize) -> Vec<Vec<u8>> {
    index_combinations(color::ALL.len(), k)
        .into_iter()
        .map(|idx| idx.into_iter().map(|i| color::ALL[i]).collect())
        .collect()
}

/// All `k`-element subsets of `0..n`, in lexicographic order.
fn index_combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k > n {
        return out;
    }
    let mut combo: Vec<usize> = (0..k).collect();
    loop {
        out.push(combo.clone());

        // Find the rightmost element that can be incremented
        let mut i = k;
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            if combo[i] < n - k + i {
                break;
            }
        }
        combo[i] += 1;
        for j in (i + 1)..k {
            combo[j] = combo[j - 1] + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiles(s: &str) -> Vec<Tile> {
        s.split_whitespace().map(|t| Tile::from_string(t).unwrap()).collect()
    }

    #[test]
    fn test_index_combinations() {
        assert_eq!(index_combinations(3, 2), vec![vec![0, 1], vec![0, 2], vec![1, 2]]);
        assert_eq!(index_combinations(4, 4).len(), 1);
        assert_eq!(index_combinations(5, 2).len(), 10);
        assert_eq!(index_combinations(2, 3).len(), 0);
    }

    #[test]
    fn test_catalog_size() {
        let catalog = SetCatalog::build().unwrap();
        let by_wilds = |w: usize| catalog.iter().filter(|s| s.wild_count() == w).count();
        assert_eq!(by_wilds(0), 185);
        assert_eq!(by_wilds(1), 494);
        assert_eq!(by_wilds(2), 494);
        assert_eq!(catalog.len(), 1173);
    }

    #[test]
    fn test_every_set_is_legal_and_canonical() {
        let catalog = SetCatalog::build().unwrap();
        for set in catalog.iter() {
            assert_eq!(classify(set.tiles()), Some(set.kind()), "{:?}", set.tiles());
            assert!(set.tiles().windows(2).all(|w| w[0] <= w[1]));
            assert!(set.to_meld().is_valid(), "{:?}", set.to_meld());
            let total: usize = set.composition().iter().map(|&(_, c)| c as usize).sum();
            assert_eq!(total, set.len());
        }
    }

    #[test]
    fn test_no_three_tile_group_with_two_wilds() {
        let catalog = SetCatalog::build().unwrap();
        assert!(
            !catalog
                .iter()
                .any(|s| s.kind() == MeldType::Group && s.len() == 3 && s.wild_count() == 2)
        );
    }

    #[test]
    fn test_runs_stop_at_five() {
        let catalog = SetCatalog::build().unwrap();
        assert!(catalog.iter().all(|s| s.len() <= 5));
        assert!(catalog.index_of(&tiles("r1 r2 r3 r4 r5")).is_some());
        assert!(catalog.index_of(&tiles("r1 r2 r3 r4 r5 r6")).is_none());
    }

    #[test]
    fn test_index_of_ignores_order() {
        let catalog = SetCatalog::build().unwrap();
        let a = catalog.index_of(&tiles("w r5 r4 r6")).unwrap();
        let b = catalog.index_of(&tiles("r4 r5 r6 w")).unwrap();
        assert_eq!(a, b);
        assert_eq!(catalog.get(a).unwrap().kind(), MeldType::Run);
        assert!(catalog.index_of(&tiles("r5 b5 w w")).is_some());
        assert!(catalog.index_of(&tiles("r5 b5 b5")).is_none());
    }

    #[test]
    fn test_wildcard_roles_for_runs() {
        let catalog = SetCatalog::build().unwrap();
        let role = |s: &str| {
            let idx = catalog.index_of(&tiles(s)).unwrap();
            catalog.get(idx).unwrap().wildcard_roles()
        };
        assert_eq!(role("r4 r5 r6 w"), tiles("r7"));
        assert_eq!(role("r4 w r6"), tiles("r5"));
        assert_eq!(role("r11 r12 r13 w"), tiles("r10"));
        assert_eq!(role("r12 w w"), tiles("r13 r11"));
        assert_eq!(role("b5 b6 b7"), Vec::<Tile>::new());
    }

    #[test]
    fn test_wildcard_roles_for_groups() {
        let catalog = SetCatalog::build().unwrap();
        let idx = catalog.index_of(&tiles("b5 k5 w")).unwrap();
        assert_eq!(catalog.get(idx).unwrap().wildcard_roles(), tiles("r5"));
        let idx = catalog.index_of(&tiles("r5 k5 w w")).unwrap();
        assert_eq!(catalog.get(idx).unwrap().wildcard_roles(), tiles("b5 y5"));
    }

    #[test]
    fn test_to_meld_places_wilds() {
        let catalog = SetCatalog::build().unwrap();
        let idx = catalog.index_of(&tiles("r12 w w")).unwrap();
        let meld = catalog.get(idx).unwrap().to_meld();
        assert_eq!(meld.tiles, VecDeque::from(tiles("w r12 w")));
        assert_eq!(meld.points(), 36);

        let idx = catalog.index_of(&tiles("k5 b5 w")).unwrap();
        let meld = catalog.get(idx).unwrap().to_meld();
        assert_eq!(meld.tiles, VecDeque::from(tiles("w b5 k5")));
    }

    #[test]
    fn test_existing_copies() {
        let catalog = SetCatalog::build().unwrap();
        let board = BoardState::parse("r1 r1 r2 r2 r3 r3 w").unwrap();
        let run = catalog.get(catalog.index_of(&tiles("r1 r2 r3")).unwrap()).unwrap();
        assert_eq!(run.existing_copies(&board), 2);
        let with_wild = catalog.get(catalog.index_of(&tiles("r1 r2 w")).unwrap()).unwrap();
        assert_eq!(with_wild.existing_copies(&board), 1);
        let two_wilds = catalog.get(catalog.index_of(&tiles("r1 w w")).unwrap()).unwrap();
        assert_eq!(two_wilds.existing_copies(&board), 0);
    }

    #[test]
    fn test_global_is_shared() {
        let a = SetCatalog::global().unwrap();
        let b = SetCatalog::global().unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.len(), 1173);
    }
}
