//! Dense count vectors over the 53-entry tile alphabet.

use crate::error::{Result, SolveError};
use crate::{ALPHABET_SIZE, Meld, Tile};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Most copies of one tile type that exist in a double deck.
pub const MAX_COPIES: u8 = 2;

/// Count of each tile type, indexed by [`Tile::index`]. Every entry is in
/// `0..=MAX_COPIES`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct TileCounts([u8; ALPHABET_SIZE]);

/// Tiles currently committed to the board.
pub type BoardState = TileCounts;
/// Tiles in the acting player's rack.
pub type RackState = TileCounts;

impl TileCounts {
    pub fn new() -> Self {
        TileCounts([0; ALPHABET_SIZE])
    }

    /// Build from a raw vector, rejecting a wrong length or any count above 2.
    pub fn from_vector(counts: &[u8]) -> Result<Self> {
        if counts.len() != ALPHABET_SIZE {
            return Err(SolveError::InvalidStateVector(format!(
                "expected {} entries, got {}",
                ALPHABET_SIZE,
                counts.len()
            )));
        }
        let mut out = TileCounts::new();
        for (i, &count) in counts.iter().enumerate() {
            if count > MAX_COPIES {
                return Err(SolveError::InvalidStateVector(format!(
                    "count {} for {} is outside [0,{}]",
                    count,
                    tile_label(i),
                    MAX_COPIES
                )));
            }
            out.0[i] = count;
        }
        Ok(out)
    }

    /// Count a tile multiset.
    pub fn from_tiles<I>(tiles: I) -> Result<Self>
    where
        I: IntoIterator<Item = Tile>,
    {
        let mut out = TileCounts::new();
        for tile in tiles {
            out.add(tile)?;
        }
        Ok(out)
    }

    /// Count every tile of every meld.
    pub fn from_melds(melds: &[Meld]) -> Result<Self> {
        Self::from_tiles(melds.iter().flat_map(|m| m.tiles.iter().copied()))
    }

    /// Parse whitespace-separated tiles such as `"r1 r2 w"`.
    pub fn parse(input: &str) -> Result<Self> {
        let tiles = input
            .split_whitespace()
            .map(Tile::from_string)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(SolveError::InvalidStateVector)?;
        Self::from_tiles(tiles)
    }

    /// Add one copy of `tile`.
    pub fn add(&mut self, tile: Tile) -> Result<()> {
        let slot = &mut self.0[tile.index()];
        if *slot >= MAX_COPIES {
            return Err(SolveError::InvalidStateVector(format!(
                "more than {} copies of {}",
                MAX_COPIES, tile
            )));
        }
        *slot += 1;
        Ok(())
    }

    pub fn get(&self, tile: Tile) -> u8 {
        self.0[tile.index()]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn total(&self) -> u32 {
        self.0.iter().map(|&c| c as u32).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&c| c == 0)
    }

    /// Expand back into a sorted tile list, one entry per copy.
    pub fn tiles(&self) -> Vec<Tile> {
        let mut tiles: Vec<Tile> = self
            .0
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| Tile::from_index(i).map(|t| (t, c)))
            .flat_map(|(t, c)| std::iter::repeat_n(t, c as usize))
            .collect();
        tiles.sort();
        tiles
    }

    /// Non-zero `(tile, count)` pairs in alphabet order.
    pub fn iter(&self) -> impl Iterator<Item = (Tile, u8)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .filter_map(|(i, &c)| Tile::from_index(i).map(|t| (t, c)))
    }

    /// Whether every count in `other` is covered by this one.
    pub fn contains(&self, other: &TileCounts) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a >= b)
    }

    /// Reject a board/rack pair that would need more than two physical copies
    /// of any tile type.
    pub fn check_disjoint_supply(board: &BoardState, rack: &RackState) -> Result<()> {
        for i in 0..ALPHABET_SIZE {
            let combined = board.0[i] + rack.0[i];
            if combined > MAX_COPIES {
                return Err(SolveError::InvalidStateVector(format!(
                    "board and rack together hold {} copies of {}",
                    combined,
                    tile_label(i)
                )));
            }
        }
        Ok(())
    }
}

fn tile_label(index: usize) -> String {
    Tile::from_index(index).map_or_else(|| format!("#{}", index), |t| t.to_string())
}

impl Default for TileCounts {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<u8>> for TileCounts {
    type Error = SolveError;

    fn try_from(counts: Vec<u8>) -> Result<Self> {
        TileCounts::from_vector(&counts)
    }
}

impl From<TileCounts> for Vec<u8> {
    fn from(counts: TileCounts) -> Self {
        counts.0.to_vec()
    }
}

impl fmt::Debug for TileCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter().map(|(t, c)| (t.to_string(), c))).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WILD_INDEX;
    use assert_matches::assert_matches;

    #[test]
    fn test_from_tiles_counts_copies() {
        let counts = TileCounts::parse("r1 r1 b5 w").unwrap();
        assert_eq!(counts.get(Tile::new(0, 1)), 2);
        assert_eq!(counts.get(Tile::new(1, 5)), 1);
        assert_eq!(counts.as_slice()[WILD_INDEX], 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_third_copy_is_rejected() {
        let result = TileCounts::parse("r1 r1 r1");
        assert_matches!(result, Err(SolveError::InvalidStateVector(_)));
    }

    #[test]
    fn test_bad_tile_text_is_rejected() {
        assert_matches!(TileCounts::parse("r1 q2"), Err(SolveError::InvalidStateVector(_)));
    }

    #[test]
    fn test_from_vector_validation() {
        assert_matches!(
            TileCounts::from_vector(&[0; 52]),
            Err(SolveError::InvalidStateVector(_))
        );
        let mut raw = [0u8; ALPHABET_SIZE];
        raw[7] = 3;
        assert_matches!(
            TileCounts::from_vector(&raw),
            Err(SolveError::InvalidStateVector(_))
        );
        raw[7] = 2;
        assert_eq!(TileCounts::from_vector(&raw).unwrap().get(Tile::new(0, 8)), 2);
    }

    #[test]
    fn test_tiles_expands_in_canonical_order() {
        let counts = TileCounts::parse("w k2 r2 r2").unwrap();
        let tiles = counts.tiles();
        assert_eq!(tiles, vec![Tile::new(0, 2), Tile::new(0, 2), Tile::new(3, 2), Tile::wild()]);
        assert_eq!(TileCounts::from_tiles(tiles).unwrap(), counts);
    }

    #[test]
    fn test_from_melds() {
        let melds = vec![
            Meld::from_string("r 4 5 6").unwrap(),
            Meld::from_string("5 b y w").unwrap(),
        ];
        let counts = TileCounts::from_melds(&melds).unwrap();
        assert_eq!(counts.total(), 6);
        assert_eq!(counts.get(Tile::new(0, 5)), 1);
        assert_eq!(counts.get(Tile::wild()), 1);
    }

    #[test]
    fn test_supply_check() {
        let board = TileCounts::parse("r1 r1").unwrap();
        let rack = TileCounts::parse("r1").unwrap();
        assert_matches!(
            TileCounts::check_disjoint_supply(&board, &rack),
            Err(SolveError::InvalidStateVector(_))
        );
        let rack = TileCounts::parse("r2 w").unwrap();
        assert!(TileCounts::check_disjoint_supply(&board, &rack).is_ok());
    }

    #[test]
    fn test_contains() {
        let big = TileCounts::parse("r1 r2 r3").unwrap();
        let small = TileCounts::parse("r2").unwrap();
        assert!(big.contains(&small));
        assert!(!small.contains(&big));
    }

    #[test]
    fn test_serde_as_vector() {
        let counts = TileCounts::parse("b13").unwrap();
        let json = serde_json::to_string(&counts).unwrap();
        let back: TileCounts = serde_json::from_str(&json).unwrap();
        assert_eq!(back, counts);
        assert!(serde_json::from_str::<TileCounts>("[1,2,3]").is_err());
    }
}
