use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

pub mod catalog;
pub mod engine;
pub mod error;
pub mod model;
pub mod optimizer;
pub mod state;
pub mod sweep;

pub use catalog::{CandidateSet, SetCatalog};
pub use error::{Result, SolveError};
pub use optimizer::{ChosenSet, InitialMeld, PlayOptimizer, Solution, SolveOptions};
pub use state::{BoardState, RackState, TileCounts};

/// Color codes, in the order used for tile encoding and wildcard resolution.
pub mod color {
    pub const RED: u8 = 0;
    pub const BLUE: u8 = 1;
    pub const YELLOW: u8 = 2;
    pub const BLACK: u8 = 3;

    pub const ALL: [u8; 4] = [RED, BLUE, YELLOW, BLACK];
}

/// Number of colored tile types (4 colors x 13 numbers).
pub const COLORED_TILES: usize = 52;
/// Size of the tile alphabet: every colored type plus the wildcard.
pub const ALPHABET_SIZE: usize = COLORED_TILES + 1;
/// Alphabet index of the wildcard.
pub const WILD_INDEX: usize = COLORED_TILES;

/// A tile type in Rummikub represented as a u8.
/// - Bits 0-1: Color (00 = Red, 01 = Blue, 10 = Yellow, 11 = Black)
/// - Bits 2-5: Number (1-13)
/// - All 1s (0xFF): Wild/Joker
///
/// The derived ordering sorts by number first, then color, with the wild last.
/// Candidate sets use it as their canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tile(u8);

impl Tile {
    const COLOR_MASK: u8 = 0b0000_0011;
    const NUMBER_MASK: u8 = 0b0011_1100;
    const NUMBER_SHIFT: u8 = 2;
    const WILD: u8 = 0xFF;

    /// Create a new tile from color (0-3) and number (1-13)
    pub fn new(color: u8, number: u8) -> Self {
        assert!(color < 4, "Color must be 0-3");
        assert!((1..=13).contains(&number), "Number must be 1-13");
        Tile((number << Self::NUMBER_SHIFT) | color)
    }

    /// Create a wild/joker tile
    pub fn wild() -> Self {
        Tile(Self::WILD)
    }

    /// Get the color (0-3), or None for wild
    pub fn color(&self) -> Option<u8> {
        if self.is_wild() {
            None
        } else {
            Some(self.0 & Self::COLOR_MASK)
        }
    }

    /// Get the number (1-13), or None for wild
    pub fn number(&self) -> Option<u8> {
        if self.is_wild() {
            None
        } else {
            Some((self.0 & Self::NUMBER_MASK) >> Self::NUMBER_SHIFT)
        }
    }

    /// Check if this is a wild/joker tile
    pub fn is_wild(&self) -> bool {
        self.0 == Self::WILD
    }

    /// Position of this tile type in the 53-entry alphabet:
    /// `color * 13 + (number - 1)` for colored tiles, 52 for the wild.
    pub fn index(&self) -> usize {
        match (self.color(), self.number()) {
            (Some(color), Some(number)) => color as usize * 13 + (number as usize - 1),
            _ => WILD_INDEX,
        }
    }

    /// Inverse of [`Tile::index`]. Returns None outside the alphabet.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            WILD_INDEX => Some(Tile::wild()),
            i if i < COLORED_TILES => Some(Tile::new((i / 13) as u8, (i % 13) as u8 + 1)),
            _ => None,
        }
    }

    /// Every tile type in alphabet order.
    pub fn alphabet() -> impl Iterator<Item = Tile> {
        (0..ALPHABET_SIZE).filter_map(Tile::from_index)
    }

    /// Parse a tile from a string representation
    /// Format: "r13" (red 13), "b1" (blue 1), "y7" (yellow 7), "k9" (black 9), "w" (wild)
    pub fn from_string(s: &str) -> std::result::Result<Self, String> {
        if s == "w" {
            return Ok(Tile::wild());
        }
        if s.len() < 2 || !s.is_char_boundary(1) {
            return Err(format!("Invalid tile string: {}", s));
        }

        let color = parse_color(&s[0..1])?;
        let number = parse_number(&s[1..])?;

        Ok(Tile::new(color, number))
    }
}

impl fmt::Display for Tile {
    /// "r13" (red 13), "b1" (blue 1), etc., or "w" for wild
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.color(), self.number()) {
            (Some(color), Some(number)) => write!(f, "{}{}", color_char(color), number),
            _ => f.write_str("w"),
        }
    }
}

impl FromStr for Tile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Tile::from_string(s)
    }
}

impl Serialize for Tile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Tile::from_string(&s).map_err(serde::de::Error::custom)
    }
}

fn color_char(color: u8) -> char {
    match color {
        color::RED => 'r',
        color::BLUE => 'b',
        color::YELLOW => 'y',
        _ => 'k',
    }
}

fn parse_color(s: &str) -> std::result::Result<u8, String> {
    match s {
        "r" => Ok(color::RED),
        "b" => Ok(color::BLUE),
        "y" => Ok(color::YELLOW),
        "k" => Ok(color::BLACK),
        _ => Err(format!("Invalid color: {}", s)),
    }
}

fn parse_number(s: &str) -> std::result::Result<u8, String> {
    let number: u8 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(1..=13).contains(&number) {
        return Err(format!("Number must be 1-13, got {}", number));
    }
    Ok(number)
}

/// Type of meld in Rummikub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeldType {
    /// A group: same number, different colors
    Group,
    /// A run: consecutive numbers, same color
    Run,
}

/// A meld laid out on the table, tiles in display order. For runs the
/// position of a wild determines the number it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meld {
    #[serde(rename = "type")]
    pub meld_type: MeldType,
    pub tiles: VecDeque<Tile>,
}

impl Meld {
    /// Create a new meld
    pub fn new(meld_type: MeldType, tiles: VecDeque<Tile>) -> Self {
        Meld { meld_type, tiles }
    }

    /// Parse a meld from a string, auto-detecting type
    /// Formats:
    /// - Group: "5 r b k" (number followed by color letters)
    /// - Run: "y 6 7 8" (color letter followed by numbers)
    pub fn from_string(input: &str) -> std::result::Result<Self, String> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            return Err("Empty meld string".to_string());
        };

        if first.parse::<u8>().is_ok_and(|n| (1..=13).contains(&n)) {
            return Self::from_group_string(input);
        }
        if parse_color(first).is_ok() {
            return Self::from_run_string(input);
        }

        Err(format!(
            "Invalid meld format: '{}'. Use 'N c1 c2 c3' for group or 'C n1 n2 n3' for run",
            input
        ))
    }

    /// Parse a group meld: "5 r b k" (number followed by color letters, "w" for a wild)
    pub fn from_group_string(input: &str) -> std::result::Result<Self, String> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        if tokens.len() < 4 {
            return Err(format!(
                "Group must have at least 4 tokens (number + 3 colors), got: {}",
                tokens.len()
            ));
        }

        let number = parse_number(tokens[0])?;
        let tiles = tokens[1..]
            .iter()
            .map(|token| match *token {
                "w" => Ok(Tile::wild()),
                c => parse_color(c).map(|color| Tile::new(color, number)),
            })
            .collect::<std::result::Result<VecDeque<_>, _>>()?;

        let meld = Meld::new(MeldType::Group, tiles);
        meld.check()?;
        Ok(meld)
    }

    /// Parse a run meld: "y 6 7 8" (color letter followed by numbers, "w" for a wild)
    pub fn from_run_string(input: &str) -> std::result::Result<Self, String> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        if tokens.len() < 4 {
            return Err(format!(
                "Run must have at least 4 tokens (color + 3 numbers), got: {}",
                tokens.len()
            ));
        }

        if tokens[0] == "w" {
            return Err("Wildcard cannot be the starting color of a run".to_string());
        }
        let color = parse_color(tokens[0])?;
        let tiles = tokens[1..]
            .iter()
            .map(|token| match *token {
                "w" => Ok(Tile::wild()),
                n => parse_number(n).map(|number| Tile::new(color, number)),
            })
            .collect::<std::result::Result<VecDeque<_>, _>>()?;

        let meld = Meld::new(MeldType::Run, tiles);
        meld.check()?;
        Ok(meld)
    }

    /// Whether the tiles, in their current order, form a legal meld of the
    /// declared type.
    pub fn is_valid(&self) -> bool {
        self.check().is_ok()
    }

    /// Like [`Meld::is_valid`] but explains the first violation found.
    pub fn check(&self) -> std::result::Result<(), String> {
        let len = self.tiles.len();
        match self.meld_type {
            MeldType::Run => {
                if !(3..=13).contains(&len) {
                    return Err(format!("Run must have 3-13 tiles, got {}", len));
                }
                let mut color = None;
                let mut start = None;
                for (i, tile) in self.tiles.iter().enumerate() {
                    let (Some(c), Some(n)) = (tile.color(), tile.number()) else {
                        continue;
                    };
                    if *color.get_or_insert(c) != c {
                        return Err("Run tiles must share one color".to_string());
                    }
                    let s = n as i32 - i as i32;
                    if *start.get_or_insert(s) != s {
                        return Err(format!("Run is not consecutive at {}", tile));
                    }
                }
                let Some(start) = start else {
                    return Err("Run needs at least one numbered tile".to_string());
                };
                if start < 1 || start + len as i32 - 1 > 13 {
                    return Err("Run extends beyond 1-13".to_string());
                }
                Ok(())
            }
            MeldType::Group => {
                if !(3..=4).contains(&len) {
                    return Err(format!("Group must have 3-4 tiles, got {}", len));
                }
                check_group(self.tiles.iter().copied())
            }
        }
    }

    /// Sum of tile numbers; a wild counts as the tile it stands for.
    pub fn points(&self) -> u32 {
        match self.meld_type {
            MeldType::Group => {
                let number = self.tiles.iter().find_map(|t| t.number()).unwrap_or(0);
                number as u32 * self.tiles.len() as u32
            }
            MeldType::Run => {
                let start = self
                    .tiles
                    .iter()
                    .enumerate()
                    .find_map(|(i, t)| t.number().map(|n| n as i32 - i as i32))
                    .unwrap_or(0);
                (0..self.tiles.len() as i32).map(|i| (start + i).max(0) as u32).sum()
            }
        }
    }
}

impl fmt::Display for Meld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tiles: Vec<String> = self.tiles.iter().map(Tile::to_string).collect();
        match self.meld_type {
            MeldType::Group => write!(f, "group[{}]", tiles.join(" ")),
            MeldType::Run => write!(f, "run[{}]", tiles.join(" ")),
        }
    }
}

fn check_group(tiles: impl Iterator<Item = Tile>) -> std::result::Result<(), String> {
    let mut number = None;
    let mut seen = [false; 4];
    let mut real = 0;
    for tile in tiles {
        let (Some(c), Some(n)) = (tile.color(), tile.number()) else {
            continue;
        };
        if *number.get_or_insert(n) != n {
            return Err("Group tiles must share one number".to_string());
        }
        if std::mem::replace(&mut seen[c as usize], true) {
            return Err(format!("Group repeats color of {}", tile));
        }
        real += 1;
    }
    if real == 0 {
        return Err("Group needs at least one numbered tile".to_string());
    }
    Ok(())
}

/// Decide whether an unordered tile multiset can be laid out as a legal meld.
/// Runs are preferred when both readings work (one real tile plus wilds).
pub fn classify(tiles: &[Tile]) -> Option<MeldType> {
    let len = tiles.len();
    if len < 3 {
        return None;
    }

    let mut real: Vec<Tile> = tiles.iter().copied().filter(|t| !t.is_wild()).collect();
    real.sort();
    let wilds = len - real.len();
    let (first, last) = (real.first()?, real.last()?);

    let same_color = real.iter().all(|t| t.color() == first.color());
    let distinct = real.windows(2).all(|w| w[0].number() != w[1].number());
    if len <= 13 && same_color && distinct {
        let span = (last.number()? - first.number()? + 1) as usize;
        if span - real.len() <= wilds && span <= len {
            return Some(MeldType::Run);
        }
    }

    if len <= 4 && check_group(tiles.iter().copied()).is_ok() {
        return Some(MeldType::Group);
    }
    None
}
