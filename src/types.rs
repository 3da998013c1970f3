use serde::{Deserialize, Deserializer, Serialize, de};

/// A point index as used by the oracle.
///
/// `0` is White's bar, `25` is Black's bar, `1..=24` are board points.
/// Bearing-off destinations lie outside that range (see [`Side::is_bearing_off`]).
pub type Point = i32;

pub const WHITE_BAR: Point = 0;
pub const BLACK_BAR: Point = 25;
pub const BOARD_SLOTS: usize = 28;
/// Slots `0..=25` may hold checkers; `26` and `27` are reserved.
pub const PLAYABLE_SLOTS: usize = 26;
pub const CHECKERS_PER_SIDE: u32 = 15;

/// One atomic checker movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Step {
    #[serde(deserialize_with = "point_from_wire")]
    pub from: Point,
    #[serde(deserialize_with = "point_from_wire")]
    pub to: Point,
}

/// The oracle sends point indices either as numbers or as numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum WirePoint {
    Number(Point),
    Text(String),
}

fn point_from_wire<'de, D>(deserializer: D) -> Result<Point, D::Error>
where
    D: Deserializer<'de>,
{
    match WirePoint::deserialize(deserializer)? {
        WirePoint::Number(point) => Ok(point),
        WirePoint::Text(text) => text
            .trim()
            .parse()
            .map_err(|e| de::Error::custom(format!("invalid point index {text:?}: {e}"))),
    }
}

impl Step {
    pub const fn new(from: Point, to: Point) -> Self {
        Self { from, to }
    }
}

/// One complete legal way to spend the current roll.
pub type TurnCandidate = Vec<Step>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub const fn sign(self) -> i8 {
        match self {
            Side::White => 1,
            Side::Black => -1,
        }
    }

    pub const fn from_sign(sign: i8) -> Option<Self> {
        match sign {
            1 => Some(Side::White),
            -1 => Some(Side::Black),
            _ => None,
        }
    }

    pub const fn opponent(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub const fn bar(self) -> Point {
        match self {
            Side::White => WHITE_BAR,
            Side::Black => BLACK_BAR,
        }
    }

    /// White bears off past 24 (25 is Black's bar), Black below 1 (0 is White's bar).
    pub const fn is_bearing_off(self, point: Point) -> bool {
        match self {
            Side::White => point > 24 && point != BLACK_BAR,
            Side::Black => point < 1 && point != WHITE_BAR,
        }
    }

    /// Whether a signed board value belongs to this side.
    pub const fn owns(self, value: i8) -> bool {
        match self {
            Side::White => value > 0,
            Side::Black => value < 0,
        }
    }
}

impl TryFrom<i8> for Side {
    type Error = String;

    fn try_from(sign: i8) -> Result<Self, Self::Error> {
        Side::from_sign(sign).ok_or_else(|| format!("invalid side sign: {sign}"))
    }
}

impl From<Side> for i8 {
    fn from(side: Side) -> Self {
        side.sign()
    }
}
