use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BoardError;
use crate::types::{BOARD_SLOTS, PLAYABLE_SLOTS, Point, Side, Step};

/// Board state as the oracle sends it: one signed count per slot,
/// positive for White, negative for Black.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<i8>", into = "Vec<i8>")]
pub struct Board {
    slots: Vec<i8>,
}

impl Board {
    /// An empty 28-slot board.
    pub fn new() -> Self {
        Self {
            slots: vec![0; BOARD_SLOTS],
        }
    }

    /// Builds a board from `initial_setup` maps of point -> checker count.
    pub fn from_setup(
        white_setup: &BTreeMap<Point, u8>,
        black_setup: &BTreeMap<Point, u8>,
    ) -> Result<Self, BoardError> {
        let mut board = Self::new();
        for (&point, &count) in white_setup {
            *board.slot_mut(point)? = setup_count(point, count)?;
        }
        for (&point, &count) in black_setup {
            *board.slot_mut(point)? = -setup_count(point, count)?;
        }
        Ok(board)
    }

    pub fn from_slots(mut slots: Vec<i8>) -> Self {
        slots.resize(BOARD_SLOTS, 0);
        Self { slots }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|&v| v == 0)
    }

    /// Signed value at `point`, `0` for anything off the playable range.
    pub fn get(&self, point: Point) -> i8 {
        usize::try_from(point)
            .ok()
            .filter(|&idx| idx < PLAYABLE_SLOTS)
            .map_or(0, |idx| self.slots[idx])
    }

    /// Playable slots `0..=25` in index order.
    pub fn playable(&self) -> &[i8] {
        &self.slots[..PLAYABLE_SLOTS]
    }

    pub fn as_slots(&self) -> &[i8] {
        &self.slots
    }

    /// On-board plus bar checkers of one side.
    pub fn checkers_of(&self, side: Side) -> u32 {
        self.playable()
            .iter()
            .filter(|&&v| side.owns(v))
            .map(|&v| v.unsigned_abs() as u32)
            .sum()
    }

    /// Applies one step for `side`, sending a hit blot to its owner's bar and
    /// counting a bear-off into `borne_off`. Returns whether a blot was hit.
    /// The board is left untouched on error.
    pub fn apply_step(
        &mut self,
        step: Step,
        side: Side,
        borne_off: &mut u32,
    ) -> Result<bool, BoardError> {
        let source = self.get_checked(step.from)?;
        if !side.owns(source) {
            return Err(BoardError::NoChecker {
                point: step.from,
                side,
            });
        }

        if side.is_bearing_off(step.to) {
            *self.slot_mut(step.from)? -= side.sign();
            *borne_off += 1;
            return Ok(false);
        }

        let target = self.get_checked(step.to)?;
        let opponent = side.opponent();
        let was_blot = match target.unsigned_abs() {
            _ if !opponent.owns(target) => false,
            1 => true,
            _ => return Err(BoardError::Blocked(step.to)),
        };

        *self.slot_mut(step.from)? -= side.sign();
        if was_blot {
            *self.slot_mut(step.to)? = 0;
            *self.slot_mut(opponent.bar())? += opponent.sign();
        }
        *self.slot_mut(step.to)? += side.sign();

        Ok(was_blot)
    }

    fn get_checked(&self, point: Point) -> Result<i8, BoardError> {
        let idx = playable_index(point)?;
        Ok(self.slots[idx])
    }

    fn slot_mut(&mut self, point: Point) -> Result<&mut i8, BoardError> {
        let idx = playable_index(point)?;
        Ok(&mut self.slots[idx])
    }
}

impl From<Vec<i8>> for Board {
    fn from(slots: Vec<i8>) -> Self {
        Self::from_slots(slots)
    }
}

impl From<Board> for Vec<i8> {
    fn from(board: Board) -> Self {
        board.slots
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

fn setup_count(point: Point, count: u8) -> Result<i8, BoardError> {
    i8::try_from(count).map_err(|_| BoardError::CountOutOfRange { point, count })
}

fn playable_index(point: Point) -> Result<usize, BoardError> {
    usize::try_from(point)
        .ok()
        .filter(|&idx| idx < PLAYABLE_SLOTS)
        .ok_or(BoardError::OutOfRange(point))
}
