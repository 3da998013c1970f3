use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::BoardError;
use crate::types::{Side, Step, TurnCandidate};

/// Client-side mirror of the oracle's game state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GameState {
    pub board: Board,
    pub dice: Vec<u8>,
    pub possible_turns: Vec<TurnCandidate>,
    /// `1` White, `-1` Black, `0` before the first turn is decided.
    pub turn: i8,
    pub borne_off_white: u32,
    pub borne_off_black: u32,
    pub can_undo: bool,
}

/// A full or partial update from the oracle. Absent fields leave the
/// canonical value untouched; present ones overwrite it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatePatch {
    pub board_state: Option<Board>,
    pub dice: Option<Vec<u8>>,
    pub remaining_dice: Option<Vec<u8>>,
    pub possible_turns: Option<Vec<TurnCandidate>>,
    pub turn: Option<i8>,
    pub borne_off_white: Option<u32>,
    pub borne_off_black: Option<u32>,
    pub can_undo: Option<bool>,
    pub applied_move: Option<Step>,
    pub was_blot: Option<bool>,
    pub is_opponent_move: Option<bool>,
}

impl StatePatch {
    /// `remaining_dice`, when sent, is the authoritative dice list.
    pub fn normalized(mut self) -> Self {
        if let Some(remaining) = self.remaining_dice.take() {
            self.dice = Some(remaining);
        }
        self
    }

    /// Fills in `dice` with `fallback` when the oracle sent no dice data at all.
    pub fn with_inferred_dice(mut self, current: &[u8], fallback: DiceFallback) -> Self {
        self = self.normalized();
        if self.dice.is_none() {
            self.dice = fallback(current);
        }
        self
    }

    pub fn has_dice(&self) -> bool {
        self.dice.is_some() || self.remaining_dice.is_some()
    }
}

/// Guesses the dice left after a step event that carried no dice data.
/// `None` keeps the current dice.
pub type DiceFallback = fn(&[u8]) -> Option<Vec<u8>>;

/// Assumes exactly one die was spent and that it is the first one.
///
/// This breaks if the oracle ever reports several die consumptions in one
/// event; swap the policy once the oracle always sends `remaining_dice`.
pub fn consume_front_die(current: &[u8]) -> Option<Vec<u8>> {
    current.split_first().map(|(_, rest)| rest.to_vec())
}

impl GameState {
    /// Field-wise overwrite of `self` by `patch`.
    pub fn merge(&self, patch: &StatePatch) -> GameState {
        let patch_dice = patch.remaining_dice.as_ref().or(patch.dice.as_ref());
        GameState {
            board: patch.board_state.clone().unwrap_or_else(|| self.board.clone()),
            dice: patch_dice.cloned().unwrap_or_else(|| self.dice.clone()),
            possible_turns: patch
                .possible_turns
                .clone()
                .unwrap_or_else(|| self.possible_turns.clone()),
            turn: patch.turn.unwrap_or(self.turn),
            borne_off_white: patch.borne_off_white.unwrap_or(self.borne_off_white),
            borne_off_black: patch.borne_off_black.unwrap_or(self.borne_off_black),
            can_undo: patch.can_undo.unwrap_or(self.can_undo),
        }
    }

    /// A full snapshot replaces everything, so it merges onto an empty state.
    pub fn from_snapshot(patch: &StatePatch) -> GameState {
        GameState::default().merge(patch)
    }

    /// Applies a step that arrived without a board, for `side`.
    /// Returns the new state and whether a blot was hit.
    pub fn with_local_step(&self, step: Step, side: Side) -> Result<(GameState, bool), BoardError> {
        let mut next = self.clone();
        let borne_off = match side {
            Side::White => &mut next.borne_off_white,
            Side::Black => &mut next.borne_off_black,
        };
        let was_blot = next.board.apply_step(step, side, borne_off)?;
        Ok((next, was_blot))
    }

    /// State after a `turn_finished` event; the oracle does not resend the board.
    pub fn after_turn_finished(&self, player: Side) -> GameState {
        let turn = if self.turn != player.sign() {
            player.sign()
        } else {
            player.opponent().sign()
        };
        GameState {
            board: self.board.clone(),
            dice: Vec::new(),
            possible_turns: Vec::new(),
            turn,
            borne_off_white: self.borne_off_white,
            borne_off_black: self.borne_off_black,
            can_undo: false,
        }
    }

    pub fn is_turn_of(&self, side: Side) -> bool {
        self.turn == side.sign()
    }

    pub fn has_rolled(&self) -> bool {
        !self.dice.is_empty()
    }

    pub fn has_started_turn(&self) -> bool {
        self.has_rolled() || self.can_undo
    }

    pub fn borne_off(&self, side: Side) -> u32 {
        match side {
            Side::White => self.borne_off_white,
            Side::Black => self.borne_off_black,
        }
    }

    /// Board plus borne-off checkers of one side.
    pub fn checker_total(&self, side: Side) -> u32 {
        self.board.checkers_of(side) + self.borne_off(side)
    }
}
