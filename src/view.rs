use serde::Serialize;

use crate::resolver::{movable_sources, reachable_destinations};
use crate::state::GameState;
use crate::types::{Point, Side};

/// What the status line should say. The host picks the wording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Status {
    Waiting,
    YourTurn,
    OpponentTurn,
    NoMovesFinishTurn,
    FirstTurnBot,
    FirstTurnPlayer,
    Rolling,
    StepSent,
    FinishingTurn,
    Undoing,
    GivingUp,
    Rejected { message: String },
    GameOver { won: bool, reason: Option<String> },
}

/// One point's checker stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointStack {
    pub point: Point,
    pub count: u8,
    pub owner: Side,
    /// Set once the stack is compressed and the count must be drawn.
    pub overflow_label: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Highlights {
    /// Contract:
    /// - Nothing selected: every movable source.
    /// - Selection: empty; `selected` and `destinations` are set instead.
    pub sources: Vec<Point>,
    pub selected: Option<Point>,
    pub destinations: Vec<Point>,
    /// The player's bearing-off tray is a valid drop target.
    pub tray: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Controls {
    pub can_roll: bool,
    pub can_finish: bool,
    pub can_undo: bool,
}

impl Controls {
    pub fn derive(state: &GameState, player: Side) -> Self {
        let my_turn = state.is_turn_of(player);
        let started = state.has_started_turn();
        Self {
            can_roll: my_turn && !started,
            can_finish: my_turn && started && state.possible_turns.is_empty(),
            can_undo: my_turn && state.can_undo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderFrame {
    pub stacks: Vec<PointStack>,
    pub dice: Vec<u8>,
    pub borne_off_white: u32,
    pub borne_off_black: u32,
    pub highlights: Highlights,
    pub controls: Controls,
    pub status: Status,
    pub turn: i8,
}

pub fn stacks(state: &GameState, compress_after: u8) -> Vec<PointStack> {
    state
        .board
        .playable()
        .iter()
        .enumerate()
        .filter_map(|(idx, &value)| {
            let owner = Side::from_sign(value.signum())?;
            let count = value.unsigned_abs();
            Some(PointStack {
                point: idx as Point,
                count,
                owner,
                overflow_label: (count > compress_after).then_some(count),
            })
        })
        .collect()
}

pub fn highlights(state: &GameState, player: Side, selected: Option<Point>) -> Highlights {
    if !state.is_turn_of(player) || state.possible_turns.is_empty() {
        return Highlights::default();
    }

    let candidates = &state.possible_turns;
    match selected {
        None => Highlights {
            sources: movable_sources(candidates),
            ..Highlights::default()
        },
        Some(from) => {
            let (tray, destinations): (Vec<Point>, Vec<Point>) = reachable_destinations(from, candidates)
                .into_iter()
                .partition(|&to| player.is_bearing_off(to));
            Highlights {
                sources: Vec::new(),
                selected: Some(from),
                destinations,
                tray: !tray.is_empty(),
            }
        }
    }
}

/// The resting status for a state with no transaction in flight.
pub fn idle_status(state: &GameState, player: Side) -> Status {
    if state.turn == 0 {
        Status::Waiting
    } else if Controls::derive(state, player).can_finish {
        Status::NoMovesFinishTurn
    } else if state.is_turn_of(player) {
        Status::YourTurn
    } else {
        Status::OpponentTurn
    }
}
