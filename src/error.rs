use thiserror::Error;

use crate::types::{Point, Side};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("point {0} is outside the board")]
    OutOfRange(Point),
    #[error("no {side:?} checker on point {point}")]
    NoChecker { point: Point, side: Side },
    #[error("point {0} is blocked by the opponent")]
    Blocked(Point),
    #[error("setup count {count} on point {point} does not fit a board slot")]
    CountOutOfRange { point: Point, count: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue is filled once per gesture; a second fill must wait for a drain or a clear.
    #[error("move queue already holds {pending} pending step(s)")]
    Busy { pending: usize },
    #[error("cannot enqueue an empty step sequence")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failsafe timeout must be greater than zero")]
    ZeroTimeout,
    #[error("fatal rejection message for `{0}` must not be empty")]
    EmptyFatalMessage(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },
}
