use wasm_bindgen::prelude::*;

pub mod board;
pub mod config;
pub mod error;
pub mod game;
pub mod lock;
pub mod logging;
pub mod protocol;
pub mod queue;
pub mod resolver;
pub mod state;
pub mod types;
pub mod view;
pub mod wasm;

pub use config::EngineConfig;
pub use error::EngineError;
pub use game::{Effect, Phase, TurnEngine};
pub use types::{Point, Side, Step, TurnCandidate};

#[wasm_bindgen]
pub fn wasm_ready() -> bool {
    true
}
