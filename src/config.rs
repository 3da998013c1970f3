use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::lock::DEFAULT_FAILSAFE_TIMEOUT;
use crate::types::Side;

pub const DEFAULT_STACK_COMPRESS_AFTER: u8 = 5;

/// Server messages that mean the client's turn state is wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatalRejections {
    /// Sent when the player already spent the roll and must finish the turn.
    pub already_moved: String,
    pub already_rolled: String,
}

impl Default for FatalRejections {
    fn default() -> Self {
        Self {
            already_moved: "Вы уже ходили, завершите ход.".to_string(),
            already_rolled: "Кубики уже брошены.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub player_sign: Side,
    pub failsafe_timeout_ms: u64,
    pub fatal_rejections: FatalRejections,
    /// Stacks taller than this get an overflow count label.
    pub stack_compress_after: u8,
    pub bot_level: String,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failsafe_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.fatal_rejections.already_moved.is_empty() {
            return Err(ConfigError::EmptyFatalMessage("already_moved"));
        }
        if self.fatal_rejections.already_rolled.is_empty() {
            return Err(ConfigError::EmptyFatalMessage("already_rolled"));
        }
        Ok(())
    }

    pub fn failsafe_timeout(&self) -> Duration {
        Duration::from_millis(self.failsafe_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            player_sign: Side::White,
            failsafe_timeout_ms: DEFAULT_FAILSAFE_TIMEOUT.as_millis() as u64,
            fatal_rejections: FatalRejections::default(),
            stack_compress_after: DEFAULT_STACK_COMPRESS_AFTER,
            bot_level: "easy".to_string(),
        }
    }
}
