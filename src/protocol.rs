//! Message shapes exchanged with the rules oracle.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EngineError;
use crate::state::StatePatch;
use crate::types::{Point, Side, Step};

/// The oracle sometimes wraps a payload in a one-element array.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrFirst<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrFirst<T> {
    fn into_first(self) -> Option<T> {
        match self {
            OneOrFirst::Many(items) => items.into_iter().next(),
            OneOrFirst::One(item) => Some(item),
        }
    }
}

fn payload<'de, T, D>(data: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    let wrapped = Option::<OneOrFirst<T>>::deserialize(data)?;
    Ok(wrapped.and_then(OneOrFirst::into_first))
}

fn required<'de, T, D>(data: D) -> Result<T, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    payload(data)?.ok_or_else(|| serde::de::Error::custom("missing event payload"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OpponentData {
    pub username: Option<String>,
}

/// Starting position. Both setups absent means only opponent info changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InitialSetup {
    pub white_setup: Option<BTreeMap<String, u8>>,
    pub black_setup: Option<BTreeMap<String, u8>>,
    pub opponent_data: Option<OpponentData>,
}

impl InitialSetup {
    pub fn has_position(&self) -> bool {
        self.white_setup.is_some() || self.black_setup.is_some()
    }

    pub fn white_points(&self) -> Result<BTreeMap<Point, u8>, EngineError> {
        parse_setup(self.white_setup.as_ref())
    }

    pub fn black_points(&self) -> Result<BTreeMap<Point, u8>, EngineError> {
        parse_setup(self.black_setup.as_ref())
    }
}

fn parse_setup(setup: Option<&BTreeMap<String, u8>>) -> Result<BTreeMap<Point, u8>, EngineError> {
    let Some(setup) = setup else {
        return Ok(BTreeMap::new());
    };
    setup
        .iter()
        .map(|(point, &count)| {
            point
                .trim()
                .parse::<Point>()
                .map(|p| (p, count))
                .map_err(|e| EngineError::Decode {
                    what: "initial_setup point",
                    reason: format!("{point:?}: {e}"),
                })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirstTurn {
    Bot,
    Player,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InitialRoll {
    pub first_turn: Option<FirstTurn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BotDice {
    pub dice: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Rejection {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GameOverNotice {
    pub winner: i8,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameCreated {
    pub game_id: String,
}

/// Events pushed by the oracle, keyed by their wire event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Connected,
    Disconnected,
    AuthFailed,
    ProfileDataUpdate,
    SyncCompleteNoGame,
    GameCreated(GameCreated),
    InitialSetup(InitialSetup),
    FullGameSync(StatePatch),
    InitialRollResult(InitialRoll),
    DiceRollResult(Option<StatePatch>),
    BotDiceRollResult(BotDice),
    MoveRejection(Rejection),
    StepAccepted(Option<StatePatch>),
    OpponentStepExecuted(Option<StatePatch>),
    UndoAccepted(Option<StatePatch>),
    TurnFinished,
    GameOver(GameOverNotice),
    OpponentTimeoutVictory,
}

impl ServerEvent {
    /// Decodes the payload `data` of the event called `name`.
    /// Unknown event names decode to `None`.
    pub fn decode<'de, D>(name: &str, data: D) -> Result<Option<ServerEvent>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let event = match name {
            "connect" => ServerEvent::Connected,
            "disconnect" => ServerEvent::Disconnected,
            "auth_failed" => ServerEvent::AuthFailed,
            "profile_data_update" => ServerEvent::ProfileDataUpdate,
            "sync_complete_no_game" => ServerEvent::SyncCompleteNoGame,
            "game_created" => ServerEvent::GameCreated(required(data)?),
            "initial_setup" => ServerEvent::InitialSetup(required(data)?),
            "full_game_sync" => ServerEvent::FullGameSync(required(data)?),
            "initial_roll_result" => ServerEvent::InitialRollResult(payload(data)?.unwrap_or_default()),
            "dice_roll_result" => ServerEvent::DiceRollResult(payload(data)?),
            "bot_dice_roll_result" => ServerEvent::BotDiceRollResult(payload(data)?.unwrap_or_default()),
            "move_rejection" => ServerEvent::MoveRejection(payload(data)?.unwrap_or_default()),
            "step_accepted" => ServerEvent::StepAccepted(payload(data)?),
            "on_opponent_step_executed" => ServerEvent::OpponentStepExecuted(payload(data)?),
            "undo_accepted" => ServerEvent::UndoAccepted(payload(data)?),
            "turn_finished" => ServerEvent::TurnFinished,
            "game_over" => ServerEvent::GameOver(payload(data)?.unwrap_or_default()),
            "opponent_timeout_victory" => ServerEvent::OpponentTimeoutVictory,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Requests sent to the oracle. Serialized as `{"event": name, "data": payload}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    RequestPlayerRoll,
    SendPlayerStep { step: Step },
    SendTurnFinished,
    RequestUndo,
    RequestFullGameSync,
    PlayerGiveUp,
    ClientReadyForRoll { game_id: String },
    ClientReadyForSync,
    StartPve { bot_level: String, player_sign: Side },
}

impl ClientCommand {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientCommand::RequestPlayerRoll => "request_player_roll",
            ClientCommand::SendPlayerStep { .. } => "send_player_step",
            ClientCommand::SendTurnFinished => "send_turn_finished",
            ClientCommand::RequestUndo => "request_undo",
            ClientCommand::RequestFullGameSync => "request_full_game_sync",
            ClientCommand::PlayerGiveUp => "player_give_up",
            ClientCommand::ClientReadyForRoll { .. } => "client_ready_for_roll",
            ClientCommand::ClientReadyForSync => "client_ready_for_sync",
            ClientCommand::StartPve { .. } => "start_pve",
        }
    }
}
