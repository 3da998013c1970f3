use log::{debug, info, warn};
use serde::Serialize;
use web_time::Instant;

use crate::board::Board;
use crate::config::{EngineConfig, FatalRejections};
use crate::error::{ConfigError, EngineError};
use crate::lock::{AnimationLock, LockCheck};
use crate::protocol::{ClientCommand, FirstTurn, InitialSetup, ServerEvent};
use crate::queue::ClientMoveQueue;
use crate::resolver::{bearing_off_target, is_movable_source, resolve};
use crate::state::{DiceFallback, GameState, StatePatch, consume_front_die};
use crate::types::{Point, Side, Step};
use crate::view::{self, Controls, Highlights, RenderFrame, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingServer,
    AnimatingLocal,
    /// A full sync has been requested and not yet answered.
    Desynced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The roll is spent; only finishing the turn is left.
    AlreadyMoved,
    AlreadyRolled,
    Other,
}

impl RejectionKind {
    pub fn is_fatal(self) -> bool {
        !matches!(self, RejectionKind::Other)
    }
}

/// Maps a rejection message to its meaning.
pub trait RejectionClassifier {
    fn classify(&self, message: &str) -> RejectionKind;
}

/// Exact match against the configured fatal messages.
#[derive(Debug, Clone)]
pub struct FatalMessageSet {
    messages: FatalRejections,
}

impl FatalMessageSet {
    pub fn new(messages: FatalRejections) -> Self {
        Self { messages }
    }
}

impl RejectionClassifier for FatalMessageSet {
    fn classify(&self, message: &str) -> RejectionKind {
        if message == self.messages.already_moved {
            RejectionKind::AlreadyMoved
        } else if message == self.messages.already_rolled {
            RejectionKind::AlreadyRolled
        } else {
            RejectionKind::Other
        }
    }
}

/// Work the host must carry out on the engine's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Effect {
    Send(ClientCommand),
    /// Call [`TurnEngine::animation_complete`] when done.
    AnimateMove { step: Step, was_blot: bool, side: Side },
    /// Call [`TurnEngine::animation_complete`] when done.
    AnimateDice { dice: Vec<u8> },
    Render(RenderFrame),
    OpponentInfo { username: String },
    GameOver { won: bool, reason: Option<String> },
    ShowLobby,
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Animation {
    Move(Step),
    Dice,
}

/// Client turn engine: owns the canonical state and reconciles local
/// progress with the oracle's answers.
pub struct TurnEngine {
    config: EngineConfig,
    player: Side,
    state: GameState,
    queue: ClientMoveQueue,
    lock: AnimationLock,
    phase: Phase,
    animation: Option<Animation>,
    selected: Option<Point>,
    game_id: Option<String>,
    in_game: bool,
    status: Status,
    effects: Vec<Effect>,
    classifier: Box<dyn RejectionClassifier>,
    dice_fallback: DiceFallback,
}

impl TurnEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let classifier = FatalMessageSet::new(config.fatal_rejections.clone());
        Self::with_classifier(config, Box::new(classifier))
    }

    pub fn with_classifier(
        config: EngineConfig,
        classifier: Box<dyn RejectionClassifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            player: config.player_sign,
            lock: AnimationLock::new(config.failsafe_timeout()),
            config,
            state: GameState::default(),
            queue: ClientMoveQueue::new(),
            phase: Phase::Idle,
            animation: None,
            selected: None,
            game_id: None,
            in_game: false,
            status: Status::Waiting,
            effects: Vec::new(),
            classifier,
            dice_fallback: consume_front_die,
        })
    }

    /// Replaces the policy used when a step event carries no dice data.
    pub fn with_dice_fallback(mut self, fallback: DiceFallback) -> Self {
        self.dice_fallback = fallback;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn queue(&self) -> &ClientMoveQueue {
        &self.queue
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    pub fn selected(&self) -> Option<Point> {
        self.selected
    }

    pub fn player(&self) -> Side {
        self.player
    }

    pub fn in_game(&self) -> bool {
        self.in_game
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// The frame the host should currently display.
    pub fn frame(&self) -> RenderFrame {
        let settled = matches!(self.phase, Phase::Idle | Phase::Desynced);
        RenderFrame {
            stacks: view::stacks(&self.state, self.config.stack_compress_after),
            dice: self.state.dice.clone(),
            borne_off_white: self.state.borne_off_white,
            borne_off_black: self.state.borne_off_black,
            highlights: if settled {
                view::highlights(&self.state, self.player, self.selected)
            } else {
                Highlights::default()
            },
            controls: if self.lock.is_held() {
                Controls::default()
            } else {
                Controls::derive(&self.state, self.player)
            },
            status: self.status.clone(),
            turn: self.state.turn,
        }
    }

    // ---- gestures -------------------------------------------------------

    pub fn point_click(&mut self, point: Point, now: Instant) {
        if !self.accepts_gesture(now) {
            return;
        }
        if !self.state.has_started_turn() {
            debug!("click at {point} before rolling, rolling dice");
            self.begin(ClientCommand::RequestPlayerRoll, Status::Rolling, now);
            return;
        }

        match self.selected {
            None => {
                if is_movable_source(point, &self.state.possible_turns) {
                    self.selected = Some(point);
                    self.render();
                }
            }
            Some(from) if from == point => {
                self.selected = None;
                self.render();
            }
            Some(from) => {
                if !self.submit(from, point, now) {
                    self.selected = is_movable_source(point, &self.state.possible_turns)
                        .then_some(point);
                    self.render();
                }
            }
        }
    }

    pub fn tray_click(&mut self, tray: Side, now: Instant) {
        if !self.accepts_gesture(now) || tray != self.player {
            return;
        }
        let Some(from) = self.selected else {
            return;
        };
        if !self.submit_bearing_off(from, now) {
            self.selected = None;
            self.render();
        }
    }

    pub fn drag_start(&mut self, point: Point, now: Instant) {
        if !self.accepts_gesture(now) {
            return;
        }
        if is_movable_source(point, &self.state.possible_turns) {
            self.selected = Some(point);
            self.render();
        }
    }

    pub fn drop_on_point(&mut self, point: Point, now: Instant) {
        if !self.accepts_gesture(now) {
            return;
        }
        if let Some(from) = self.selected.take() {
            if !self.submit(from, point, now) {
                self.render();
            }
        }
    }

    pub fn drop_on_tray(&mut self, tray: Side, now: Instant) {
        if !self.accepts_gesture(now) {
            return;
        }
        let Some(from) = self.selected.take() else {
            return;
        };
        if tray != self.player || !self.submit_bearing_off(from, now) {
            self.render();
        }
    }

    pub fn drag_cancel(&mut self) {
        if self.selected.take().is_some() {
            self.render();
        }
    }

    // ---- requests -------------------------------------------------------

    pub fn request_roll(&mut self, now: Instant) {
        if self.accepts_input(now) && Controls::derive(&self.state, self.player).can_roll {
            self.begin(ClientCommand::RequestPlayerRoll, Status::Rolling, now);
        }
    }

    pub fn finish_turn(&mut self, now: Instant) {
        if self.accepts_input(now) && Controls::derive(&self.state, self.player).can_finish {
            self.begin(ClientCommand::SendTurnFinished, Status::FinishingTurn, now);
        }
    }

    pub fn request_undo(&mut self, now: Instant) {
        if self.accepts_input(now) && Controls::derive(&self.state, self.player).can_undo {
            self.begin(ClientCommand::RequestUndo, Status::Undoing, now);
        }
    }

    /// Forfeit. Never blocked by the lock, so a stuck client can always leave.
    pub fn leave(&mut self, now: Instant) {
        if !self.in_game {
            info!("leave requested outside a game, returning to lobby");
            self.teardown();
            self.effects.push(Effect::ShowLobby);
            return;
        }
        self.selected = None;
        self.begin(ClientCommand::PlayerGiveUp, Status::GivingUp, now);
    }

    pub fn start_pve(&mut self) {
        if self.in_game {
            warn!("start_pve ignored, already in a game");
            return;
        }
        self.send(ClientCommand::StartPve {
            bot_level: self.config.bot_level.clone(),
            player_sign: self.player,
        });
    }

    /// Periodic failsafe check for hosts that run a timer.
    /// Returns `true` if a stuck transaction was recovered.
    pub fn tick(&mut self, now: Instant) -> bool {
        if let LockCheck::Expired(age) = self.lock.check(now) {
            warn!("failsafe: lock held for {age:?}, forcing full sync");
            self.desync();
            return true;
        }
        false
    }

    /// The host finished the animation it was asked to play.
    pub fn animation_complete(&mut self, now: Instant) {
        let Some(animation) = self.animation.take() else {
            debug!("animation_complete with nothing pending");
            return;
        };
        debug!("animation finished: {animation:?}");

        if self.queue.has_pending() {
            self.render();
            self.lock.acquire(now);
            self.send_next_step();
        } else {
            self.settle();
        }
    }

    // ---- oracle events --------------------------------------------------

    pub fn handle_event(&mut self, event: ServerEvent, now: Instant) {
        debug!("<< {event:?}");
        match event {
            ServerEvent::Connected => info!("connected to oracle"),
            ServerEvent::Disconnected | ServerEvent::AuthFailed => {
                info!("session ended, tearing down local state");
                self.teardown();
                self.effects.push(Effect::LoggedOut);
            }
            ServerEvent::ProfileDataUpdate => self.send(ClientCommand::ClientReadyForSync),
            ServerEvent::SyncCompleteNoGame => self.effects.push(Effect::ShowLobby),
            ServerEvent::GameCreated(created) => self.game_id = Some(created.game_id),
            ServerEvent::InitialSetup(setup) => self.on_initial_setup(setup),
            ServerEvent::FullGameSync(patch) => self.on_full_sync(patch),
            ServerEvent::InitialRollResult(roll) => {
                let (turn, status) = match roll.first_turn {
                    Some(FirstTurn::Bot) => (self.player.opponent().sign(), Status::FirstTurnBot),
                    Some(FirstTurn::Player) => (self.player.sign(), Status::FirstTurnPlayer),
                    None => (0, Status::Waiting),
                };
                self.state = self.state.merge(&StatePatch {
                    turn: Some(turn),
                    can_undo: Some(false),
                    ..StatePatch::default()
                });
                self.status = status;
                self.render();
            }
            ServerEvent::DiceRollResult(patch) => match patch {
                Some(patch) if patch.has_dice() => {
                    let patch = StatePatch {
                        can_undo: Some(false),
                        ..patch.normalized()
                    };
                    self.on_dice(patch, now);
                }
                _ => debug!("dice_roll_result without dice ignored"),
            },
            ServerEvent::BotDiceRollResult(bot) if !bot.dice.is_empty() => {
                let patch = StatePatch {
                    dice: Some(bot.dice),
                    can_undo: Some(false),
                    turn: Some(self.player.opponent().sign()),
                    ..StatePatch::default()
                };
                self.on_dice(patch, now);
            }
            ServerEvent::BotDiceRollResult(_) => debug!("bot_dice_roll_result without dice ignored"),
            ServerEvent::MoveRejection(rejection) => self.on_rejection(rejection.message),
            ServerEvent::StepAccepted(patch) => self.on_step_accepted(patch, now),
            ServerEvent::OpponentStepExecuted(patch) => self.on_opponent_step(patch, now),
            ServerEvent::UndoAccepted(Some(patch)) => {
                self.state = self.state.merge(&patch.normalized());
                self.queue.clear();
                self.selected = None;
                self.settle();
            }
            ServerEvent::UndoAccepted(None) => {
                warn!("undo_accepted without state, requesting full sync");
                self.desync();
            }
            ServerEvent::TurnFinished => {
                self.state = self.state.after_turn_finished(self.player);
                self.queue.clear();
                self.selected = None;
                self.settle();
            }
            ServerEvent::GameOver(notice) => {
                self.finish_game(notice.winner == self.player.sign(), notice.reason)
            }
            ServerEvent::OpponentTimeoutVictory => self.finish_game(true, Some("timeout".to_string())),
        }
    }

    fn on_initial_setup(&mut self, setup: InitialSetup) {
        if let Some(username) = setup.opponent_data.as_ref().and_then(|o| o.username.clone()) {
            self.effects.push(Effect::OpponentInfo { username });
        }
        if !setup.has_position() {
            return;
        }

        let board = match build_board(&setup) {
            Ok(board) => board,
            Err(e) => {
                warn!("unusable initial_setup ({e}), requesting full sync");
                self.desync();
                return;
            }
        };

        info!("game started as {:?}", self.player);
        self.in_game = true;
        self.queue.clear();
        self.selected = None;
        self.state = GameState {
            board,
            ..GameState::default()
        };
        if let Some(game_id) = self.game_id.clone() {
            self.send(ClientCommand::ClientReadyForRoll { game_id });
        }
        self.settle();
    }

    fn on_full_sync(&mut self, patch: StatePatch) {
        if self.phase == Phase::Desynced {
            info!("full sync received, resynchronized");
        }
        self.in_game = true;
        self.queue.clear();
        self.animation = None;
        self.selected = None;
        self.state = GameState::from_snapshot(&patch.normalized());
        self.settle();
    }

    fn on_dice(&mut self, patch: StatePatch, now: Instant) {
        self.state = self.state.merge(&patch);
        self.lock.acquire(now);
        self.animation = Some(Animation::Dice);
        self.set_phase(Phase::AnimatingLocal);
        self.effects.push(Effect::AnimateDice {
            dice: self.state.dice.clone(),
        });
    }

    fn on_rejection(&mut self, message: String) {
        let kind = self.classifier.classify(&message);
        // Earlier steps of the gesture may already be applied on the oracle.
        let mid_sequence = self.queue.has_pending();
        warn!("step rejected ({kind:?}, mid_sequence={mid_sequence}): {message}");
        self.selected = None;
        self.status = Status::Rejected { message };

        if !kind.is_fatal() && !mid_sequence {
            self.queue.clear();
            self.lock.release();
            self.animation = None;
            self.set_phase(Phase::Idle);
            self.render();
            return;
        }

        self.queue.clear();
        if kind == RejectionKind::AlreadyMoved {
            self.state = self.state.merge(&StatePatch {
                possible_turns: Some(Vec::new()),
                can_undo: Some(true),
                turn: Some(self.player.sign()),
                ..StatePatch::default()
            });
        }
        self.desync();
    }

    fn on_step_accepted(&mut self, patch: Option<StatePatch>, now: Instant) {
        if self.phase == Phase::Desynced {
            debug!("step_accepted while awaiting full sync ignored");
            return;
        }
        self.queue.acknowledge();
        let Some(patch) = patch else {
            warn!("step_accepted without state");
            self.queue.clear();
            self.settle();
            return;
        };

        let patch = patch.with_inferred_dice(&self.state.dice, self.dice_fallback);
        let Some(was_blot) = self.apply_patch(&patch, self.player) else {
            return;
        };

        match patch.applied_move {
            Some(step) => self.animate_move(step, was_blot, self.player, now),
            None => {
                self.queue.clear();
                self.settle();
            }
        }
    }

    fn on_opponent_step(&mut self, patch: Option<StatePatch>, now: Instant) {
        let Some(patch) = patch else {
            debug!("opponent step without state ignored");
            return;
        };
        if patch.board_state.is_none() && patch.applied_move.is_none() {
            debug!("opponent step without board or move ignored");
            return;
        }

        let patch = patch.with_inferred_dice(&self.state.dice, self.dice_fallback);
        let opponent = self.player.opponent();
        let Some(was_blot) = self.apply_patch(&patch, opponent) else {
            return;
        };

        match patch.applied_move {
            Some(step) => self.animate_move(step, was_blot, opponent, now),
            None => self.settle(),
        }
    }

    /// Merges a step patch, applying the move locally when no board was sent.
    /// Returns whether the move hit a blot, or `None` after a forced resync.
    fn apply_patch(&mut self, patch: &StatePatch, mover: Side) -> Option<bool> {
        let mut base = self.state.clone();
        let mut local_blot = false;
        if let (None, Some(step)) = (&patch.board_state, patch.applied_move) {
            match base.with_local_step(step, mover) {
                Ok((next, was_blot)) => {
                    base = next;
                    local_blot = was_blot;
                }
                Err(e) => {
                    warn!("cannot apply {step:?} locally ({e}), requesting full sync");
                    self.desync();
                    return None;
                }
            }
        }
        self.state = base.merge(patch);
        Some(patch.was_blot.unwrap_or(local_blot))
    }

    fn animate_move(&mut self, step: Step, was_blot: bool, side: Side, now: Instant) {
        self.lock.acquire(now);
        self.animation = Some(Animation::Move(step));
        self.set_phase(Phase::AnimatingLocal);
        self.effects.push(Effect::AnimateMove { step, was_blot, side });
    }

    fn finish_game(&mut self, won: bool, reason: Option<String>) {
        info!("game over, won={won} reason={reason:?}");
        self.lock.release();
        self.set_phase(Phase::Idle);
        self.status = Status::GameOver {
            won,
            reason: reason.clone(),
        };
        self.render();
        self.effects.push(Effect::GameOver { won, reason });
        self.teardown();
        self.effects.push(Effect::ShowLobby);
    }

    // ---- internals ------------------------------------------------------

    /// Lock/failsafe gate shared by every input except `leave`.
    fn accepts_input(&mut self, now: Instant) -> bool {
        match self.lock.check(now) {
            LockCheck::Free => true,
            LockCheck::Held => {
                debug!("input blocked, transaction in flight");
                false
            }
            LockCheck::Expired(age) => {
                warn!("failsafe: lock held for {age:?}, forcing full sync");
                self.desync();
                true
            }
        }
    }

    fn accepts_gesture(&mut self, now: Instant) -> bool {
        self.accepts_input(now) && self.state.is_turn_of(self.player)
    }

    fn submit(&mut self, from: Point, to: Point, now: Instant) -> bool {
        let Some(steps) = resolve(from, to, &self.state.possible_turns) else {
            return false;
        };
        if let Err(e) = self.queue.enqueue(steps) {
            warn!("gesture {from} -> {to} dropped: {e}");
            return false;
        }
        self.selected = None;
        self.status = Status::StepSent;
        self.lock.acquire(now);
        self.send_next_step()
    }

    fn submit_bearing_off(&mut self, from: Point, now: Instant) -> bool {
        match bearing_off_target(from, self.player, &self.state.possible_turns) {
            Some(target) => self.submit(from, target, now),
            None => false,
        }
    }

    fn send_next_step(&mut self) -> bool {
        let Some(step) = self.queue.drain_next() else {
            return false;
        };
        self.set_phase(Phase::AwaitingServer);
        self.send(ClientCommand::SendPlayerStep { step });
        self.render();
        true
    }

    fn begin(&mut self, command: ClientCommand, status: Status, now: Instant) {
        self.lock.acquire(now);
        self.status = status;
        self.set_phase(Phase::AwaitingServer);
        self.send(command);
        self.render();
    }

    /// Drops the queue and the lock and asks the oracle for the truth.
    fn desync(&mut self) {
        self.queue.clear();
        self.lock.release();
        self.animation = None;
        self.set_phase(Phase::Desynced);
        self.send(ClientCommand::RequestFullGameSync);
        self.render();
    }

    /// Ends the current transaction and hands control back to the user.
    fn settle(&mut self) {
        self.lock.release();
        self.animation = None;
        self.set_phase(Phase::Idle);
        self.status = view::idle_status(&self.state, self.player);
        self.render();
    }

    fn teardown(&mut self) {
        self.state = GameState::default();
        self.queue.clear();
        self.lock.release();
        self.animation = None;
        self.selected = None;
        self.game_id = None;
        self.in_game = false;
        self.status = Status::Waiting;
        self.set_phase(Phase::Idle);
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            info!("phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn send(&mut self, command: ClientCommand) {
        debug!(">> {}", command.event_name());
        self.effects.push(Effect::Send(command));
    }

    fn render(&mut self) {
        let frame = self.frame();
        self.effects.push(Effect::Render(frame));
    }
}

fn build_board(setup: &InitialSetup) -> Result<Board, EngineError> {
    let white = setup.white_points()?;
    let black = setup.black_points()?;
    Ok(Board::from_setup(&white, &black)?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;

    fn event(name: &str, data: Value) -> ServerEvent {
        ServerEvent::decode(name, data).unwrap().unwrap()
    }

    fn sent(effects: &[Effect]) -> Vec<ClientCommand> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    fn step_command(from: Point, to: Point) -> ClientCommand {
        ClientCommand::SendPlayerStep { step: Step::new(from, to) }
    }

    fn fatal() -> FatalRejections {
        FatalRejections::default()
    }

    fn board_json() -> Vec<i8> {
        let mut board = vec![0i8; 28];
        board[1] = 2;
        board[12] = 5;
        board[17] = 3;
        board[19] = 5;
        board[24] = -2;
        board[13] = -5;
        board[9] = -3;
        board[6] = -5;
        board
    }

    /// Engine synced into White's turn with dice [3, 4].
    fn engine_in_turn(now: Instant) -> TurnEngine {
        let mut engine = TurnEngine::new(EngineConfig::default()).unwrap();
        engine.handle_event(
            event(
                "full_game_sync",
                json!({
                    "board_state": board_json(),
                    "dice": [3, 4],
                    "possible_turns": [
                        [{"from": 1, "to": 4}, {"from": 4, "to": 8}],
                        [{"from": 1, "to": 3}, {"from": 12, "to": 16}],
                        [{"from": 19, "to": 22}, {"from": 22, "to": 26}]
                    ],
                    "turn": 1,
                    "borne_off_white": 0,
                    "borne_off_black": 0,
                    "can_undo": false
                }),
            ),
            now,
        );
        engine.take_effects();
        engine
    }

    fn totals(engine: &TurnEngine) -> (u32, u32) {
        let state = engine.state();
        (state.checker_total(Side::White), state.checker_total(Side::Black))
    }

    #[test]
    fn full_sync_settles_into_idle_with_rendered_frame() {
        let now = Instant::now();
        let mut engine = TurnEngine::new(EngineConfig::default()).unwrap();

        engine.handle_event(event("full_game_sync", json!([{"turn": 1, "dice": [3, 4]}])), now);

        assert_eq!(engine.phase(), Phase::Idle);
        assert!(engine.in_game());
        assert_eq!(engine.state().dice, vec![3, 4]);
        let effects = engine.take_effects();
        assert!(matches!(effects.last(), Some(Effect::Render(_))));
    }

    #[test]
    fn gesture_sends_only_the_first_step() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);

        engine.point_click(1, now);
        assert_eq!(engine.selected(), Some(1));
        engine.point_click(8, now);

        assert_eq!(sent(&engine.take_effects()), vec![step_command(1, 4)]);
        assert_eq!(engine.phase(), Phase::AwaitingServer);
        assert_eq!(engine.queue().in_flight(), Some(Step::new(1, 4)));
        assert_eq!(engine.queue().pending_len(), 1);
        assert!(engine.is_locked());
        assert_eq!(engine.frame().highlights, Highlights::default());
    }

    #[test]
    fn sequence_drains_after_ack_and_animation() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        let before = totals(&engine);
        engine.point_click(1, now);
        engine.point_click(8, now);
        engine.take_effects();

        engine.handle_event(
            event(
                "step_accepted",
                json!({
                    "applied_move": {"from": 1, "to": 4},
                    "remaining_dice": [4],
                    "possible_turns": [[{"from": 4, "to": 8}]]
                }),
            ),
            now,
        );
        let effects = engine.take_effects();
        assert!(sent(&effects).is_empty());
        assert!(effects.contains(&Effect::AnimateMove {
            step: Step::new(1, 4),
            was_blot: false,
            side: Side::White,
        }));
        assert_eq!(engine.phase(), Phase::AnimatingLocal);
        assert_eq!(engine.state().board.get(4), 1);
        assert_eq!(totals(&engine), before);

        engine.animation_complete(now);
        assert_eq!(sent(&engine.take_effects()), vec![step_command(4, 8)]);
        assert_eq!(engine.phase(), Phase::AwaitingServer);

        engine.handle_event(
            event(
                "step_accepted",
                json!({
                    "applied_move": {"from": 4, "to": 8},
                    "remaining_dice": [],
                    "possible_turns": [],
                    "can_undo": true
                }),
            ),
            now,
        );
        engine.animation_complete(now);

        assert!(sent(&engine.take_effects()).is_empty());
        assert_eq!(engine.phase(), Phase::Idle);
        assert!(!engine.is_locked());
        assert!(!engine.queue().is_active());
        assert_eq!(engine.state().board.get(8), 1);
        assert_eq!(totals(&engine), before);
        assert_eq!(engine.status(), &Status::NoMovesFinishTurn);
    }

    #[test]
    fn unresolvable_gesture_sends_nothing() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);

        engine.point_click(1, now);
        engine.point_click(16, now);

        assert!(sent(&engine.take_effects()).is_empty());
        assert!(!engine.queue().is_active());
        assert_eq!(engine.selected(), None);
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn failed_gesture_on_another_source_reselects_it() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);

        engine.point_click(1, now);
        engine.point_click(19, now);
        assert_eq!(engine.selected(), Some(19));

        engine.point_click(19, now);
        assert_eq!(engine.selected(), None);
    }

    #[test]
    fn input_is_ignored_while_the_lock_is_held() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.point_click(1, now);
        engine.point_click(4, now);
        engine.take_effects();

        engine.point_click(19, now + Duration::from_millis(500));
        engine.request_roll(now + Duration::from_millis(500));

        assert!(engine.take_effects().is_empty());
        assert_eq!(engine.selected(), None);
    }

    #[test]
    fn stale_lock_is_recovered_and_the_gesture_proceeds() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.point_click(1, now);
        engine.point_click(8, now);
        engine.take_effects();

        engine.point_click(19, now + Duration::from_millis(3_001));

        assert_eq!(sent(&engine.take_effects()), vec![ClientCommand::RequestFullGameSync]);
        assert!(!engine.queue().is_active());
        assert!(!engine.is_locked());
        assert_eq!(engine.phase(), Phase::Desynced);
        assert_eq!(engine.selected(), Some(19));
    }

    #[test]
    fn tick_recovers_without_any_input() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.point_click(1, now);
        engine.point_click(4, now);
        engine.take_effects();

        assert!(!engine.tick(now + Duration::from_secs(1)));
        assert!(engine.tick(now + Duration::from_millis(3_500)));

        assert_eq!(sent(&engine.take_effects()), vec![ClientCommand::RequestFullGameSync]);
        assert!(!engine.tick(now + Duration::from_secs(10)));
    }

    #[test]
    fn already_rolled_rejection_mid_sequence_resyncs_once() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.point_click(1, now);
        engine.point_click(8, now);
        engine.take_effects();

        engine.handle_event(
            event("move_rejection", json!({"message": fatal().already_rolled})),
            now,
        );

        let effects = engine.take_effects();
        assert_eq!(sent(&effects), vec![ClientCommand::RequestFullGameSync]);
        assert!(!engine.queue().is_active());
        assert!(!engine.is_locked());
        assert_eq!(engine.phase(), Phase::Desynced);

        engine.handle_event(event("full_game_sync", json!({"turn": -1})), now);
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.state().turn, -1);
        assert!(engine.state().board.is_empty());
    }

    #[test]
    fn already_moved_rejection_assumes_finish_turn_state() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.point_click(1, now);
        engine.point_click(4, now);
        engine.take_effects();

        engine.handle_event(
            event("move_rejection", json!([{"message": fatal().already_moved}])),
            now,
        );

        assert_eq!(sent(&engine.take_effects()), vec![ClientCommand::RequestFullGameSync]);
        let state = engine.state();
        assert!(state.possible_turns.is_empty());
        assert!(state.can_undo);
        assert_eq!(state.turn, 1);
        assert_eq!(
            engine.status(),
            &Status::Rejected { message: fatal().already_moved }
        );
    }

    #[test]
    fn ordinary_rejection_returns_to_idle_without_network() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.handle_event(event("undo_accepted", json!({"remaining_dice": [], "can_undo": true, "possible_turns": []})), now);
        engine.finish_turn(now);
        assert_eq!(sent(&engine.take_effects()), vec![ClientCommand::SendTurnFinished]);

        engine.handle_event(event("move_rejection", json!({"message": "Сейчас не ваш ход."})), now);

        assert!(sent(&engine.take_effects()).is_empty());
        assert_eq!(engine.phase(), Phase::Idle);
        assert!(!engine.is_locked());
    }

    #[test]
    fn ordinary_rejection_of_a_single_step_releases_without_resync() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.point_click(1, now);
        engine.point_click(3, now);
        assert_eq!(sent(&engine.take_effects()), vec![step_command(1, 3)]);

        engine.handle_event(event("move_rejection", json!({"message": "Неверный ход."})), now);

        assert!(sent(&engine.take_effects()).is_empty());
        assert_eq!(engine.phase(), Phase::Idle);
        assert!(!engine.is_locked());
        assert!(!engine.queue().is_active());
        assert_eq!(engine.frame().highlights.sources, vec![1, 19]);

        engine.point_click(1, now);
        engine.point_click(3, now);
        assert_eq!(sent(&engine.take_effects()), vec![step_command(1, 3)]);
    }

    #[test]
    fn ordinary_rejection_with_steps_still_queued_resyncs() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.point_click(1, now);
        engine.point_click(8, now);
        engine.take_effects();

        engine.handle_event(event("move_rejection", json!({"message": "Неверный ход."})), now);

        assert_eq!(sent(&engine.take_effects()), vec![ClientCommand::RequestFullGameSync]);
        assert!(!engine.queue().is_active());
        assert_eq!(engine.phase(), Phase::Desynced);
    }

    #[test]
    fn late_ack_after_failsafe_waits_for_the_full_sync() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.point_click(1, now);
        engine.point_click(4, now);
        assert!(engine.tick(now + Duration::from_millis(3_500)));
        engine.take_effects();

        engine.handle_event(
            event("step_accepted", json!({"applied_move": {"from": 1, "to": 4}, "remaining_dice": [4]})),
            now + Duration::from_secs(4),
        );

        assert!(engine.take_effects().is_empty());
        assert_eq!(engine.phase(), Phase::Desynced);
        assert!(!engine.is_locked());
        assert_eq!(engine.state().board.get(1), 2);
    }

    #[test]
    fn step_ack_without_dice_data_drops_the_front_die() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.point_click(1, now);
        engine.point_click(4, now);

        engine.handle_event(event("step_accepted", json!({"applied_move": {"from": 1, "to": 4}})), now);

        assert_eq!(engine.state().dice, vec![4]);
    }

    #[test]
    fn custom_dice_fallback_replaces_the_default() {
        fn keep_dice(_: &[u8]) -> Option<Vec<u8>> {
            None
        }
        let now = Instant::now();
        let mut engine = engine_in_turn(now).with_dice_fallback(keep_dice);

        engine.handle_event(event("step_accepted", json!({"can_undo": true})), now);

        assert_eq!(engine.state().dice, vec![3, 4]);
    }

    #[test]
    fn opponent_step_animates_for_the_opponent_side() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.handle_event(event("turn_finished", Value::Null), now);
        engine.handle_event(event("bot_dice_roll_result", json!({"dice": [2, 5]})), now);
        assert!(engine.take_effects().contains(&Effect::AnimateDice { dice: vec![2, 5] }));
        engine.animation_complete(now);
        let before = totals(&engine);

        engine.handle_event(
            event("on_opponent_step_executed", json!({"applied_move": {"from": 6, "to": 4}})),
            now,
        );

        assert!(engine.take_effects().contains(&Effect::AnimateMove {
            step: Step::new(6, 4),
            was_blot: false,
            side: Side::Black,
        }));
        assert_eq!(engine.state().dice, vec![5]);
        assert_eq!(engine.state().board.get(4), -1);
        assert_eq!(totals(&engine), before);

        engine.animation_complete(now);
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.status(), &Status::OpponentTurn);
    }

    #[test]
    fn impossible_local_step_forces_resync() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);

        engine.handle_event(
            event("on_opponent_step_executed", json!({"applied_move": {"from": 2, "to": 4}})),
            now,
        );

        assert_eq!(sent(&engine.take_effects()), vec![ClientCommand::RequestFullGameSync]);
        assert_eq!(engine.phase(), Phase::Desynced);
    }

    #[test]
    fn turn_finished_keeps_the_board_and_flips_the_turn() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        let board = engine.state().board.clone();

        engine.handle_event(event("turn_finished", json!({})), now);
        assert_eq!(engine.state().turn, -1);
        assert!(engine.state().dice.is_empty());
        assert_eq!(engine.state().board, board);

        engine.handle_event(event("turn_finished", json!({})), now);
        assert_eq!(engine.state().turn, 1);
        assert_eq!(engine.state().board, board);
        assert!(engine.frame().controls.can_roll);
    }

    #[test]
    fn undo_snaps_to_the_server_state() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.handle_event(
            event("step_accepted", json!({"applied_move": {"from": 19, "to": 22}, "can_undo": true})),
            now,
        );
        engine.animation_complete(now);
        engine.take_effects();

        engine.request_undo(now);
        assert_eq!(sent(&engine.take_effects()), vec![ClientCommand::RequestUndo]);
        engine.handle_event(
            event("undo_accepted", json!({"board_state": board_json(), "remaining_dice": [3, 4], "can_undo": false})),
            now,
        );

        let effects = engine.take_effects();
        assert!(!effects.iter().any(|e| matches!(e, Effect::AnimateMove { .. })));
        assert_eq!(engine.state().board.get(19), 5);
        assert_eq!(engine.state().dice, vec![3, 4]);
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn click_before_rolling_requests_dice() {
        let now = Instant::now();
        let mut engine = TurnEngine::new(EngineConfig::default()).unwrap();
        engine.handle_event(event("full_game_sync", json!({"turn": 1, "board_state": board_json()})), now);
        engine.take_effects();

        engine.point_click(12, now);
        assert_eq!(sent(&engine.take_effects()), vec![ClientCommand::RequestPlayerRoll]);
        assert_eq!(engine.phase(), Phase::AwaitingServer);

        engine.handle_event(
            event("dice_roll_result", json!({"dice": [6, 6], "possible_turns": [[{"from": 12, "to": 18}]]})),
            now,
        );
        assert!(engine.take_effects().contains(&Effect::AnimateDice { dice: vec![6, 6] }));
        assert_eq!(engine.phase(), Phase::AnimatingLocal);

        engine.animation_complete(now);
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.frame().highlights.sources, vec![12]);
    }

    #[test]
    fn tray_click_bears_off_through_the_reachable_target() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);

        engine.tray_click(Side::White, now);
        assert!(engine.take_effects().is_empty());

        engine.point_click(19, now);
        assert!(engine.frame().highlights.tray);
        engine.tray_click(Side::Black, now);
        assert_eq!(engine.selected(), Some(19));
        engine.tray_click(Side::White, now);

        assert_eq!(sent(&engine.take_effects()), vec![step_command(19, 22)]);
        assert_eq!(engine.queue().pending_len(), 1);
    }

    #[test]
    fn drag_and_drop_uses_the_same_resolver() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);

        engine.drag_start(1, now);
        engine.drag_cancel();
        assert_eq!(engine.selected(), None);

        engine.drag_start(1, now);
        engine.drop_on_point(3, now);
        assert_eq!(sent(&engine.take_effects()), vec![step_command(1, 3)]);
        assert!(!engine.queue().has_pending());
    }

    #[test]
    fn gestures_are_ignored_on_the_opponents_turn() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.handle_event(event("turn_finished", Value::Null), now);
        engine.take_effects();

        engine.point_click(1, now);
        engine.drag_start(1, now);

        assert!(engine.take_effects().is_empty());
    }

    #[test]
    fn leave_is_never_blocked_by_the_lock() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.point_click(1, now);
        engine.point_click(4, now);
        engine.take_effects();

        engine.leave(now);

        assert_eq!(sent(&engine.take_effects()), vec![ClientCommand::PlayerGiveUp]);
        assert_eq!(engine.status(), &Status::GivingUp);
        assert!(engine.is_locked());
    }

    #[test]
    fn game_over_reports_outcome_and_returns_to_lobby() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.leave(now);
        engine.take_effects();

        engine.handle_event(event("game_over", json!({"winner": -1, "reason": "give_up"})), now);

        let effects = engine.take_effects();
        assert!(effects.contains(&Effect::GameOver {
            won: false,
            reason: Some("give_up".to_string()),
        }));
        assert_eq!(effects.last(), Some(&Effect::ShowLobby));
        assert!(!engine.in_game());
        assert!(!engine.is_locked());
        assert_eq!(engine.state(), &GameState::default());
    }

    #[test]
    fn opponent_timeout_is_a_win() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);

        engine.handle_event(event("opponent_timeout_victory", Value::Null), now);

        assert!(engine.take_effects().contains(&Effect::GameOver {
            won: true,
            reason: Some("timeout".to_string()),
        }));
    }

    #[test]
    fn auth_failure_tears_everything_down() {
        let now = Instant::now();
        let mut engine = engine_in_turn(now);
        engine.point_click(1, now);
        engine.point_click(8, now);
        engine.take_effects();

        engine.handle_event(event("auth_failed", Value::Null), now);

        assert_eq!(engine.take_effects(), vec![Effect::LoggedOut]);
        assert!(!engine.queue().is_active());
        assert!(!engine.is_locked());
        assert!(!engine.in_game());
    }

    #[test]
    fn initial_setup_builds_the_board_and_reports_ready() {
        let now = Instant::now();
        let mut engine = TurnEngine::new(EngineConfig::default()).unwrap();
        engine.handle_event(event("game_created", json!({"game_id": "g-7"})), now);

        engine.handle_event(
            event(
                "initial_setup",
                json!({
                    "white_setup": {"1": 2, "12": 5, "17": 3, "19": 5},
                    "black_setup": {"24": 2, "13": 5, "8": 3, "6": 5},
                    "opponent_data": {"username": "bot_easy"}
                }),
            ),
            now,
        );

        let effects = engine.take_effects();
        assert!(effects.contains(&Effect::OpponentInfo { username: "bot_easy".to_string() }));
        assert_eq!(
            sent(&effects),
            vec![ClientCommand::ClientReadyForRoll { game_id: "g-7".to_string() }]
        );
        assert_eq!(totals(&engine), (15, 15));
        assert_eq!(engine.state().board.get(6), -5);
        assert_eq!(engine.state().turn, 0);

        engine.handle_event(event("initial_roll_result", json!({"first_turn": "player"})), now);
        assert_eq!(engine.state().turn, 1);
        assert_eq!(engine.status(), &Status::FirstTurnPlayer);
    }

    #[test]
    fn oversized_setup_count_requests_full_sync() {
        let now = Instant::now();
        let mut engine = TurnEngine::new(EngineConfig::default()).unwrap();

        engine.handle_event(
            event("initial_setup", json!({"white_setup": {"1": 200}, "black_setup": {"6": 5}})),
            now,
        );

        assert_eq!(sent(&engine.take_effects()), vec![ClientCommand::RequestFullGameSync]);
        assert_eq!(engine.phase(), Phase::Desynced);
        assert!(engine.state().board.is_empty());
    }

    #[test]
    fn start_pve_is_refused_inside_a_game() {
        let now = Instant::now();
        let mut engine = TurnEngine::new(EngineConfig::default()).unwrap();
        engine.start_pve();
        assert_eq!(
            sent(&engine.take_effects()),
            vec![ClientCommand::StartPve { bot_level: "easy".to_string(), player_sign: Side::White }]
        );

        engine.handle_event(event("full_game_sync", json!({"turn": 1})), now);
        engine.take_effects();
        engine.start_pve();
        assert!(engine.take_effects().is_empty());
    }

    #[test]
    fn custom_classifier_controls_what_is_fatal() {
        struct EverythingFatal;
        impl RejectionClassifier for EverythingFatal {
            fn classify(&self, _message: &str) -> RejectionKind {
                RejectionKind::AlreadyRolled
            }
        }
        let now = Instant::now();
        let mut engine =
            TurnEngine::with_classifier(EngineConfig::default(), Box::new(EverythingFatal)).unwrap();
        engine.handle_event(event("full_game_sync", json!({"turn": 1})), now);
        engine.take_effects();

        engine.handle_event(event("move_rejection", json!({"message": "anything"})), now);

        assert_eq!(sent(&engine.take_effects()), vec![ClientCommand::RequestFullGameSync]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            failsafe_timeout_ms: 0,
            ..EngineConfig::default()
        };

        assert!(matches!(TurnEngine::new(config), Err(ConfigError::ZeroTimeout)));
    }
}
