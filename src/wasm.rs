//! JS bindings. Every mutating call returns the effects it produced.

use std::str::FromStr;

use log::LevelFilter;
use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use wasm_bindgen::prelude::*;
use web_time::Instant;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::game::TurnEngine;
use crate::logging;
use crate::protocol::ServerEvent;
use crate::types::{Point, Side};

#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(level: &str) -> Result<String, JsError> {
    let level = LevelFilter::from_str(level).map_err(|e| JsError::new(&e.to_string()))?;
    Ok(logging::init_logging(level).to_string())
}

#[wasm_bindgen]
pub struct WasmTurnEngine {
    inner: TurnEngine,
}

#[wasm_bindgen]
impl WasmTurnEngine {
    /// `config` may be `undefined` for defaults or a partial config object.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmTurnEngine, JsError> {
        let config = if config.is_undefined() || config.is_null() {
            EngineConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(|e| EngineError::Decode {
                what: "engine config",
                reason: e.to_string(),
            })?
        };
        let inner = TurnEngine::new(config).map_err(EngineError::from)?;
        Ok(Self { inner })
    }

    #[wasm_bindgen(js_name = handleEvent)]
    pub fn handle_event(&mut self, name: &str, data: JsValue) -> Result<JsValue, JsError> {
        let deserializer = serde_wasm_bindgen::Deserializer::from(data);
        let event = ServerEvent::decode(name, deserializer).map_err(|e| EngineError::Decode {
            what: "server event",
            reason: format!("{name}: {e}"),
        })?;
        match event {
            Some(event) => self.inner.handle_event(event, Instant::now()),
            None => log::debug!("ignoring unknown event {name}"),
        }
        self.drain()
    }

    #[wasm_bindgen(js_name = pointClick)]
    pub fn point_click(&mut self, point: Point) -> Result<JsValue, JsError> {
        self.inner.point_click(point, Instant::now());
        self.drain()
    }

    #[wasm_bindgen(js_name = trayClick)]
    pub fn tray_click(&mut self, sign: i8) -> Result<JsValue, JsError> {
        self.inner.tray_click(side(sign)?, Instant::now());
        self.drain()
    }

    #[wasm_bindgen(js_name = dragStart)]
    pub fn drag_start(&mut self, point: Point) -> Result<JsValue, JsError> {
        self.inner.drag_start(point, Instant::now());
        self.drain()
    }

    #[wasm_bindgen(js_name = dropOnPoint)]
    pub fn drop_on_point(&mut self, point: Point) -> Result<JsValue, JsError> {
        self.inner.drop_on_point(point, Instant::now());
        self.drain()
    }

    #[wasm_bindgen(js_name = dropOnTray)]
    pub fn drop_on_tray(&mut self, sign: i8) -> Result<JsValue, JsError> {
        self.inner.drop_on_tray(side(sign)?, Instant::now());
        self.drain()
    }

    #[wasm_bindgen(js_name = dragCancel)]
    pub fn drag_cancel(&mut self) -> Result<JsValue, JsError> {
        self.inner.drag_cancel();
        self.drain()
    }

    #[wasm_bindgen(js_name = requestRoll)]
    pub fn request_roll(&mut self) -> Result<JsValue, JsError> {
        self.inner.request_roll(Instant::now());
        self.drain()
    }

    #[wasm_bindgen(js_name = finishTurn)]
    pub fn finish_turn(&mut self) -> Result<JsValue, JsError> {
        self.inner.finish_turn(Instant::now());
        self.drain()
    }

    #[wasm_bindgen(js_name = requestUndo)]
    pub fn request_undo(&mut self) -> Result<JsValue, JsError> {
        self.inner.request_undo(Instant::now());
        self.drain()
    }

    pub fn leave(&mut self) -> Result<JsValue, JsError> {
        self.inner.leave(Instant::now());
        self.drain()
    }

    #[wasm_bindgen(js_name = startPve)]
    pub fn start_pve(&mut self) -> Result<JsValue, JsError> {
        self.inner.start_pve();
        self.drain()
    }

    #[wasm_bindgen(js_name = animationComplete)]
    pub fn animation_complete(&mut self) -> Result<JsValue, JsError> {
        self.inner.animation_complete(Instant::now());
        self.drain()
    }

    pub fn tick(&mut self) -> Result<JsValue, JsError> {
        self.inner.tick(Instant::now());
        self.drain()
    }

    pub fn frame(&self) -> Result<JsValue, JsError> {
        to_js(&self.inner.frame())
    }

    pub fn phase(&self) -> Result<JsValue, JsError> {
        to_js(&self.inner.phase())
    }

    #[wasm_bindgen(js_name = isLocked)]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl WasmTurnEngine {
    fn drain(&mut self) -> Result<JsValue, JsError> {
        to_js(&self.inner.take_effects())
    }
}

fn side(sign: i8) -> Result<Side, JsError> {
    Side::from_sign(sign).ok_or_else(|| JsError::new(&format!("invalid side sign: {sign}")))
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsError> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(|e| JsError::new(&e.to_string()))
}
