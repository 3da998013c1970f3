use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;

#[cfg(target_arch = "wasm32")]
mod console {
    use wasm_bindgen::prelude::*;

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(js_namespace = console, js_name = debug)]
        pub fn debug(line: &str);
        #[wasm_bindgen(js_namespace = console, js_name = log)]
        pub fn log(line: &str);
        #[wasm_bindgen(js_namespace = console, js_name = warn)]
        pub fn warn(line: &str);
        #[wasm_bindgen(js_namespace = console, js_name = error)]
        pub fn error(line: &str);
    }
}

/// `log` backend writing to the browser console (stderr natively).
#[derive(Debug)]
pub struct ConsoleLogger {
    level: LevelFilter,
}

static LOGGER: OnceCell<ConsoleLogger> = OnceCell::new();

/// Installs the console logger once. Later calls keep the first level and return it.
pub fn init_logging(level: LevelFilter) -> LevelFilter {
    let logger = LOGGER.get_or_init(|| ConsoleLogger { level });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level);
    }
    logger.level
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}: {}", record.level(), record.target(), record.args());
        write_line(record.level(), &line);
    }

    fn flush(&self) {}
}

#[cfg(target_arch = "wasm32")]
fn write_line(level: Level, line: &str) {
    match level {
        Level::Error => console::error(line),
        Level::Warn => console::warn(line),
        Level::Info => console::log(line),
        Level::Debug | Level::Trace => console::debug(line),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn write_line(_level: Level, line: &str) {
    eprintln!("{line}");
}
