use rhai::{Dynamic, Engine, EvalAltResult, Position};
use std::sync::{Arc, Mutex};

use appmodeler_core::{Error, UiCapability};

/// Exposes the interaction primitives to a script engine.
///
/// Script errors flatten the original failure into text, so the bridge keeps
/// the last structured error on the side. Dispatch recovers it afterwards to
/// tell a lost driver session apart from an ordinary action failure.
pub struct CapabilityBridge {
    ui: Arc<dyn UiCapability>,
    last_error: Mutex<Option<Error>>,
}

impl CapabilityBridge {
    pub fn new(ui: Arc<dyn UiCapability>) -> Arc<Self> {
        Arc::new(Self {
            ui,
            last_error: Mutex::new(None),
        })
    }

    pub fn take_last_error(&self) -> Option<Error> {
        match self.last_error.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        }
    }

    fn capture<T>(&self, result: appmodeler_core::Result<T>) -> Result<T, Box<EvalAltResult>> {
        result.map_err(|e| {
            let message = e.to_string();
            if let Ok(mut guard) = self.last_error.lock() {
                *guard = Some(e);
            }
            Box::new(EvalAltResult::ErrorRuntime(
                Dynamic::from(message),
                Position::NONE,
            ))
        })
    }

    /// Register all primitives into `engine` under their reserved names.
    pub fn register(self: &Arc<Self>, engine: &mut Engine) {
        let bridge = self.clone();
        engine.register_fn(
            "click",
            move |strategy: &str, value: &str| -> Result<(), Box<EvalAltResult>> {
                bridge.capture(bridge.ui.click(strategy, value))
            },
        );

        let bridge = self.clone();
        engine.register_fn(
            "enter_text",
            move |strategy: &str, value: &str, text: &str| -> Result<(), Box<EvalAltResult>> {
                bridge.capture(bridge.ui.enter_text(strategy, value, text))
            },
        );

        let bridge = self.clone();
        engine.register_fn(
            "get_text",
            move |strategy: &str, value: &str| -> Result<String, Box<EvalAltResult>> {
                bridge.capture(bridge.ui.get_text(strategy, value))
            },
        );

        let bridge = self.clone();
        engine.register_fn(
            "is_displayed",
            move |strategy: &str, value: &str| -> Result<bool, Box<EvalAltResult>> {
                bridge.capture(bridge.ui.is_displayed(strategy, value))
            },
        );

        let bridge = self.clone();
        engine.register_fn(
            "swipe",
            move |sx: i64, sy: i64, ex: i64, ey: i64, duration_ms: i64| -> Result<(), Box<EvalAltResult>> {
                bridge.capture(bridge.ui.swipe(sx, sy, ex, ey, duration_ms))
            },
        );

        let bridge = self.clone();
        engine.register_fn(
            "scroll_to",
            move |strategy: &str, value: &str| -> Result<(), Box<EvalAltResult>> {
                bridge.capture(bridge.ui.scroll_to(strategy, value))
            },
        );

        let bridge = self.clone();
        engine.register_fn(
            "wait_for_element",
            move |strategy: &str, value: &str, timeout_secs: i64| -> Result<(), Box<EvalAltResult>> {
                bridge.capture(bridge.ui.wait_for_element(strategy, value, timeout_secs))
            },
        );
    }
}
