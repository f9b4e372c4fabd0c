use rhai::{Dynamic, Engine, Scope, AST};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use appmodeler_core::{ActionSelector, Error, KwargValue, Result};

use crate::bridge::CapabilityBridge;
use crate::loader::{ActionSignature, ExecutionGuard};

/// A compiled view script bound to a live capability implementation,
/// ready to dispatch actions.
pub struct BoundView {
    name: String,
    engine: Engine,
    ast: AST,
    actions: Vec<ActionSignature>,
    bridge: Arc<CapabilityBridge>,
    guard: ExecutionGuard,
}

// The embedded script engine has no Debug representation; the name and
// action list identify a view well enough.
impl fmt::Debug for BoundView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundView")
            .field("name", &self.name)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl BoundView {
    pub(crate) fn new(
        name: String,
        engine: Engine,
        ast: AST,
        actions: Vec<ActionSignature>,
        bridge: Arc<CapabilityBridge>,
        guard: ExecutionGuard,
    ) -> Self {
        Self {
            name,
            engine,
            ast,
            actions,
            bridge,
            guard,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exported action names in definition order. Selector patterns resolve
    /// against this order.
    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|a| a.name.as_str())
    }

    /// Resolve a selector to a concrete action name, first match in
    /// definition order.
    pub fn resolve(&self, selector: &ActionSelector) -> Option<&str> {
        selector.resolve(self.action_names())
    }

    /// The view's API as shown to the operator and fed to the advisor
    /// prompt.
    pub fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "view": self.name,
            "actions": self.actions.iter().map(|a| {
                serde_json::json!({ "name": a.name, "params": a.params })
            }).collect::<Vec<_>>(),
        })
    }

    /// Call `action` with positional string arguments and, when present, the
    /// keyword pairs folded into a map passed as the trailing argument.
    ///
    /// Returns the action's result rendered as text, `None` for unit. A lost
    /// driver session surfaces as `Error::Connection`; everything else the
    /// script raises becomes `Error::Execution`.
    pub fn dispatch(
        &self,
        action: &str,
        args: &[String],
        kwargs: &[(String, KwargValue)],
    ) -> Result<Option<String>> {
        let mut values: Vec<Dynamic> = args.iter().map(|a| Dynamic::from(a.clone())).collect();
        if !kwargs.is_empty() {
            let mut map = rhai::Map::new();
            for (key, value) in kwargs {
                let dynamic = match value {
                    KwargValue::Str(s) => Dynamic::from(s.clone()),
                    KwargValue::Int(n) => Dynamic::from(*n),
                };
                map.insert(key.as_str().into(), dynamic);
            }
            values.push(Dynamic::from(map));
        }

        debug!(view = %self.name, action, arity = values.len(), "Dispatching action");
        self.guard.reset();
        let mut scope = Scope::new();
        match self
            .engine
            .call_fn::<Dynamic>(&mut scope, &self.ast, action, values)
        {
            Ok(value) => {
                if value.is_unit() {
                    Ok(None)
                } else {
                    Ok(Some(value.to_string()))
                }
            }
            Err(e) => {
                if let Some(original) = self.bridge.take_last_error() {
                    if original.is_connection_lost() {
                        return Err(original);
                    }
                }
                Err(Error::Execution(format!(
                    "{}.{} failed: {}",
                    self.name, action, e
                )))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::loader::ViewLoader;
    use appmodeler_core::UiCapability;
    use std::sync::Mutex;

    /// Capability double that records every primitive call as one line.
    pub(crate) struct RecordingUi {
        pub(crate) calls: Mutex<Vec<String>>,
        fail_with_connection: bool,
    }

    impl RecordingUi {
        pub(crate) fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_with_connection: false,
            })
        }

        fn lost() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_with_connection: true,
            })
        }

        fn record(&self, line: String) -> Result<()> {
            if self.fail_with_connection {
                return Err(Error::Connection("session is gone".to_string()));
            }
            self.calls.lock().unwrap().push(line);
            Ok(())
        }
    }

    impl UiCapability for RecordingUi {
        fn click(&self, strategy: &str, value: &str) -> Result<()> {
            self.record(format!("click {} {}", strategy, value))
        }

        fn enter_text(&self, strategy: &str, value: &str, text: &str) -> Result<()> {
            self.record(format!("enter_text {} {} {}", strategy, value, text))
        }

        fn get_text(&self, strategy: &str, value: &str) -> Result<String> {
            self.record(format!("get_text {} {}", strategy, value))?;
            Ok("stub text".to_string())
        }

        fn is_displayed(&self, strategy: &str, value: &str) -> Result<bool> {
            self.record(format!("is_displayed {} {}", strategy, value))?;
            Ok(true)
        }

        fn swipe(&self, sx: i64, sy: i64, ex: i64, ey: i64, duration_ms: i64) -> Result<()> {
            self.record(format!("swipe {} {} {} {} {}", sx, sy, ex, ey, duration_ms))
        }

        fn scroll_to(&self, strategy: &str, value: &str) -> Result<()> {
            self.record(format!("scroll_to {} {}", strategy, value))
        }

        fn wait_for_element(&self, strategy: &str, value: &str, timeout_secs: i64) -> Result<()> {
            self.record(format!("wait_for_element {} {} {}", strategy, value, timeout_secs))
        }
    }

    const LOGIN_VIEW: &str = r#"
        fn view_name() { "View0" }
        fn click_login() { click("xpath", "//btn[@id='login']"); }
        fn enter_username(name) { enter_text("accessibility id", "user", name); }
        fn sign_in(name, opts) {
            enter_text("accessibility id", "user", name);
            enter_text("accessibility id", "pass", opts.password);
            if opts.remember == 1 { click("accessibility id", "remember"); }
            click("xpath", "//btn[@id='login']");
        }
        fn configure(opts) { wait_for_element("xpath", "//form", opts.timeout); }
        fn read_banner() { get_text("xpath", "//banner") }
        fn page_down() { swipe(500, 1600, 500, 400, 300); }
        fn reveal_footer() { scroll_to("xpath", "//footer"); }
        fn banner_shown() { is_displayed("xpath", "//banner") }
    "#;

    fn bound(ui: Arc<RecordingUi>) -> BoundView {
        ViewLoader::default()
            .load("View0", LOGIN_VIEW, ui)
            .unwrap()
    }

    #[test]
    fn test_dispatch_bare() {
        let ui = RecordingUi::ok();
        let view = bound(ui.clone());
        let result = view.dispatch("click_login", &[], &[]).unwrap();
        assert_eq!(result, None);
        assert_eq!(
            ui.calls.lock().unwrap().as_slice(),
            ["click xpath //btn[@id='login']"]
        );
    }

    #[test]
    fn test_dispatch_positional() {
        let ui = RecordingUi::ok();
        let view = bound(ui.clone());
        view.dispatch("enter_username", &["alice".to_string()], &[])
            .unwrap();
        assert_eq!(
            ui.calls.lock().unwrap().as_slice(),
            ["enter_text accessibility id user alice"]
        );
    }

    #[test]
    fn test_dispatch_kwargs_only() {
        let ui = RecordingUi::ok();
        let view = bound(ui.clone());
        view.dispatch(
            "configure",
            &[],
            &[("timeout".to_string(), KwargValue::Int(5))],
        )
        .unwrap();
        assert_eq!(
            ui.calls.lock().unwrap().as_slice(),
            ["wait_for_element xpath //form 5"]
        );
    }

    #[test]
    fn test_dispatch_both() {
        let ui = RecordingUi::ok();
        let view = bound(ui.clone());
        view.dispatch(
            "sign_in",
            &["alice".to_string()],
            &[
                ("password".to_string(), KwargValue::Str("secret".to_string())),
                ("remember".to_string(), KwargValue::Int(1)),
            ],
        )
        .unwrap();
        let calls = ui.calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[1], "enter_text accessibility id pass secret");
        assert_eq!(calls[2], "click accessibility id remember");
    }

    #[test]
    fn test_dispatch_returns_text() {
        let view = bound(RecordingUi::ok());
        let result = view.dispatch("read_banner", &[], &[]).unwrap();
        assert_eq!(result, Some("stub text".to_string()));
    }

    #[test]
    fn test_dispatch_returns_bool_as_text() {
        let view = bound(RecordingUi::ok());
        let result = view.dispatch("banner_shown", &[], &[]).unwrap();
        assert_eq!(result, Some("true".to_string()));
    }

    #[test]
    fn test_all_primitives_reachable() {
        let ui = RecordingUi::ok();
        let view = bound(ui.clone());
        view.dispatch("page_down", &[], &[]).unwrap();
        view.dispatch("reveal_footer", &[], &[]).unwrap();
        let calls = ui.calls.lock().unwrap();
        assert_eq!(calls[0], "swipe 500 1600 500 400 300");
        assert_eq!(calls[1], "scroll_to xpath //footer");
    }

    #[test]
    fn test_unknown_action_is_execution_error() {
        let view = bound(RecordingUi::ok());
        let err = view.dispatch("does_not_exist", &[], &[]).unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[test]
    fn test_arity_mismatch_is_execution_error() {
        let view = bound(RecordingUi::ok());
        let err = view
            .dispatch("click_login", &["extra".to_string()], &[])
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[test]
    fn test_lost_session_surfaces_as_connection() {
        let view = bound(RecordingUi::lost());
        let err = view.dispatch("click_login", &[], &[]).unwrap_err();
        assert!(err.is_connection_lost());
    }

    #[test]
    fn test_pattern_selector_resolves_in_definition_order() {
        let view = bound(RecordingUi::ok());
        let selector = ActionSelector::parse("/click_.*/").unwrap();
        assert_eq!(view.resolve(&selector), Some("click_login"));
        let none = ActionSelector::parse("/submit_.*/").unwrap();
        assert_eq!(view.resolve(&none), None);
    }

    #[test]
    fn test_describe_lists_actions_with_params() {
        let view = bound(RecordingUi::ok());
        let api = view.describe();
        assert_eq!(api["view"], "View0");
        assert_eq!(api["actions"][0]["name"], "click_login");
        assert_eq!(api["actions"][2]["params"][0], "name");
        assert_eq!(api["actions"][2]["params"][1], "opts");
    }

    #[test]
    fn test_debug_shows_name_and_actions() {
        let view = bound(RecordingUi::ok());
        let rendered = format!("{:?}", view);
        assert!(rendered.contains("BoundView"));
        assert!(rendered.contains("View0"));
        assert!(rendered.contains("click_login"));
    }
}
