use crate::error::Result;

/// The fixed set of interaction primitives every loaded view script gets to
/// call, `(name, arity)` as seen from the script side.
///
/// The loader registers exactly these into the script namespace and refuses
/// scripts that try to redefine any of them.
pub const REQUIRED_CAPABILITIES: &[(&str, usize)] = &[
    ("click", 2),
    ("enter_text", 3),
    ("get_text", 2),
    ("is_displayed", 2),
    ("swipe", 5),
    ("scroll_to", 2),
    ("wait_for_element", 3),
];

/// Capability interface: the interaction primitives a bound view dispatches
/// through. Implemented by the live driver adapter and by test doubles.
///
/// Locators are `(strategy, value)` pairs using the driver's locator
/// strategy names (e.g. `"accessibility id"`, `"xpath"`).
///
/// The trait is synchronous because calls originate inside script execution,
/// which runs on a blocking thread; the driver adapter bridges back into the
/// async client through a runtime handle.
pub trait UiCapability: Send + Sync {
    fn click(&self, strategy: &str, value: &str) -> Result<()>;

    fn enter_text(&self, strategy: &str, value: &str, text: &str) -> Result<()>;

    fn get_text(&self, strategy: &str, value: &str) -> Result<String>;

    fn is_displayed(&self, strategy: &str, value: &str) -> Result<bool>;

    fn swipe(&self, start_x: i64, start_y: i64, end_x: i64, end_y: i64, duration_ms: i64)
        -> Result<()>;

    /// Scroll until the element is in view.
    fn scroll_to(&self, strategy: &str, value: &str) -> Result<()>;

    /// Wait until the element is present and visible, up to `timeout_secs`.
    fn wait_for_element(&self, strategy: &str, value: &str, timeout_secs: i64) -> Result<()>;
}

/// True if `name` is one of the reserved capability primitives.
pub fn is_capability_name(name: &str) -> bool {
    REQUIRED_CAPABILITIES.iter().any(|(n, _)| *n == name)
}
