use regex::Regex;
use rhai::{Dynamic, Engine, Scope, AST};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use appmodeler_core::capability::is_capability_name;
use appmodeler_core::{LoadError, Result, UiCapability};

use crate::bound::BoundView;
use crate::bridge::CapabilityBridge;

const DEFAULT_MAX_OPERATIONS: u64 = 100_000;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Sandbox limits for loaded view scripts.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub max_operations: u64,
    pub timeout_secs: u64,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
    pub max_call_stack_depth: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_string_size: 1_000_000,
            max_array_size: 10_000,
            max_map_size: 10_000,
            max_call_stack_depth: 64,
        }
    }
}

/// One callable action exported by a view script, in definition order.
#[derive(Debug, Clone)]
pub struct ActionSignature {
    pub name: String,
    pub params: Vec<String>,
}

/// Operation and timeout guard shared between load-time resolution and every dispatch.
/// Reset before each script entry so the limits apply per call, not
/// cumulatively over the life of the bound view.
pub(crate) struct ExecutionGuard {
    ops: Arc<AtomicU64>,
    deadline: Arc<Mutex<Instant>>,
    max_operations: u64,
    timeout: Duration,
}

impl ExecutionGuard {
    fn new(max_operations: u64, timeout: Duration) -> Self {
        Self {
            ops: Arc::new(AtomicU64::new(0)),
            deadline: Arc::new(Mutex::new(Instant::now() + timeout)),
            max_operations,
            timeout,
        }
    }

    fn install(&self, engine: &mut Engine) {
        let ops = self.ops.clone();
        let deadline = self.deadline.clone();
        let max_ops = self.max_operations;
        let timeout_secs = self.timeout.as_secs();
        engine.on_progress(move |_| {
            let count = ops.fetch_add(1, Ordering::Relaxed);
            if count >= max_ops {
                return Some(Dynamic::from(format!(
                    "Operation limit exceeded: {} operations",
                    max_ops
                )));
            }
            if let Ok(guard) = deadline.lock() {
                if Instant::now() > *guard {
                    return Some(Dynamic::from(format!(
                        "Timeout exceeded: {} seconds",
                        timeout_secs
                    )));
                }
            }
            None
        });
    }

    pub(crate) fn reset(&self) {
        self.ops.store(0, Ordering::Relaxed);
        if let Ok(mut guard) = self.deadline.lock() {
            *guard = Instant::now() + self.timeout;
        }
    }
}

/// Compiles generated view scripts, verifies their shape and binds them to a
/// live capability implementation.
pub struct ViewLoader {
    config: LoaderConfig,
}

impl ViewLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    fn create_engine(&self) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_string_size(self.config.max_string_size);
        engine.set_max_array_size(self.config.max_array_size);
        engine.set_max_map_size(self.config.max_map_size);
        engine.set_max_call_levels(self.config.max_call_stack_depth);
        engine.set_max_expr_depths(64, 64);
        engine
    }

    /// Compile `source`, verify it resolves to `expected_name` and bind it to
    /// `ui`. The three checks fail with distinct kinds:
    ///
    /// - a syntax error is `Compile`;
    /// - redefining a primitive or exporting no actions is
    ///   `CapabilityMismatch`;
    /// - a missing or mismatched `view_name()` is `MissingView`.
    pub fn load(
        &self,
        expected_name: &str,
        source: &str,
        ui: Arc<dyn UiCapability>,
    ) -> Result<BoundView> {
        let bridge = CapabilityBridge::new(ui);
        let mut engine = self.create_engine();
        bridge.register(&mut engine);

        let guard = ExecutionGuard::new(
            self.config.max_operations,
            Duration::from_secs(self.config.timeout_secs),
        );
        guard.install(&mut engine);

        let ast = engine
            .compile(source)
            .map_err(|e| LoadError::Compile(e.to_string()))?;

        for func in ast.iter_functions() {
            if is_capability_name(func.name) {
                return Err(LoadError::CapabilityMismatch(format!(
                    "script redefines primitive '{}'",
                    func.name
                ))
                .into());
            }
        }

        let actions = actions_in_source_order(source, &ast);
        if actions.is_empty() {
            return Err(LoadError::CapabilityMismatch(format!(
                "script for '{}' exports no actions",
                expected_name
            ))
            .into());
        }

        guard.reset();
        let mut scope = Scope::new();
        let resolved: String = engine
            .call_fn(&mut scope, &ast, "view_name", ())
            .map_err(|e| {
                LoadError::MissingView(format!(
                    "script does not resolve view '{}': {}",
                    expected_name, e
                ))
            })?;
        if resolved != expected_name {
            return Err(LoadError::MissingView(format!(
                "script resolves to '{}', expected '{}'",
                resolved, expected_name
            ))
            .into());
        }

        debug!(
            view = expected_name,
            actions = actions.len(),
            "View script bound"
        );
        Ok(BoundView::new(
            expected_name.to_string(),
            engine,
            ast,
            actions,
            bridge,
            guard,
        ))
    }
}

impl Default for ViewLoader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

/// Exported actions in the order they appear in the source text.
///
/// The AST is the authority on which functions exist, but its iteration
/// order is unspecified, and selector patterns resolve to the first match in
/// definition order. A source scan recovers that order; AST entries the scan
/// misses are appended at the end.
fn actions_in_source_order(source: &str, ast: &AST) -> Vec<ActionSignature> {
    let mut defined: HashSet<&str> = HashSet::new();
    for func in ast.iter_functions() {
        if func.name != "view_name" {
            defined.insert(func.name);
        }
    }

    // Anchored at line start so commented-out definitions are skipped; the
    // AST cross-check catches anything else that is not a real function.
    let pattern = Regex::new(r"(?m)^\s*fn\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)")
        .expect("static pattern compiles");

    let mut actions = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for caps in pattern.captures_iter(source) {
        let name = &caps[1];
        if !defined.contains(name) || seen.contains(name) {
            continue;
        }
        let params = caps[2]
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        seen.insert(name.to_string());
        actions.push(ActionSignature {
            name: name.to_string(),
            params,
        });
    }

    for func in ast.iter_functions() {
        if func.name != "view_name" && !seen.contains(func.name) {
            actions.push(ActionSignature {
                name: func.name.to_string(),
                params: func.params.iter().map(|p| p.to_string()).collect(),
            });
        }
    }
    actions
}
