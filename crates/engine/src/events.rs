use appmodeler_core::ActionRecord;

/// Domain events published on the engine's broadcast channel.
///
/// Not buffered for late subscribers; subscribe before issuing the command
/// whose events you want to see.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A background operation started (`true`) or finished (`false`).
    Busy(bool),
    Connected,
    Disconnected,
    /// Raw PNG of the screen just captured.
    Screenshot(Vec<u8>),
    /// Pretty-printed JSON of the element snapshot.
    ElementsReady(String),
    /// Interaction source for the current view, freshly generated or pulled
    /// from the cache.
    CodeReady { view: String, source: String },
    SuggestionsReady(Vec<ActionRecord>),
    ViewImported(String),
    Executed {
        view: String,
        call: String,
        result: Option<String>,
    },
    /// Every background failure funnels here, once per failed operation.
    TaskFailed { operation: String, message: String },
}

/// Engine lifecycle, published on a watch channel. Initial state is
/// `Disconnected`; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Disconnected,
    Connecting,
    Connected,
    Analysing,
    Importing,
    Executing,
    Disconnecting,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EngineState::Disconnected => "disconnected",
            EngineState::Connecting => "connecting",
            EngineState::Connected => "connected",
            EngineState::Analysing => "analysing",
            EngineState::Importing => "importing",
            EngineState::Executing => "executing",
            EngineState::Disconnecting => "disconnecting",
        };
        f.write_str(label)
    }
}
