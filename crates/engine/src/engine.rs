use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};

use appmodeler_core::config::{AiConfig, Config};
use appmodeler_core::{ActionRecord, Error, Result};
use appmodeler_driver::{DriverConnector, DriverSession};
use appmodeler_provider::{ActionAdvisor, Assistant, ViewSynthesizer};
use appmodeler_views::ViewLoader;

use crate::events::{EngineEvent, EngineState};
use crate::export::export_session;
use crate::runner::TaskRunner;
use crate::session::{ModelSession, View};

/// Builds the assistant when a session is opened, so a bad key or endpoint
/// fails the connect operation instead of process startup.
pub trait AssistantFactory: Send + Sync {
    fn create(&self, config: &AiConfig) -> Result<Arc<dyn Assistant>>;
}

enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Analyse {
        reply: oneshot::Sender<Result<String>>,
    },
    Import {
        reply: oneshot::Sender<Result<String>>,
    },
    Execute {
        record: ActionRecord,
        reply: oneshot::Sender<Result<ActionRecord>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    Export {
        dir: PathBuf,
        reply: oneshot::Sender<Result<Vec<PathBuf>>>,
    },
    CurrentView {
        reply: oneshot::Sender<Option<String>>,
    },
    Suggestions {
        reply: oneshot::Sender<Vec<ActionRecord>>,
    },
    History {
        reply: oneshot::Sender<Vec<ActionRecord>>,
    },
    UsedTokens {
        reply: oneshot::Sender<u64>,
    },
}

/// Handle to the session engine.
///
/// All five operations run on a single worker task that owns the driver and
/// the assistant exclusively. The command channel holds one pending command,
/// so a second caller waits for the in-flight operation to finish; nothing
/// is cancelled and nothing runs concurrently.
pub struct SessionEngine {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<EngineEvent>,
    state: watch::Receiver<EngineState>,
}

impl SessionEngine {
    pub fn new(
        config: Config,
        connector: Box<dyn DriverConnector>,
        assistant_factory: Box<dyn AssistantFactory>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let (state_tx, state_rx) = watch::channel(EngineState::Disconnected);
        let (cmd_tx, cmd_rx) = mpsc::channel(1);

        let worker = EngineWorker {
            config,
            connector,
            assistant_factory,
            runner: TaskRunner::new(events.clone()),
            events: events.clone(),
            state: state_tx,
            driver: None,
            assistant: None,
            session: ModelSession::default(),
            current_view: None,
            view_seq: 0,
        };
        tokio::spawn(worker.run(cmd_rx));

        Self {
            commands: cmd_tx,
            events,
            state: state_rx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub async fn connect(&self) -> Result<()> {
        self.send(|reply| Command::Connect { reply }).await?
    }

    /// Returns the name of the view the current screen resolved to.
    pub async fn analyse(&self) -> Result<String> {
        self.send(|reply| Command::Analyse { reply }).await?
    }

    pub async fn import_view(&self) -> Result<String> {
        self.send(|reply| Command::Import { reply }).await?
    }

    /// Returns the record with `result` or `error` filled in; failures are
    /// also re-raised after being appended to the history.
    pub async fn execute(&self, record: ActionRecord) -> Result<ActionRecord> {
        self.send(|reply| Command::Execute { record, reply }).await?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.send(|reply| Command::Disconnect { reply }).await?
    }

    pub async fn export(&self, dir: PathBuf) -> Result<Vec<PathBuf>> {
        self.send(|reply| Command::Export { dir, reply }).await?
    }

    pub async fn current_view(&self) -> Option<String> {
        self.send(|reply| Command::CurrentView { reply })
            .await
            .unwrap_or(None)
    }

    /// Latest candidates for the current view, empty when nothing was
    /// analysed yet.
    pub async fn suggestions(&self) -> Vec<ActionRecord> {
        self.send(|reply| Command::Suggestions { reply })
            .await
            .unwrap_or_default()
    }

    pub async fn history(&self) -> Vec<ActionRecord> {
        self.send(|reply| Command::History { reply })
            .await
            .unwrap_or_default()
    }

    pub async fn used_tokens(&self) -> u64 {
        self.send(|reply| Command::UsedTokens { reply })
            .await
            .unwrap_or(0)
    }

    async fn send<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| worker_gone())?;
        rx.await.map_err(|_| worker_gone())
    }
}

fn worker_gone() -> Error {
    Error::Execution("engine worker stopped".to_string())
}

struct EngineWorker {
    config: Config,
    connector: Box<dyn DriverConnector>,
    assistant_factory: Box<dyn AssistantFactory>,
    runner: TaskRunner,
    events: broadcast::Sender<EngineEvent>,
    state: watch::Sender<EngineState>,
    driver: Option<Box<dyn DriverSession>>,
    assistant: Option<Arc<dyn Assistant>>,
    session: ModelSession,
    current_view: Option<usize>,
    view_seq: usize,
}

impl EngineWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Connect { reply } => {
                    let _ = reply.send(self.handle_connect().await);
                }
                Command::Analyse { reply } => {
                    let _ = reply.send(self.handle_analyse().await);
                }
                Command::Import { reply } => {
                    let _ = reply.send(self.handle_import().await);
                }
                Command::Execute { record, reply } => {
                    let _ = reply.send(self.handle_execute(record).await);
                }
                Command::Disconnect { reply } => {
                    let _ = reply.send(self.handle_disconnect().await);
                }
                Command::Export { dir, reply } => {
                    let runner = self.runner.clone();
                    let result = runner
                        .run("export", async { export_session(&self.session, &dir) })
                        .await;
                    let _ = reply.send(result);
                }
                Command::CurrentView { reply } => {
                    let name = self
                        .current_view
                        .and_then(|i| self.session.views.get(i))
                        .map(|v| v.name.clone());
                    let _ = reply.send(name);
                }
                Command::Suggestions { reply } => {
                    let candidates = self
                        .current_view
                        .and_then(|i| self.session.views.get(i))
                        .map(|v| v.candidates.clone())
                        .unwrap_or_default();
                    let _ = reply.send(candidates);
                }
                Command::History { reply } => {
                    let _ = reply.send(self.session.history.clone());
                }
                Command::UsedTokens { reply } => {
                    let total = self.assistant.as_ref().map(|a| a.used_tokens()).unwrap_or(0);
                    let _ = reply.send(total);
                }
            }
        }
    }

    fn set_state(&self, state: EngineState) {
        let _ = self.state.send(state);
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Common epilogue for operations that run while connected: a lost
    /// driver session drops everything live and lands in Disconnected, any
    /// other outcome returns to Connected.
    fn finish_op<T>(&mut self, result: &Result<T>) {
        match result {
            Err(e) if e.is_connection_lost() => {
                self.driver = None;
                self.assistant = None;
                self.session.clear_bindings();
                self.set_state(EngineState::Disconnected);
                self.emit(EngineEvent::Disconnected);
            }
            _ => self.set_state(EngineState::Connected),
        }
    }

    async fn handle_connect(&mut self) -> Result<()> {
        self.set_state(EngineState::Connecting);
        let runner = self.runner.clone();
        let result = runner.run("connect", self.do_connect()).await;
        match &result {
            Ok(()) => {
                self.set_state(EngineState::Connected);
                self.emit(EngineEvent::Connected);
            }
            Err(_) => {
                // Never wedge in Connecting: any connect failure lands back
                // in Disconnected.
                self.driver = None;
                self.assistant = None;
                self.set_state(EngineState::Disconnected);
                self.emit(EngineEvent::Disconnected);
            }
        }
        result
    }

    async fn do_connect(&mut self) -> Result<()> {
        if self.driver.is_some() {
            return Err(Error::Validation("already connected".to_string()));
        }
        let driver = self.connector.open(&self.config.driver).await?;
        let assistant = self.assistant_factory.create(&self.config.ai)?;
        let screenshot = driver.screenshot().await?;
        info!(server = %self.config.driver.server_url, "Driver session opened");
        self.driver = Some(driver);
        self.assistant = Some(assistant);
        self.emit(EngineEvent::Screenshot(screenshot));
        Ok(())
    }

    async fn handle_analyse(&mut self) -> Result<String> {
        self.set_state(EngineState::Analysing);
        let runner = self.runner.clone();
        let result = runner.run("analyse", self.do_analyse()).await;
        self.finish_op(&result);
        result
    }

    async fn do_analyse(&mut self) -> Result<String> {
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| Error::Connection("not connected".to_string()))?;
        let assistant = self
            .assistant
            .clone()
            .ok_or_else(|| Error::Connection("not connected".to_string()))?;

        let screenshot = driver.screenshot().await?;
        self.emit(EngineEvent::Screenshot(screenshot.clone()));

        // Zero usable elements fails the pass here; the cache stays as-is.
        let elements = driver.elements().await?;

        let index = match self.session.find_by_snapshot(&elements) {
            Some(index) => {
                debug!(view = %self.session.views[index].name, "Screen matches cached view");
                index
            }
            None => {
                let name = format!("View{}", self.view_seq);
                self.view_seq += 1;
                let synthesizer = ViewSynthesizer::new(
                    assistant.as_ref(),
                    &self.config.ai.class_generator_prompt,
                );
                let source = synthesizer.generate(&name, &elements).await?;
                info!(view = %name, elements = elements.len(), "New view modeled");
                self.session.views.push(View {
                    name,
                    screenshot,
                    elements,
                    source,
                    candidates: Vec::new(),
                    bound: None,
                });
                self.session.views.len() - 1
            }
        };

        // Suggestions refresh on every pass, cache hit or miss, because the
        // call history they condition on has moved.
        let api = view_api(&self.session.views[index]);
        let advisor = ActionAdvisor::new(assistant.as_ref(), &self.config.ai.tester_prompt);
        let candidates = advisor.suggest(&api, &self.session.history).await?;

        self.session.views[index].candidates = candidates.clone();
        self.current_view = Some(index);

        let view = &self.session.views[index];
        self.emit(EngineEvent::ElementsReady(view.elements.to_json_pretty()));
        self.emit(EngineEvent::CodeReady {
            view: view.name.clone(),
            source: view.source.clone(),
        });
        self.emit(EngineEvent::SuggestionsReady(candidates));
        Ok(view.name.clone())
    }

    async fn handle_import(&mut self) -> Result<String> {
        self.set_state(EngineState::Importing);
        let runner = self.runner.clone();
        let result = runner.run("import", self.do_import()).await;
        self.finish_op(&result);
        result
    }

    async fn do_import(&mut self) -> Result<String> {
        let index = self
            .current_view
            .ok_or_else(|| Error::Validation("no view analysed yet".to_string()))?;
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| Error::Connection("not connected".to_string()))?;

        let ui = driver.ui();
        let name = self.session.views[index].name.clone();
        let source = self.session.views[index].source.clone();

        // view_name() resolution may touch UI primitives, which block, so
        // the whole load runs off the async worker.
        let loaded_name = name.clone();
        let bound = tokio::task::spawn_blocking(move || {
            ViewLoader::default().load(&loaded_name, &source, ui)
        })
        .await
        .map_err(|e| Error::Execution(format!("import task failed: {}", e)))??;

        self.session.clear_bindings();
        self.session.views[index].bound = Some(Arc::new(bound));
        info!(view = %name, "View imported");
        self.emit(EngineEvent::ViewImported(name.clone()));
        Ok(name)
    }

    async fn handle_execute(&mut self, record: ActionRecord) -> Result<ActionRecord> {
        self.set_state(EngineState::Executing);
        let runner = self.runner.clone();
        let result = runner.run("execute", self.do_execute(record)).await;
        self.finish_op(&result);
        result
    }

    async fn do_execute(&mut self, mut record: ActionRecord) -> Result<ActionRecord> {
        // Grammar failures are rejected outright and leave no trace in the
        // history; everything past this point is an attempt and is recorded.
        record.validate()?;
        let selector = record.selector()?;

        let outcome = async {
            let view = self
                .session
                .find_by_name(&record.view)
                .ok_or_else(|| Error::Execution(format!("unknown view '{}'", record.view)))?;
            let bound = view.bound.clone().ok_or_else(|| {
                Error::Execution(format!("view '{}' is not imported", record.view))
            })?;
            let action = bound
                .resolve(&selector)
                .ok_or_else(|| {
                    Error::Execution(format!(
                        "no action of '{}' matches '{}'",
                        record.view, record.action
                    ))
                })?
                .to_string();

            let args = record.get_args();
            let kwargs = record.get_kwargs();
            tokio::task::spawn_blocking(move || bound.dispatch(&action, &args, &kwargs))
                .await
                .map_err(|e| Error::Execution(format!("dispatch task failed: {}", e)))?
        }
        .await;

        match outcome {
            Ok(result) => {
                record.result = result;
                self.session.record_call(record.clone());
                self.emit(EngineEvent::Executed {
                    view: record.view.clone(),
                    call: record.call_string(),
                    result: record.result.clone(),
                });
                Ok(record)
            }
            Err(e) => {
                record.error = Some(e.to_string());
                self.session.record_call(record);
                Err(e)
            }
        }
    }

    async fn handle_disconnect(&mut self) -> Result<()> {
        self.set_state(EngineState::Disconnecting);
        let runner = self.runner.clone();
        let result = runner.run("disconnect", self.do_disconnect()).await;
        // Disconnect always lands here and always announces itself, even
        // when there was nothing to close.
        self.set_state(EngineState::Disconnected);
        self.emit(EngineEvent::Disconnected);
        result
    }

    async fn do_disconnect(&mut self) -> Result<()> {
        self.assistant = None;
        self.session.clear_bindings();
        if let Some(driver) = self.driver.take() {
            driver.close().await?;
        }
        Ok(())
    }
}

/// What the advisor sees: the bound API when the view is imported, the raw
/// source otherwise.
fn view_api(view: &View) -> serde_json::Value {
    match &view.bound {
        Some(bound) => bound.describe(),
        None => serde_json::json!({ "view": view.name, "source": view.source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appmodeler_core::config::DriverConfig;
    use appmodeler_core::{ElementDescriptor, ElementSnapshot, UiCapability};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubUi {
        calls: Mutex<Vec<String>>,
    }

    impl StubUi {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl UiCapability for StubUi {
        fn click(&self, strategy: &str, value: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("click {} {}", strategy, value));
            Ok(())
        }

        fn enter_text(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        fn get_text(&self, _: &str, _: &str) -> Result<String> {
            Ok("text".to_string())
        }

        fn is_displayed(&self, _: &str, _: &str) -> Result<bool> {
            Ok(true)
        }

        fn swipe(&self, _: i64, _: i64, _: i64, _: i64, _: i64) -> Result<()> {
            Ok(())
        }

        fn scroll_to(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        fn wait_for_element(&self, _: &str, _: &str, _: i64) -> Result<()> {
            Ok(())
        }
    }

    struct MockDriverSession {
        screen: Arc<Mutex<ElementSnapshot>>,
        ui: Arc<StubUi>,
    }

    #[async_trait]
    impl DriverSession for MockDriverSession {
        async fn screenshot(&self) -> Result<Vec<u8>> {
            Ok(vec![0x89, 0x50])
        }

        async fn elements(&self) -> Result<ElementSnapshot> {
            let snapshot = self.screen.lock().unwrap().clone();
            if snapshot.is_empty() {
                return Err(Error::Discovery("no usable elements".to_string()));
            }
            Ok(snapshot)
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn ui(&self) -> Arc<dyn UiCapability> {
            self.ui.clone()
        }
    }

    struct MockConnector {
        screen: Arc<Mutex<ElementSnapshot>>,
        ui: Arc<StubUi>,
        fail: bool,
    }

    #[async_trait]
    impl DriverConnector for MockConnector {
        async fn open(&self, _config: &DriverConfig) -> Result<Box<dyn DriverSession>> {
            if self.fail {
                return Err(Error::Connection("driver unreachable".to_string()));
            }
            Ok(Box::new(MockDriverSession {
                screen: self.screen.clone(),
                ui: self.ui.clone(),
            }))
        }
    }

    /// Canned assistant. Generation responses define one clickable action;
    /// the view name is scraped from the substituted prompt.
    struct MockAssistant {
        generations: AtomicUsize,
        suggestions: AtomicUsize,
    }

    impl MockAssistant {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                generations: AtomicUsize::new(0),
                suggestions: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Assistant for MockAssistant {
        async fn ask(&self, prompt: &str, schema_name: &str, _schema: Value) -> Result<Value> {
            match schema_name {
                "view_implementation" => {
                    self.generations.fetch_add(1, Ordering::SeqCst);
                    let start = prompt.find("NAME=").unwrap() + 5;
                    let name: String = prompt[start..]
                        .chars()
                        .take_while(|c| c.is_ascii_alphanumeric())
                        .collect();
                    Ok(json!({
                        "implementation": format!(
                            "fn view_name() {{ \"{}\" }}\n\
                             fn click_ok() {{ click(\"xpath\", \"//ok\"); }}\n\
                             fn click_cancel() {{ click(\"xpath\", \"//cancel\"); }}\n",
                            name
                        )
                    }))
                }
                _ => {
                    self.suggestions.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({
                        "candidates": [
                            { "view": "View0", "action": "click_ok", "args": "", "kwargs": "" }
                        ]
                    }))
                }
            }
        }

        fn used_tokens(&self) -> u64 {
            42
        }
    }

    struct MockFactory {
        assistant: Arc<MockAssistant>,
    }

    impl AssistantFactory for MockFactory {
        fn create(&self, _config: &AiConfig) -> Result<Arc<dyn Assistant>> {
            Ok(self.assistant.clone())
        }
    }

    fn elem(text: &str, y: i64) -> ElementDescriptor {
        ElementDescriptor {
            text: text.to_string(),
            x: 0,
            y,
            kind: "button".to_string(),
            tag: "android.widget.Button".to_string(),
            resource_id: format!("id/{}", text),
            clickable: true,
            visible: true,
        }
    }

    struct Fixture {
        engine: SessionEngine,
        screen: Arc<Mutex<ElementSnapshot>>,
        ui: Arc<StubUi>,
        assistant: Arc<MockAssistant>,
    }

    fn fixture_with(fail_connect: bool) -> Fixture {
        let screen = Arc::new(Mutex::new(ElementSnapshot::new(vec![elem("ok", 0)])));
        let ui = StubUi::new();
        let assistant = MockAssistant::new();

        let mut config = Config::default();
        config.ai.class_generator_prompt = "NAME={class_name} {elements_json}".to_string();
        config.ai.tester_prompt = "api={class_api} steps={previous_steps}".to_string();

        let engine = SessionEngine::new(
            config,
            Box::new(MockConnector {
                screen: screen.clone(),
                ui: ui.clone(),
                fail: fail_connect,
            }),
            Box::new(MockFactory {
                assistant: assistant.clone(),
            }),
        );
        Fixture {
            engine,
            screen,
            ui,
            assistant,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(false)
    }

    fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_connect_success() {
        let f = fixture();
        let mut rx = f.engine.subscribe();
        f.engine.connect().await.unwrap();
        assert_eq!(f.engine.state(), EngineState::Connected);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Screenshot(_))));
        assert!(events.iter().any(|e| matches!(e, EngineEvent::Connected)));
    }

    #[tokio::test]
    async fn test_connect_failure_lands_disconnected() {
        let f = fixture_with(true);
        let mut rx = f.engine.subscribe();
        let err = f.engine.connect().await.unwrap_err();
        assert!(err.is_connection_lost());
        assert_eq!(f.engine.state(), EngineState::Disconnected);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::TaskFailed { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Disconnected)));
    }

    #[tokio::test]
    async fn test_analyse_announces_elements_then_code_then_suggestions() {
        let f = fixture();
        f.engine.connect().await.unwrap();

        let mut rx = f.engine.subscribe();
        let name = f.engine.analyse().await.unwrap();
        assert_eq!(name, "View0");

        let events = drain(&mut rx);
        let elements_at = events
            .iter()
            .position(|e| matches!(e, EngineEvent::ElementsReady(_)))
            .unwrap();
        let code_at = events
            .iter()
            .position(|e| matches!(e, EngineEvent::CodeReady { .. }))
            .unwrap();
        let suggestions_at = events
            .iter()
            .position(|e| matches!(e, EngineEvent::SuggestionsReady(_)))
            .unwrap();
        assert!(elements_at < code_at);
        assert!(code_at < suggestions_at);

        // The pass also stores the candidates on the analysed view.
        let suggestions = f.engine.suggestions().await;
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].action, "click_ok");
    }

    #[tokio::test]
    async fn test_analyse_twice_generates_once_suggests_twice() {
        let f = fixture();
        f.engine.connect().await.unwrap();

        let first = f.engine.analyse().await.unwrap();
        let second = f.engine.analyse().await.unwrap();
        assert_eq!(first, "View0");
        assert_eq!(second, "View0");
        assert_eq!(f.assistant.generations.load(Ordering::SeqCst), 1);
        assert_eq!(f.assistant.suggestions.load(Ordering::SeqCst), 2);
        assert_eq!(f.engine.suggestions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_changed_screen_models_new_view() {
        let f = fixture();
        f.engine.connect().await.unwrap();
        f.engine.analyse().await.unwrap();

        *f.screen.lock().unwrap() = ElementSnapshot::new(vec![elem("other", 80)]);
        let name = f.engine.analyse().await.unwrap();
        assert_eq!(name, "View1");
        assert_eq!(f.assistant.generations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_analyse_empty_screen_is_discovery_error() {
        let f = fixture();
        f.engine.connect().await.unwrap();
        f.engine.analyse().await.unwrap();

        *f.screen.lock().unwrap() = ElementSnapshot::default();
        let err = f.engine.analyse().await.unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
        // Cache and history untouched; the engine is still usable.
        assert_eq!(f.engine.state(), EngineState::Connected);
        assert!(f.engine.history().await.is_empty());
        assert_eq!(f.assistant.generations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_still_announces() {
        let f = fixture();
        let mut rx = f.engine.subscribe();
        f.engine.disconnect().await.unwrap();
        assert_eq!(f.engine.state(), EngineState::Disconnected);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Disconnected)));
    }

    #[tokio::test]
    async fn test_import_and_execute() {
        let f = fixture();
        f.engine.connect().await.unwrap();
        f.engine.analyse().await.unwrap();
        let name = f.engine.import_view().await.unwrap();
        assert_eq!(name, "View0");

        let record = ActionRecord::new("View0", "click_ok", "", "");
        let executed = f.engine.execute(record).await.unwrap();
        assert!(executed.error.is_none());
        assert_eq!(f.ui.calls.lock().unwrap().as_slice(), ["click xpath //ok"]);
        assert_eq!(f.engine.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_pattern_selector() {
        let f = fixture();
        f.engine.connect().await.unwrap();
        f.engine.analyse().await.unwrap();
        f.engine.import_view().await.unwrap();

        let record = ActionRecord::new("View0", "/click_.*/", "", "");
        f.engine.execute(record).await.unwrap();
        // First match in definition order is click_ok.
        assert_eq!(f.ui.calls.lock().unwrap().as_slice(), ["click xpath //ok"]);
    }

    #[tokio::test]
    async fn test_execute_validation_failure_leaves_no_history() {
        let f = fixture();
        f.engine.connect().await.unwrap();
        f.engine.analyse().await.unwrap();
        f.engine.import_view().await.unwrap();

        let record = ActionRecord::new("View0", "click_ok", "unquoted", "");
        let err = f.engine.execute(record).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(f.engine.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_execute_is_recorded_and_reraised() {
        let f = fixture();
        f.engine.connect().await.unwrap();
        f.engine.analyse().await.unwrap();
        f.engine.import_view().await.unwrap();

        let record = ActionRecord::new("View0", "no_such_action", "", "");
        let err = f.engine.execute(record).await.unwrap_err();
        assert!(matches!(err, Error::Execution(_)));

        let history = f.engine.history().await;
        assert_eq!(history.len(), 1);
        assert!(history[0].error.is_some());
    }

    #[tokio::test]
    async fn test_execute_without_import_is_recorded_failure() {
        let f = fixture();
        f.engine.connect().await.unwrap();
        f.engine.analyse().await.unwrap();

        let record = ActionRecord::new("View0", "click_ok", "", "");
        let err = f.engine.execute(record).await.unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
        assert_eq!(f.engine.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_history_counts_every_attempt() {
        let f = fixture();
        f.engine.connect().await.unwrap();
        f.engine.analyse().await.unwrap();
        f.engine.import_view().await.unwrap();

        let _ = f
            .engine
            .execute(ActionRecord::new("View0", "click_ok", "", ""))
            .await;
        let _ = f
            .engine
            .execute(ActionRecord::new("View0", "missing", "", ""))
            .await;
        let _ = f
            .engine
            .execute(ActionRecord::new("View0", "click_cancel", "", ""))
            .await;
        assert_eq!(f.engine.history().await.len(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_clears_bindings_keeps_views() {
        let f = fixture();
        f.engine.connect().await.unwrap();
        f.engine.analyse().await.unwrap();
        f.engine.import_view().await.unwrap();
        f.engine.disconnect().await.unwrap();

        // Reconnect: the cached view is found again without regeneration,
        // but execution needs a fresh import.
        f.engine.connect().await.unwrap();
        let name = f.engine.analyse().await.unwrap();
        assert_eq!(name, "View0");
        assert_eq!(f.assistant.generations.load(Ordering::SeqCst), 1);

        let err = f
            .engine
            .execute(ActionRecord::new("View0", "click_ok", "", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[tokio::test]
    async fn test_used_tokens_passthrough() {
        let f = fixture();
        f.engine.connect().await.unwrap();
        assert_eq!(f.engine.used_tokens().await, 42);
    }

    #[tokio::test]
    async fn test_export_after_session() {
        let f = fixture();
        f.engine.connect().await.unwrap();
        f.engine.analyse().await.unwrap();
        f.engine.import_view().await.unwrap();
        f.engine
            .execute(ActionRecord::new("View0", "click_ok", "", ""))
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let written = f.engine.export(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(written.len(), 3);
        assert!(dir.path().join("View0.rhai").exists());
        assert!(dir.path().join("replay.rhai").exists());
    }
}
