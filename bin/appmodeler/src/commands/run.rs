use std::sync::Arc;

use appmodeler_core::config::AiConfig;
use appmodeler_core::{ActionRecord, Config, Paths, Result};
use appmodeler_driver::WebDriverConnector;
use appmodeler_engine::{AssistantFactory, EngineEvent, SessionEngine};
use appmodeler_provider::{Assistant, OpenAiAssistant};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

struct OpenAiFactory;

impl AssistantFactory for OpenAiFactory {
    fn create(&self, config: &AiConfig) -> Result<Arc<dyn Assistant>> {
        Ok(Arc::new(OpenAiAssistant::new(config)?))
    }
}

pub async fn run(connect_now: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let config = Config::load_or_default(&paths)?;
    info!(server = %config.driver.server_url, platform = %config.driver.platform, "Starting modeling shell");

    let engine = Arc::new(SessionEngine::new(
        config,
        Box::new(WebDriverConnector),
        Box::new(OpenAiFactory),
    ));

    // Event printer; everything the engine announces lands here.
    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("appmodeler interactive shell (help for commands, quit to exit)");
    println!();

    if connect_now {
        let _ = engine.connect().await;
    }

    let shell_engine = engine.clone();
    let shell_paths = paths.clone();
    let stdin_handle = tokio::task::spawn_blocking(move || {
        use std::io::{BufRead, Write};
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        let local_rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to create local runtime for stdin");

        loop {
            print!("> ");
            let _ = stdout.flush();

            let mut raw_input = String::new();
            if stdin.lock().read_line(&mut raw_input).unwrap_or(0) == 0 {
                break;
            }
            let input = raw_input.trim();
            if input.is_empty() {
                continue;
            }
            if input == "quit" || input == "exit" {
                break;
            }

            let (command, rest) = match input.split_once(' ') {
                Some((c, r)) => (c, r.trim()),
                None => (input, ""),
            };

            match command {
                "help" => print_help(),
                "state" => println!("  state: {}", shell_engine.state()),
                // Operation failures are announced by the event printer via
                // TaskFailed, so the shell ignores the returned error here.
                "connect" => {
                    let _ = local_rt.block_on(shell_engine.connect());
                }
                "analyse" | "analyze" => {
                    let _ = local_rt.block_on(shell_engine.analyse());
                }
                "import" => {
                    let _ = local_rt.block_on(shell_engine.import_view());
                }
                "suggest" => {
                    let suggestions = local_rt.block_on(shell_engine.suggestions());
                    if suggestions.is_empty() {
                        println!("  (no suggestions, run analyse first)");
                    }
                    for (i, record) in suggestions.iter().enumerate() {
                        println!("  {}. [{}] {}", i + 1, record.view, record.call_string());
                    }
                }
                "execute" => {
                    let suggestions = local_rt.block_on(shell_engine.suggestions());
                    match rest.parse::<usize>() {
                        Ok(n) if n >= 1 && n <= suggestions.len() => {
                            let record = suggestions[n - 1].clone();
                            let _ = local_rt.block_on(shell_engine.execute(record));
                        }
                        _ => println!("  Usage: execute <suggestion number>"),
                    }
                }
                "call" => {
                    // Raw call text against the current view, e.g.
                    //   call enter_username("alice")
                    let view = local_rt.block_on(shell_engine.current_view());
                    match view {
                        None => println!("  (no current view, run analyse first)"),
                        Some(view) => match ActionRecord::parse_call(&view, rest) {
                            Ok(record) => {
                                let _ = local_rt.block_on(shell_engine.execute(record));
                            }
                            Err(e) => println!("  ❌ {}", e),
                        },
                    }
                }
                "history" => {
                    let history = local_rt.block_on(shell_engine.history());
                    if history.is_empty() {
                        println!("  (history is empty)");
                    }
                    for (i, record) in history.iter().enumerate() {
                        let outcome = match (&record.result, &record.error) {
                            (_, Some(error)) => format!("❌ {}", error),
                            (Some(result), None) => format!("=> {}", result),
                            (None, None) => "ok".to_string(),
                        };
                        println!(
                            "  {}. [{}] {} {}",
                            i + 1,
                            record.view,
                            record.call_string(),
                            outcome
                        );
                    }
                }
                "export" => {
                    let dir = if rest.is_empty() {
                        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
                        shell_paths.export_dir().join(stamp.to_string())
                    } else {
                        std::path::PathBuf::from(rest)
                    };
                    match local_rt.block_on(shell_engine.export(dir)) {
                        Ok(written) => {
                            for path in &written {
                                println!("  📄 {}", path.display());
                            }
                        }
                        Err(e) => println!("  ❌ {}", e),
                    }
                }
                "tokens" => {
                    let used = local_rt.block_on(shell_engine.used_tokens());
                    println!("  tokens used: {}", used);
                }
                "disconnect" => {
                    let _ = local_rt.block_on(shell_engine.disconnect());
                }
                _ => println!("  Unknown command '{}' (help for commands)", command),
            }
        }
    });

    let _ = stdin_handle.await;
    let _ = engine.disconnect().await;
    printer.abort();
    Ok(())
}

fn print_help() {
    println!("  connect             open the driver session");
    println!("  analyse             capture the screen and model the current view");
    println!("  import              bind the current view's generated code");
    println!("  suggest             list suggested next actions");
    println!("  execute <n>         run suggestion number n");
    println!("  call <action(...)>  run a raw call against the current view");
    println!("  history             show all executed calls");
    println!("  export [dir]        write sources, screenshots and replay script");
    println!("  tokens              show AI tokens used this session");
    println!("  state               show the engine state");
    println!("  disconnect          close the driver session");
    println!("  quit                exit the shell");
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::Busy(_) => {}
        EngineEvent::Connected => println!("✅ Connected"),
        EngineEvent::Disconnected => println!("🔌 Disconnected"),
        EngineEvent::Screenshot(png) => {
            println!("📸 Screenshot captured ({} bytes)", png.len());
        }
        EngineEvent::ElementsReady(json) => {
            println!("🔍 Elements on screen:");
            println!("{}", json);
        }
        EngineEvent::CodeReady { view, source } => {
            println!("📦 Interaction code for {} ({} lines)", view, source.lines().count());
        }
        EngineEvent::SuggestionsReady(candidates) => {
            println!("💡 Suggested next actions:");
            for (i, record) in candidates.iter().enumerate() {
                println!("  {}. [{}] {}", i + 1, record.view, record.call_string());
            }
        }
        EngineEvent::ViewImported(view) => println!("✅ {} imported", view),
        EngineEvent::Executed { call, result, .. } => match result {
            Some(result) => println!("▶ {} => {}", call, result),
            None => println!("▶ {}", call),
        },
        EngineEvent::TaskFailed { operation, message } => {
            println!("❌ {} failed: {}", operation, message);
        }
    }
}
