use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use appmodeler_core::{KwargValue, Result};

use crate::session::ModelSession;

/// Write the recorded session to `dir` for later replay: one `.rhai` source
/// and one `.png` screenshot per view referenced by the call history, plus a
/// `replay.rhai` that restates every history step as a `step(...)` call.
///
/// A history entry whose view is no longer findable is skipped with a
/// warning; the rest of the export proceeds.
pub fn export_session(session: &ModelSession, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    let mut exported: HashSet<String> = HashSet::new();
    let mut steps = String::new();

    for (i, record) in session.history.iter().enumerate() {
        let view = match session.find_by_name(&record.view) {
            Some(view) => view,
            None => {
                warn!(view = %record.view, "History step references an unknown view, skipping");
                continue;
            }
        };

        if exported.insert(view.name.clone()) {
            let source_path = dir.join(format!("{}.rhai", view.name));
            std::fs::write(&source_path, &view.source)?;
            written.push(source_path);

            let shot_path = dir.join(format!("{}.png", view.name));
            std::fs::write(&shot_path, &view.screenshot)?;
            written.push(shot_path);
        }

        steps.push_str(&format!(
            "// step {}: {}\nstep({:?}, {:?}, {}, {});\n\n",
            i + 1,
            record.call_string(),
            record.view,
            record.action,
            args_literal(record.get_args()),
            kwargs_literal(record.get_kwargs()),
        ));
    }

    let mut replay = String::from(
        "// Replay of a recorded modeling session.\n\
         // Each step names the view, the action selector, the positional\n\
         // arguments and the keyword arguments to feed back to the engine.\n\n",
    );
    replay.push_str(&steps);
    let replay_path = dir.join("replay.rhai");
    std::fs::write(&replay_path, replay)?;
    written.push(replay_path);

    info!(files = written.len(), dir = %dir.display(), "Session exported");
    Ok(written)
}

fn args_literal(args: Vec<String>) -> String {
    let quoted: Vec<String> = args.iter().map(|a| format!("{:?}", a)).collect();
    format!("[{}]", quoted.join(", "))
}

fn kwargs_literal(kwargs: Vec<(String, KwargValue)>) -> String {
    let pairs: Vec<String> = kwargs
        .iter()
        .map(|(k, v)| match v {
            KwargValue::Str(s) => format!("{}: {:?}", k, s),
            KwargValue::Int(n) => format!("{}: {}", k, n),
        })
        .collect();
    format!("#{{{}}}", pairs.join(", "))
}
