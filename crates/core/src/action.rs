use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// How an action record names its target: a plain method name, or a
/// `/…/`-delimited regex resolved against the bound view's action names,
/// first match in definition order.
#[derive(Debug, Clone)]
pub enum ActionSelector {
    Literal(String),
    Pattern(Regex),
}

impl ActionSelector {
    /// Parse the raw `action` field. A leading and trailing `/` makes the
    /// interior a regex; anything else must be a plain identifier.
    pub fn parse(action: &str) -> Result<Self> {
        let action = action.trim();
        if action.is_empty() {
            return Err(Error::Validation("action must not be empty".to_string()));
        }
        if let Some(inner) = action
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
        {
            if inner.is_empty() {
                return Err(Error::Validation("empty action pattern".to_string()));
            }
            // Full-string match: /click_.*/ must not match "unclick_x".
            let re = Regex::new(&format!("^(?:{})$", inner))
                .map_err(|e| Error::Validation(format!("invalid action pattern: {}", e)))?;
            return Ok(ActionSelector::Pattern(re));
        }
        if !is_identifier(action) {
            return Err(Error::Validation(format!(
                "action '{}' is not an identifier or /pattern/",
                action
            )));
        }
        Ok(ActionSelector::Literal(action.to_string()))
    }

    /// Resolve against candidate names, taking the first match in the order
    /// the candidates are enumerated.
    pub fn resolve<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self {
            ActionSelector::Literal(name) => {
                candidates.into_iter().find(|c| *c == name.as_str())
            }
            ActionSelector::Pattern(re) => candidates.into_iter().find(|c| re.is_match(c)),
        }
    }
}

/// A keyword-argument value: the grammar admits quoted strings and bare
/// integer literals, nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KwargValue {
    Str(String),
    Int(i64),
}

/// One proposed or executed interaction: target view, action selector and
/// raw argument text, plus the outcome once dispatched.
///
/// `args` and `kwargs` stay as the raw text the advisor produced (or the
/// operator typed); they are parsed on demand and validated before any
/// dispatch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub view: String,
    pub action: String,
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub kwargs: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionRecord {
    pub fn new(view: &str, action: &str, args: &str, kwargs: &str) -> Self {
        Self {
            view: view.to_string(),
            action: action.to_string(),
            args: args.to_string(),
            kwargs: kwargs.to_string(),
            result: None,
            error: None,
        }
    }

    pub fn has_args(&self) -> bool {
        !self.args.trim().is_empty()
    }

    pub fn has_kwargs(&self) -> bool {
        !self.kwargs.trim().is_empty()
    }

    /// Positional arguments: split on `,`, trim, strip surrounding quotes.
    ///
    /// A comma inside a quoted value is not supported and will split the
    /// value; known limitation of the grammar, kept as-is.
    pub fn get_args(&self) -> Vec<String> {
        if !self.has_args() {
            return Vec::new();
        }
        self.args
            .split(',')
            .map(|piece| piece.trim().trim_matches('"').to_string())
            .collect()
    }

    /// Keyword arguments in textual order. A piece that does not split into
    /// exactly `key=value` is dropped with a warning, never a parse failure.
    pub fn get_kwargs(&self) -> Vec<(String, KwargValue)> {
        if !self.has_kwargs() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for piece in self.kwargs.split(',') {
            let parts: Vec<&str> = piece.split('=').collect();
            if parts.len() != 2 {
                warn!(pair = piece.trim(), "Invalid key-value pair, dropping");
                continue;
            }
            let key = parts[0].trim().trim_matches('"').to_string();
            let raw = parts[1].trim();
            let value = if let Ok(n) = raw.parse::<i64>() {
                KwargValue::Int(n)
            } else {
                KwargValue::Str(raw.trim_matches('"').to_string())
            };
            out.push((key, value));
        }
        out
    }

    pub fn selector(&self) -> Result<ActionSelector> {
        ActionSelector::parse(&self.action)
    }

    /// Validate all grammar components. Must pass before dispatch is
    /// attempted; kwargs pieces without a `=` are a parse-time warning, not
    /// a validation failure.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.view) {
            return Err(Error::Validation(format!(
                "view '{}' is not an identifier",
                self.view
            )));
        }
        self.selector()?;
        if self.has_args() {
            for piece in self.args.split(',') {
                let piece = piece.trim();
                if piece.len() < 2 || !piece.starts_with('"') || !piece.ends_with('"') {
                    return Err(Error::Validation(format!(
                        "argument {} is not a double-quoted string",
                        piece
                    )));
                }
            }
        }
        if self.has_kwargs() {
            for piece in self.kwargs.split(',') {
                let parts: Vec<&str> = piece.split('=').collect();
                if parts.len() != 2 {
                    // Dropped at parse time; see get_kwargs().
                    continue;
                }
                let key = parts[0].trim();
                let bare_key = key.trim_matches('"');
                if !is_identifier(bare_key) {
                    return Err(Error::Validation(format!(
                        "kwarg key '{}' is not an identifier",
                        key
                    )));
                }
                let value = parts[1].trim();
                let quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
                if !quoted && value.parse::<i64>().is_err() {
                    return Err(Error::Validation(format!(
                        "kwarg value {} is neither a quoted string nor an integer",
                        value
                    )));
                }
            }
        }
        Ok(())
    }

    /// Render the call the way an operator would type it:
    /// `action(args)` or `action(args, kwargs)`.
    pub fn call_string(&self) -> String {
        let mut inner = String::new();
        if self.has_args() {
            inner.push_str(self.args.trim());
        }
        if self.has_kwargs() {
            if !inner.is_empty() {
                inner.push_str(", ");
            }
            inner.push_str(self.kwargs.trim());
        }
        format!("{}({})", self.action, inner)
    }

    /// Parse a call string back into a record for `view`. Inverse of
    /// `call_string`: positional arguments come first, keyword pairs start
    /// at the first top-level piece containing `=` outside quotes.
    pub fn parse_call(view: &str, text: &str) -> Result<Self> {
        let text = text.trim();
        let open = text.find('(').ok_or_else(|| {
            Error::Validation(format!("'{}' is not a call: missing '('", text))
        })?;
        if !text.ends_with(')') {
            return Err(Error::Validation(format!(
                "'{}' is not a call: missing trailing ')'",
                text
            )));
        }
        let action = &text[..open];
        let inner = &text[open + 1..text.len() - 1];

        let mut args_end = inner.len();
        let mut kwargs_start = inner.len();
        for (start, end) in split_top_level(inner) {
            if piece_has_top_level_eq(&inner[start..end]) {
                args_end = start;
                kwargs_start = start;
                break;
            }
            args_end = end;
        }
        let args = inner[..args_end].trim().trim_end_matches(',').trim();
        let kwargs = inner[kwargs_start..].trim();

        let record = Self::new(view, action, args, kwargs);
        record.validate()?;
        Ok(record)
    }
}

impl std::fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.call_string())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Byte spans of comma-separated pieces, ignoring commas inside quotes.
fn split_top_level(s: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                spans.push((start, i));
                start = i + 1;
            }
            _ => {}
        }
    }
    if start <= s.len() && !s[start..].trim().is_empty() {
        spans.push((start, s.len()));
    }
    spans
}

fn piece_has_top_level_eq(piece: &str) -> bool {
    let mut in_quotes = false;
    for c in piece.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '=' if !in_quotes => return true,
            _ => {}
        }
    }
    false
}
