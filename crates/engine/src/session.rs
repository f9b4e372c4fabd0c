use std::sync::Arc;
use tracing::debug;

use appmodeler_core::{ActionRecord, ElementSnapshot};
use appmodeler_views::BoundView;

/// One modeled screen. Views are appended to the session as new screens are
/// discovered and never removed; `candidates` and `bound` are refreshed in
/// place.
pub struct View {
    pub name: String,
    pub screenshot: Vec<u8>,
    pub elements: ElementSnapshot,
    /// Generated interaction script for this screen.
    pub source: String,
    /// Latest next-action proposals, replaced on every analyse pass that
    /// lands on this view.
    pub candidates: Vec<ActionRecord>,
    /// Present only after a successful import; cleared on disconnect.
    pub bound: Option<Arc<BoundView>>,
}

/// Process-lifetime aggregate: the view cache plus the append-only call
/// history. Created once at engine construction and never recreated, so a
/// reconnect keeps everything modeled so far.
#[derive(Default)]
pub struct ModelSession {
    pub views: Vec<View>,
    pub history: Vec<ActionRecord>,
}

impl ModelSession {
    /// Linear scan for a view whose snapshot equals `snapshot` element-wise
    /// in order. This is the whole deduplication mechanism; equal snapshots
    /// never produce two views.
    pub fn find_by_snapshot(&self, snapshot: &ElementSnapshot) -> Option<usize> {
        self.views.iter().position(|v| &v.elements == snapshot)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| v.name == name)
    }

    /// Append one executed attempt, success or failure.
    pub fn record_call(&mut self, record: ActionRecord) {
        debug!(call = %record, "Recording call");
        self.history.push(record);
    }

    /// Drop every live binding. Cached names, sources and screenshots stay.
    pub fn clear_bindings(&mut self) {
        for view in &mut self.views {
            view.bound = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appmodeler_core::ElementDescriptor;

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

    fn view(name: &str, elements: Vec<ElementDescriptor>) -> View {
        View {
            name: name.to_string(),
            screenshot: Vec::new(),
            elements: ElementSnapshot::new(elements),
            source: String::new(),
            candidates: Vec::new(),
            bound: None,
        }
    }

    #[test]
    fn test_cache_hit_requires_elementwise_equality() {
        let mut session = ModelSession::default();
        session.views.push(view("View0", vec![elem("ok", 0), elem("no", 40)]));

        let same = ElementSnapshot::new(vec![elem("ok", 0), elem("no", 40)]);
        assert_eq!(session.find_by_snapshot(&same), Some(0));

        let permuted = ElementSnapshot::new(vec![elem("no", 40), elem("ok", 0)]);
        assert_eq!(session.find_by_snapshot(&permuted), None);
    }

    #[test]
    fn test_find_by_name() {
        let mut session = ModelSession::default();
        session.views.push(view("View0", vec![elem("ok", 0)]));
        session.views.push(view("View1", vec![elem("no", 0)]));
        assert!(session.find_by_name("View1").is_some());
        assert!(session.find_by_name("View9").is_none());
    }

    #[test]
    fn test_history_is_append_only() {
        let mut session = ModelSession::default();
        session.record_call(ActionRecord::new("View0", "a", "", ""));
        session.record_call(ActionRecord::new("View0", "b", "", ""));
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[0].action, "a");
    }
}
