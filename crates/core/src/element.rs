use serde::{Deserialize, Serialize};

/// Pre-extracted element data for one interactive element on screen.
///
/// Equality is field-by-field, including location. Two otherwise identical
/// screens scrolled to different offsets therefore compare as different
/// snapshots and model as separate views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Visible text, empty when the element has none.
    pub text: String,
    pub x: i64,
    pub y: i64,
    /// Normalized element kind ("button", "input", ...), platform-mapped.
    pub kind: String,
    /// Raw tag / class name reported by the driver.
    pub tag: String,
    pub resource_id: String,
    pub clickable: bool,
    pub visible: bool,
}

/// Ordered capture of a screen's interactive elements at one instant.
///
/// This is the view-cache key: two snapshots are equal iff they have the
/// same length and every descriptor compares equal in order. No hashing,
/// no fuzzy matching; a permuted-but-equal set is a different snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ElementSnapshot(pub Vec<ElementDescriptor>);

impl ElementSnapshot {
    pub fn new(elements: Vec<ElementDescriptor>) -> Self {
        Self(elements)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ElementDescriptor> {
        self.0.iter()
    }

    /// Render the snapshot the way it is shown to the operator and fed to
    /// the synthesizer prompts.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem(text: &str, x: i64, y: i64) -> ElementDescriptor {
        ElementDescriptor {
            text: text.to_string(),
            x,
            y,
            kind: "button".to_string(),
            tag: "android.widget.Button".to_string(),
            resource_id: format!("id/{}", text),
            clickable: true,
            visible: true,
        }
    }

    #[test]
    fn test_snapshot_equality_is_ordered() {
        let a = ElementSnapshot::new(vec![elem("ok", 0, 0), elem("cancel", 0, 40)]);
        let b = ElementSnapshot::new(vec![elem("ok", 0, 0), elem("cancel", 0, 40)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_permuted_snapshot_is_different() {
        let a = ElementSnapshot::new(vec![elem("ok", 0, 0), elem("cancel", 0, 40)]);
        let b = ElementSnapshot::new(vec![elem("cancel", 0, 40), elem("ok", 0, 0)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_location_participates_in_equality() {
        let a = ElementSnapshot::new(vec![elem("ok", 0, 0)]);
        let b = ElementSnapshot::new(vec![elem("ok", 0, 120)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_length_is_different() {
        let a = ElementSnapshot::new(vec![elem("ok", 0, 0)]);
        let b = ElementSnapshot::new(vec![elem("ok", 0, 0), elem("cancel", 0, 40)]);
        assert_ne!(a, b);
    }
}
