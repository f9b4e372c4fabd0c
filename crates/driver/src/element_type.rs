use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Android widget class -> normalized element kind. Unlisted classes are
/// containers or decorations the modeler does not interact with.
static ANDROID_KINDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("android.widget.Button", "button"),
        ("android.widget.ImageButton", "button"),
        ("android.widget.EditText", "input"),
        ("android.widget.AutoCompleteTextView", "input"),
        ("android.widget.MultiAutoCompleteTextView", "input"),
        ("android.widget.TextView", "text"),
        ("android.widget.CheckBox", "checkbox"),
        ("android.widget.CheckedTextView", "checkbox"),
        ("android.widget.RadioButton", "radio"),
        ("android.widget.Switch", "switch"),
        ("android.widget.ToggleButton", "switch"),
        ("android.widget.Spinner", "dropdown"),
        ("android.widget.SeekBar", "slider"),
        ("android.widget.RatingBar", "slider"),
        ("android.widget.ImageView", "image"),
        ("android.widget.ListView", "list"),
        ("android.widget.GridView", "list"),
        ("androidx.recyclerview.widget.RecyclerView", "list"),
        ("android.widget.ScrollView", "scroll"),
        ("android.widget.HorizontalScrollView", "scroll"),
        ("android.widget.TabWidget", "tabbar"),
        ("android.webkit.WebView", "webview"),
    ])
});

/// XCUI element type -> normalized element kind (mac driver).
static MAC_KINDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("XCUIElementTypeButton", "button"),
        ("XCUIElementTypeTextField", "input"),
        ("XCUIElementTypeSecureTextField", "input"),
        ("XCUIElementTypeSearchField", "input"),
        ("XCUIElementTypeTextView", "input"),
        ("XCUIElementTypeStaticText", "text"),
        ("XCUIElementTypeCheckBox", "checkbox"),
        ("XCUIElementTypeRadioButton", "radio"),
        ("XCUIElementTypeSwitch", "switch"),
        ("XCUIElementTypePopUpButton", "dropdown"),
        ("XCUIElementTypeComboBox", "dropdown"),
        ("XCUIElementTypeSlider", "slider"),
        ("XCUIElementTypeImage", "image"),
        ("XCUIElementTypeTable", "list"),
        ("XCUIElementTypeOutline", "list"),
        ("XCUIElementTypeScrollView", "scroll"),
        ("XCUIElementTypeCell", "cell"),
        ("XCUIElementTypeLink", "link"),
        ("XCUIElementTypeMenuItem", "menuitem"),
        ("XCUIElementTypeTabGroup", "tabbar"),
    ])
});

pub const SUPPORTED_PLATFORMS: &[&str] = &["android", "mac"];

/// Standardized element kind, or None when the class is not something the
/// modeler treats as interactive.
pub fn kind_for(platform: &str, class_name: &str) -> Option<&'static str> {
    match platform {
        "android" => ANDROID_KINDS.get(class_name).copied(),
        "mac" => MAC_KINDS.get(class_name).copied(),
        _ => None,
    }
}
