pub mod action;
pub mod capability;
pub mod config;
pub mod element;
pub mod error;
pub mod paths;

pub use action::{ActionRecord, ActionSelector, KwargValue};
pub use capability::{is_capability_name, UiCapability, REQUIRED_CAPABILITIES};
pub use config::Config;
pub use element::{ElementDescriptor, ElementSnapshot};
pub use error::{Error, LoadError, Result};
pub use paths::Paths;
