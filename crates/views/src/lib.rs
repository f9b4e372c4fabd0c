pub mod bound;
pub mod bridge;
pub mod loader;

pub use bound::BoundView;
pub use loader::{ActionSignature, LoaderConfig, ViewLoader};
