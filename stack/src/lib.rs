pub mod backup;
pub mod dependency;
pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod managers;
pub mod precompilers;
pub mod registry;
pub mod stack;
pub mod templates;
pub mod version;

pub use error::{Result, StackError};
pub use lifecycle::Lifecycle;
pub use registry::StackRegistry;
pub use stack::{Stack, StackBuilder};
