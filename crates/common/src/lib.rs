pub mod config;
pub mod error;
pub mod hooks;
pub mod logger;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{CodematchError, ErrorBody, ErrorContext};
pub use hooks::{HookFn, Hooks};
pub type Result<T> = std::result::Result<T, CodematchError>;
