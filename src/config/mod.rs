//! Configuration management
//!
//! Settings are loaded in layers (see [`ConfigLoader`]) and every section
//! validates itself before the application starts.

pub mod environment;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use environment::Environment;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use settings::{
    ApplicationConfig, DatabaseConfig, JwtConfig, LoggerSettings, ServerConfig, Settings,
};
