pub mod collector;
pub mod commands;
pub mod config;
pub mod detect;
pub mod extract;
pub mod fingerprint;
pub mod logging;
pub mod paths;
pub mod preprocess;
pub mod process;
pub mod stop;
pub mod tagindex;

// Re-export commonly used types
pub use config::Config;
pub use fingerprint::Fingerprint;
pub use paths::DataLayout;
