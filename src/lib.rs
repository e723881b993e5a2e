// LABGATE Library
// Lab gateway backend: remote desktop brokering, scenario control and VM launch

pub mod api;
pub mod config;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod lifecycle;
pub mod scenario;
pub mod security;
pub mod session;
pub mod vm;

pub use api::{build_router, AppState};
pub use config::Config;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_TIME: &str = include_str!(concat!(env!("OUT_DIR"), "/build_time.txt"));
