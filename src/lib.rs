pub mod analytics;
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod state;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};
