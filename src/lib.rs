pub mod app;
pub mod cli;
pub mod config;
pub mod display;
pub mod host;
pub mod journaling;
pub mod notes;
pub mod preferences;
pub mod scope;
pub mod storage;
pub mod tags;

pub use app::{Panel, PanelError};
pub use config::{AppConfig, ConfigLoader, ConfigPaths};
