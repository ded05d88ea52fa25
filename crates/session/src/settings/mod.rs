pub mod state;

pub use state::{SessionSettings, SettingsStore};
