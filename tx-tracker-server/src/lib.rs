mod server;
pub mod services;
mod settings;

pub use server::{http_configure, run, AppState};
pub use settings::Settings;
