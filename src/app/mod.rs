mod phases;
mod root;
mod state;

pub use root::{RunSummary, SentinelApp, load_symbols};
pub use state::AppPhase;
