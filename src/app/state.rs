use strum_macros::Display;

/// Lifecycle of the service. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AppPhase {
    Bootstrapping,
    Running,
    Draining,
    Stopped,
}
