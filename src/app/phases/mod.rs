pub(super) mod bootstrap;
pub(super) mod running;
