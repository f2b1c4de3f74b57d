pub mod signal;
pub mod signal_update;
