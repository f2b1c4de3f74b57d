pub mod models;
pub mod schema;
pub mod store;
pub mod types;

pub use models::{signal, signal_update};
pub use store::{SignalRepository, SignalStore};
pub use types::{
    NewSignal, NewSignalUpdate, ReferentialMode, SignalStatus, UpdateKey, UpsertAction,
};
