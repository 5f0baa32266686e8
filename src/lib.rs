pub mod args;
pub mod backup;
pub mod codec;
pub mod commands;
mod config;
mod error;
mod fs;
pub mod integrity;
pub mod model;
pub mod store;


pub use config::Config;
pub use error::{
    AppendError, BackupError, DecodeError, Error, LoadError, Result, ValidationError, WriteError,
};
pub use store::{LoadOutcome, Store};
