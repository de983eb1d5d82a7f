pub mod model;
pub mod error;
pub mod decoder;
pub mod storage;
pub mod store;
pub mod server;
pub mod control;
pub mod api;
pub mod client;
pub mod config;
pub mod profile;
pub mod parser;

pub use crate::error::{Error, Result};
pub use crate::model::{Record, HISTORY_CAPACITY};
pub use crate::server::{FrameLimits, IngestServer};
pub use crate::store::HistoryStore;
