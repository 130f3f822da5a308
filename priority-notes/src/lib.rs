pub mod app;
pub mod client;
pub mod config;
pub mod ctx;
pub mod db;
pub mod errors;
pub mod notes;
pub mod openapi;
pub mod shared;
pub mod state;
pub mod users;

pub use config::config;
pub use db::{init_db, DB};
pub use errors::{Error, Result};
