pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod proto;
pub mod query;
pub mod server;
pub mod services;
pub mod storage;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};
