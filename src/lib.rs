pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod signing;
pub mod storage;

pub use config::Config;
pub use errors::{AppError, ErrorKind};
pub use signing::{FinalizeOutcome, FinalizeRequest, SignatureMark, SigningService, ViewerPoint};
