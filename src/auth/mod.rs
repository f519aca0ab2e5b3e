pub mod access;
pub mod token;

pub use access::{Grant, Requester};
