mod client;
mod config;
mod operator_repository;

pub use client::*;
pub use config::*;
pub use operator_repository::*;
