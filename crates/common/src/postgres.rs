mod client;
mod config;
mod player_repository;
mod product_repository;

pub use client::*;
pub use config::*;
pub use player_repository::*;
pub use product_repository::*;
