mod change_repository;
mod client;
mod price_change_repository;

pub use change_repository::*;
pub use client::*;
pub use price_change_repository::*;
