pub mod catalog_worker;
pub mod consumers;
pub mod domain;
pub mod notify;

pub use catalog_worker::*;
pub use consumers::*;
pub use domain::*;
pub use notify::*;
