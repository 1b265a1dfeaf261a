mod change_aggregator;
mod change_service;
mod player_service;
mod price_delta;
mod price_service;
mod product_service;
mod side_channel;
mod update_request_producer;

pub use change_aggregator::*;
pub use change_service::*;
pub use player_service::*;
pub use price_delta::*;
pub use price_service::*;
pub use product_service::*;
pub use side_channel::*;
pub use update_request_producer::*;
