mod change_consumer;
mod player_consumer;
mod price_consumer;
mod product_consumer;

pub use change_consumer::*;
pub use player_consumer::*;
pub use price_consumer::*;
pub use product_consumer::*;
