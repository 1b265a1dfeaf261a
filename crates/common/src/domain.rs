mod change;
mod collaborators;
mod player;
mod price;
mod product;
mod result;
mod update_request;

pub use change::*;
pub use collaborators::*;
pub use player::*;
pub use price::*;
pub use product::*;
pub use result::*;
pub use update_request::*;
