mod media;
mod requests;
mod statistics;
mod watchlist;

pub use media::*;
pub use requests::*;
pub use statistics::*;
pub use watchlist::*;
