pub mod booking;
pub mod player;
pub mod team;

pub use booking::*;
pub use player::*;
pub use team::*;
