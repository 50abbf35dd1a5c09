pub mod change_feed;
pub mod ledger;
pub mod rotation;
pub mod statistics;
