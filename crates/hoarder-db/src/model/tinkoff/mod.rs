//! Rows of the bank database.
//!
//! Tables that the mirror pass links to Firefly have separate read (`Account`) and write
//! (`NewAccount`) shapes: the write shape omits `firefly_id`, so loader upserts never touch it.

pub mod account;
pub mod invest;
pub mod offer;
pub mod operation;
pub mod receipt;
pub mod reference;
pub mod user;
