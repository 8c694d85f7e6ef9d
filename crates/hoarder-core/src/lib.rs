pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod conversation;
pub mod convert;
pub mod error;
pub mod lazy;
pub mod lock;
pub mod stack;
