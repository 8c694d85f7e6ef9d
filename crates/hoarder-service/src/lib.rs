pub mod auth;
pub mod error;
pub mod firefly;
pub mod job;
pub mod lkdr;
pub mod pipeline;
pub mod storage;
pub mod tinkoff;
pub mod trigger;
