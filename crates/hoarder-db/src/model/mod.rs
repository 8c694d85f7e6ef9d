pub mod lkdr;
pub mod mirror;
pub mod tinkoff;
