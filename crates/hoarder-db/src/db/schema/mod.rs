pub mod lkdr;
pub mod tinkoff;
