pub mod auth;
pub mod captcha;
pub mod error;
pub mod firefly;
pub mod http;
pub mod lkdr;
pub mod telegram;
pub mod tinkoff;
pub mod webdriver;
