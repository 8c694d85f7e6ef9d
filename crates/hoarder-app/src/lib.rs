pub mod logging;
pub mod setup;
pub mod trigger;
