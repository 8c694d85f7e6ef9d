pub mod schedule;
pub mod stdin;
pub mod telegram;
