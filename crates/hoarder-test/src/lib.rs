//! Test doubles shared by the integration suite: an in-memory store, a fixture-backed bank
//! client and an in-memory Firefly III.

pub mod firefly;
pub mod fixture;
pub mod memory;

pub use firefly::FakeFirefly;
pub use fixture::{Fixture, FixtureTinkoffClient};
pub use memory::MemoryStore;
