//! Internal testing utilities: synthetic task directories and an
//! isolated TestWorld environment for integration tests.

mod fixtures;
mod world;

pub use fixtures::{TaskFixture, task_id};
pub use world::TestWorld;
