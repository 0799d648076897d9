pub mod fixtures;
pub mod logging;

pub use fixtures::{CloudFixture, write_app};
pub use logging::init_test_logging;
