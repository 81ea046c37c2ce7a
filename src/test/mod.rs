mod checkin;
mod roster;
mod utils;

pub use utils::test_db as test_utils;
