pub mod prelude;

pub mod file_records;
pub mod shares;
pub mod users;
