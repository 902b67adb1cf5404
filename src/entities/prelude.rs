pub use super::file_records::Entity as FileRecords;
pub use super::shares::Entity as Shares;
pub use super::users::Entity as Users;
