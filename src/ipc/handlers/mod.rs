pub mod assignments;
pub mod backup_exchange;
pub mod core;
pub mod courses;
pub mod import_legacy;
pub mod profile;
pub mod users;
