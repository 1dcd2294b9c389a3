pub mod capture_file;
pub mod file_store;
pub mod metadata;
