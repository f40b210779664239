pub mod health;
pub mod upload_storage;
