pub mod error;
pub mod file_ops;
pub mod session;
pub mod transport;
pub mod upload_facade;
pub mod upload_store;
pub mod worker;
