pub mod dispatch;
pub mod error;
pub mod import;
pub mod outputs;
pub mod position;
pub mod progress;
pub mod repository;
pub mod transform;
pub mod types;
