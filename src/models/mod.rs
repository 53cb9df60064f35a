pub mod allowed_repository;
pub mod environment;

pub use allowed_repository::*;
pub use environment::*;
