pub mod allowed_repository;
pub mod environment;
