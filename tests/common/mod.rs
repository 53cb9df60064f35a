// Shared by every integration test binary; not all of them use every
// helper.
#![allow(dead_code)]

pub mod app;
pub mod factory;

pub use app::TestApp;
pub use factory::Factory;
