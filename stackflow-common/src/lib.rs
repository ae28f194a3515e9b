pub mod config;
pub mod deployer;
pub mod deployment;
pub mod error;
pub mod event;
pub mod stack;
