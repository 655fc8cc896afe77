pub mod advance;
pub mod clock;
pub mod config;
pub mod consistency;
pub mod cycle;
pub mod error;
pub mod generate;
pub mod model;
pub mod notice;
pub mod progress;
pub mod storage;
pub mod task_api;
pub mod tree;
