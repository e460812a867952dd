pub mod app;
pub mod command;
pub mod config;
pub mod diff_output;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod manifest;
pub mod output;
pub mod platform;
pub mod report;
pub mod resolver;
pub mod rpc;
pub mod runner;
pub mod scratch;
