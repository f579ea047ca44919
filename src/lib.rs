#[macro_use]
extern crate rocket;

pub mod api;
pub mod bootstrap;
pub mod common;
pub mod config;
pub mod daemon;
pub mod database;
pub mod imaging;
pub mod storage;
pub mod utils;
pub mod workflow;
