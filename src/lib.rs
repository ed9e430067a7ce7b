pub mod catalog;
pub mod config;
pub mod error;
pub mod exercise;
pub mod geometry;
pub mod pose;
pub mod protocol;
pub mod rules;
pub mod server;
pub mod session;
pub mod tracker;
