pub mod clients;
pub mod core;
pub mod expression;
pub mod handlers;
pub mod manager;
pub mod models;
pub mod stores;
pub mod trackers;
pub mod utils;
