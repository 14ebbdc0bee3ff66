pub mod sha;

pub mod auth;
pub mod capability;
pub mod config;
pub mod context;
pub mod control;
pub mod database;
pub mod error;
pub mod model;
pub mod objects;
pub mod pack;
pub mod pkt_line;
pub mod refs;
pub mod serve;
pub mod ssh;
pub mod storage;
pub mod transaction;
