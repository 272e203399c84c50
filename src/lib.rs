//! Folio - portfolio content engine: AI content plans, review and execution

pub mod chat;
pub mod cli;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod plan;
pub mod storage;
pub mod store;
