//! Repositories over the application tables

pub mod conversation;
pub mod history;
pub mod saved_plan;
