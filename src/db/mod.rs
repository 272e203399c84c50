//! Database module

pub mod connection;
pub mod repositories;
pub mod schema;

pub use connection::Database;
pub use repositories::conversation::ConversationRepository;
pub use repositories::history::HistoryRepository;
pub use repositories::saved_plan::SavedPlanRepository;
