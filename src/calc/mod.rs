pub mod history;
pub mod ops;
pub mod state;
pub mod stats;

pub use history::{HistoryEntry, HistoryStore, MAX_HISTORY};
pub use ops::{AdvancedOp, BinaryOp};
pub use state::ServerState;
pub use stats::Stats;
