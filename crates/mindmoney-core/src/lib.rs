pub mod action_plan;
pub mod config;
pub mod conversation;
pub mod ids;
pub mod session;
pub mod trace;

pub use action_plan::*;
pub use config::*;
pub use conversation::*;
pub use ids::*;
pub use session::*;
pub use trace::*;
