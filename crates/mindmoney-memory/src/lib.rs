pub mod kv;
pub mod migrations;
pub mod session_id;
pub mod sqlite_store;

pub use kv::*;
pub use session_id::*;
pub use sqlite_store::*;
