pub mod lifecycle;
pub mod records;

pub use lifecycle::{AutoCompleteSessionsSweep, SessionLifecycleManager};
pub use records::{MaterializeError, SessionRecordMaterializer, SupabaseSessionRecordMaterializer};
