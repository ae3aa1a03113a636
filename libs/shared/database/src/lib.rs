pub mod error;
pub mod memory;
pub mod postgrest;
pub mod store;
pub mod supabase;

pub use error::DatabaseError;
pub use memory::{FailPoint, InMemorySchedulingStore};
pub use postgrest::SupabaseSchedulingStore;
pub use store::*;
pub use supabase::SupabaseClient;
