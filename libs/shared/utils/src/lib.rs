pub mod extractor;
pub mod jwt;
pub mod sweep;
pub mod test_utils;

pub use extractor::{actor_from_user, auth_middleware};
pub use sweep::{SweepHandle, SweepRunner, SweepTask};
