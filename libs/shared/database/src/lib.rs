pub mod error;
pub mod supabase;
pub mod transition;

pub use error::StoreError;
pub use supabase::{filter_timestamp, SupabaseClient};
pub use transition::Transition;
