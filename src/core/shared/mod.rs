pub mod enums;
pub mod error;
pub mod models;
pub mod schema;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod utils;

pub use enums::*;
pub use error::{CrmError, CrmResult};
pub use utils::{create_conn, format_resolved_at, DbPool};
