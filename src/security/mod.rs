pub mod jwt;
pub mod password;

pub use jwt::{extract_bearer_token, Claims, TokenService};
pub use password::PasswordHasher;
