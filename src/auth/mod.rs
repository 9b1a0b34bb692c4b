/// Authentication module
///
/// Password hashing, access-token issuance/validation, refresh-token
/// lifecycle, bearer-header extraction, and the session flows built on them.

mod bearer;
mod claims;
mod jwt;
mod password;
mod refresh_token;
mod session;

pub use bearer::extract_bearer_token;
pub use claims::Claims;
pub use jwt::AccessTokenCodec;
pub use password::{PasswordHasher, MAX_PASSWORD_BYTES};
pub use refresh_token::generate_refresh_token;
pub use refresh_token::hash_token;
pub use refresh_token::RefreshToken;
pub use refresh_token::RefreshTokenManager;
pub use session::{Authenticator, Session};
