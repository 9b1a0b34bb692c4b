/// Middleware module
///
/// Actix-web middleware guarding routes with access tokens.

mod jwt_middleware;

pub use jwt_middleware::{AuthenticatedUser, JwtMiddleware};
