// Middleware - request gate and CORS

pub mod auth;
pub mod cors;

pub use auth::auth_middleware;
pub use cors::cors_middleware;
