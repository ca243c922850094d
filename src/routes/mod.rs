pub mod api;
pub mod auth;
pub mod health;

pub use api::api_routes;
