/*
 * Responsibility
 * - Public interface of the HTTP layer (routes() re-export)
 */
pub mod extractors;
pub mod handlers;
mod routes;

pub use routes::routes;
