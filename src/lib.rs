/*
 * Responsibility
 * - Module tree of the DPoP token server
 * - Exposed as a library so the CLI and integration tests share it
 */
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
