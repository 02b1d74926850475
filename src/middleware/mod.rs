/*
 * Responsibility
 * - Public interface for middleware (re-export)
 */
pub mod http;
