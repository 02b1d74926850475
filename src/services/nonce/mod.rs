pub mod memory;
pub mod store;

pub use memory::InMemoryNonceStore;
pub use store::{NonceError, NonceStore};
