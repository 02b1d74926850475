pub mod dpop;
pub mod nonce;
pub mod replay;
pub mod sweeper;
pub mod token;
