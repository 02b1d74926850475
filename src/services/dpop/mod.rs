pub mod htu;
pub mod jwk;
pub mod key;
pub mod proof;
pub mod types;
pub mod verifier;

pub use jwk::{JwkError, PublicJwk, compute_thumbprint};
pub use key::KeyPair;
pub use proof::{ProofBuildError, ProofBuilder, ProofToken, build_proof};
pub use verifier::{DpopError, DpopPolicy, ProofVerifier};
