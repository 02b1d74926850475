pub mod dpop;

pub use dpop::DpopRequest;
