pub mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use client::{VerificationClient, VerificationError, VerificationOutcome};
