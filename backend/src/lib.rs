pub mod analysis;
pub mod batch;
pub mod config;
pub mod inference;
pub mod routes;
pub mod sample;
pub mod verification;
