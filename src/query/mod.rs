//! Parsing, projection and execution of variant queries.

pub mod aggregation;
pub mod cli;
pub mod engine;
pub mod executor;
pub mod genotypes;
pub mod moi;
pub mod multikv;
pub mod parser;
pub mod projection;
pub mod result;
pub mod schema;
pub mod sorting;
pub mod utils;
