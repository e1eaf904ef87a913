//! Data models for the company registry.
//!
//! Field names follow the `companies` table columns so rows, JSON payloads and
//! hosted-store responses share one shape.

mod company;
mod filters;

pub use company::*;
pub use filters::*;
