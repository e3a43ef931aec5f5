//! Data providers for fetching raw DEX pool trade events.

pub mod error;
pub mod provider;
pub mod subgraph;
