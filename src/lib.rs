//! News→joke→image→Telegram pipeline.
//!
//! The coordinator in [`pipeline`] drives narrow clients for the GDELT news
//! feed, a Supabase-backed title store, Hugging Face caption and image
//! models, and a Telegram publisher. Each client sits behind a trait so the
//! pipeline semantics are testable without the network.

pub mod caption;
pub mod config;
pub mod gdelt;
pub mod image;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod telegram;
