//! Document image preprocessing engine
//!
//! Selects, parameterizes or synthesizes image transform pipelines that
//! prepare photographed documents for text extraction, and measures whether
//! a pipeline actually improved the extracted text.

pub mod comparison;
pub mod config;
pub mod engine;
pub mod error;
pub mod preprocessing;
pub mod program;
pub mod server;
pub mod vision;
