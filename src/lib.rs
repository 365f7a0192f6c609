//! Mailmerge: personalized multi-part email from a CSV file and templates.

pub mod assets;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod template;
pub mod transforms;
pub mod transport;
