//! Domain models for Docket.
//!
//! Flat DTOs only: relations are expressed as ids plus explicit repository
//! queries, never as live collections.

pub mod activity;
pub mod archive;
pub mod attachment;
pub mod capability;
pub mod directory;
pub mod grant;
pub mod history;
pub mod order;
