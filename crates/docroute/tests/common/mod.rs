//! Shared test utilities for docroute integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a full pipeline over temp storage and an
//!   in-memory database, with fake renderer, OCR and extraction service
//! - Builders for generated PDFs, raster images and service payloads

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
