//! Core data model for the image storage service.
//!
//! The descriptor maps cleanly to the `images` table via `sqlx::FromRow` and
//! serializes naturally as JSON via `serde`.

pub mod image;
