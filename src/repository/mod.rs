//! Durable metadata storage for image descriptors.

pub mod image_repository;
