//! Core orchestration between the metadata repository and the object store.

pub mod image_service;
