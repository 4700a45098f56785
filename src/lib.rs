//! Assembly and delivery engine for an offline-capable caching worker script.
//!
//! Contributors declare caching routes, precache entries and script modules into
//! request-scoped registries; the compiler orders the modules by dependency and
//! priority, renders one text artifact per scope, and the HTTP layer serves it
//! with conditional-GET semantics.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
