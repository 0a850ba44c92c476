//! Core packaging logic — types, parsing, registry, export.

pub mod config;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod intrinsics;
pub mod parser;
pub mod registry;
pub mod types;
