//! Stackpack — package CloudFormation and SAM templates for deployment.
//!
//! Local code bundles, definition files and nested templates referenced from a
//! template are archived, uploaded to object storage, and rewritten to their
//! remote locations.

pub mod archive;
pub mod cli;
pub mod core;
pub mod storage;
