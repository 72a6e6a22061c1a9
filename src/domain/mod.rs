//! Domain layer containing pure types for the feed pipeline.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `feed` - Post events, fan-out tasks, job records and materialized entries

pub mod feed;
pub mod foundation;
