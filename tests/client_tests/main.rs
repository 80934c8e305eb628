//! Client Tests
//!
//! Both protocol clients against scripted server transcripts.

#[path = "../common/mod.rs"]
mod common;

mod registry_tests;
