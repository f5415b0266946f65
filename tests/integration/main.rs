//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive the full
//! crawl cycle end-to-end.

mod common;
mod crawl_tests;
mod download_tests;
