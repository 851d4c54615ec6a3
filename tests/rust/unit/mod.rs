//! Unit tests - Tests of individual compiler stages through the public API
//!
//! These tests need nothing but the crate itself.

mod parser_tests;
mod query_builder_tests;
mod tokenizer_tests;
