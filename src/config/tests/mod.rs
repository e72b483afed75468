//! Unit tests for cmssw-sandbox configuration types.
//!
//! This module contains tests organised into:
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Basic type and serialisation tests
//! - [`validation`] - Post-merge normalisation and `AppConfig::validate`
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence tests

mod helpers;
