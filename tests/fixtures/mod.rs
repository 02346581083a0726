#![allow(dead_code)]
//! Shared fixtures for integration tests.

pub mod backend;
pub mod repo;
