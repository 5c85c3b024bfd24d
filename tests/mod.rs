//! Test suite for the chat client core
//!
//! This module organizes all tests

pub mod property;
