//! Property-based tests
//!
//! Uses proptest to check store invariants over arbitrary event orders
