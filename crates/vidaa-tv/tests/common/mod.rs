//! Test utilities shared by the integration tests

#![allow(dead_code)]

pub mod fake_tv;
mod test_hass;

pub use test_hass::*;
