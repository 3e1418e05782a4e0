//! Wire and domain types shared by the dashboard client and the mock backend.

pub mod domain;
pub mod error;
pub mod protocol;
