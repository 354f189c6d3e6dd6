//! HTTP request handlers.

pub mod meta;
pub mod uploads;

pub use meta::*;
pub use uploads::*;
