//! Thin clients for third-party data the EFB shows next to PSX.

pub mod vatsim;
pub mod weather;
