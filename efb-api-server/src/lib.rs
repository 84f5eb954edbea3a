//! HTTP bridge between the EFB web UI and PSX.

pub mod api;
pub mod config;
pub mod services;
pub(crate) mod util;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error")]
    Io(#[from] std::io::Error),
    #[error("http error")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Psx(#[from] psx_link::Error),
}
