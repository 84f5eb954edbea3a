//! Link to the PSX 747 simulator.
//!
//! PSX exposes its simulation variables over a plain-text TCP protocol (port
//! 10747 by default). This crate provides:
//!
//! - [`codec`]: encoding and decoding of Q-lines and payload formats
//! - [`transport`]: short-lived sessions that write lines and collect replies
//! - [`registers`] and [`resolver`]: bit layouts of the system registers and
//!   demand reads that decode them
//! - [`composer`]: read-modify-write computation of register values
//! - [`pushback`]: pushback commands with client-side heading hold
//! - [`shadow`]: last known register values, refreshed by a poller
//! - [`client`]: typed operations tying it all together

pub mod client;
pub mod codec;
pub mod composer;
pub mod pushback;
pub mod registers;
pub mod resolver;
pub mod shadow;
pub mod transport;

pub use crate::{
    client::PsxClient,
    codec::{
        DecodeError,
        EncodeError,
        RegisterCode,
        RegisterValue,
        WireLine,
    },
    composer::ValidationError,
    pushback::Sequencer,
    shadow::{
        RegisterShadow,
        StatusPoller,
    },
    transport::{
        Endpoint,
        LineSink,
        Transport,
        TransportError,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<EncodeError> for Error {
    fn from(error: EncodeError) -> Self {
        Self::Validation(error.into())
    }
}
