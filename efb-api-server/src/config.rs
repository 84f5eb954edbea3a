use std::time::Duration;

use psx_link::{
    Endpoint,
    Transport,
    pushback::DEFAULT_HOLD_INTERVAL,
    shadow::DEFAULT_POLL_INTERVAL,
    transport::{
        DEFAULT_CONNECT_TIMEOUT,
        DEFAULT_GRACE,
    },
};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:4443";

/// Upper bound for a fuel load in kg. Anything above is a typo.
pub const MAX_FUEL_KG: f64 = 250_000.0;

#[derive(Clone, Debug)]
pub struct Config {
    /// Default PSX endpoint. Ping and send requests may override it.
    pub psx: Endpoint,
    pub connect_timeout: Duration,
    /// How long a session waits for replies after writing.
    pub grace: Duration,
    pub poll_interval: Duration,
    pub hold_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            psx: Endpoint::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            grace: DEFAULT_GRACE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            hold_interval: DEFAULT_HOLD_INTERVAL,
        }
    }
}

impl Config {
    pub fn transport(&self, shutdown: &CancellationToken) -> Transport {
        Transport::new(self.psx.clone())
            .with_connect_timeout(self.connect_timeout)
            .with_grace(self.grace)
            .with_shutdown(shutdown.clone())
    }
}
