//! Demand reads of registers.
//!
//! Every read is its own session. Batching demands into one session would
//! concatenate the replies, and then the bare-integer fallback of the decoder
//! couldn't tell which value belongs to which register.

use std::collections::BTreeMap;

use crate::{
    Error,
    codec::{
        RegisterCode,
        decode_demand_reply,
        encode_demand,
    },
    registers::{
        AirState,
        Door,
        DoorState,
        PowerState,
        decode_air,
        decode_doors,
        decode_power,
    },
    transport::LineSink,
};

pub async fn read_register<S: LineSink>(sink: &S, code: RegisterCode) -> Result<u32, Error> {
    let reply = sink.send_lines(&[encode_demand(code)]).await?;
    let value = decode_demand_reply(&reply, code)?;
    tracing::debug!(%code, value, "read register");
    Ok(value)
}

/// Returns the decoded state together with the raw register value.
pub async fn read_power<S: LineSink>(sink: &S) -> Result<(PowerState, u32), Error> {
    let value = read_register(sink, RegisterCode::POWER).await?;
    Ok((decode_power(value), value))
}

pub async fn read_air<S: LineSink>(sink: &S) -> Result<(AirState, u32), Error> {
    let value = read_register(sink, RegisterCode::AIR).await?;
    Ok((decode_air(value), value))
}

/// Reads both door registers, open first.
pub async fn read_doors<S: LineSink>(sink: &S) -> Result<BTreeMap<Door, DoorState>, Error> {
    let open = read_register(sink, RegisterCode::DOORS_OPEN).await?;
    let manual = read_register(sink, RegisterCode::DOORS_MANUAL).await?;
    Ok(decode_doors(open, manual))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashMap,
        sync::Arc,
    };

    use parking_lot::Mutex;

    use crate::{
        Error,
        codec::{
            DecodeError,
            RegisterCode,
            WireLine,
        },
        registers::{
            Door,
            ExtPower,
            ShoreBreaker,
        },
        resolver::{
            read_air,
            read_doors,
            read_power,
            read_register,
        },
        transport::{
            Endpoint,
            LineSink,
            TransportError,
        },
    };

    /// Answers demands from a register table and records everything sent.
    #[derive(Clone, Debug, Default)]
    pub struct FakeSink {
        pub registers: Arc<Mutex<HashMap<RegisterCode, String>>>,
        pub sent: Arc<Mutex<Vec<Vec<String>>>>,
        pub unreachable: Arc<Mutex<bool>>,
    }

    impl FakeSink {
        pub fn with_register(self, code: RegisterCode, reply: impl Into<String>) -> Self {
            self.registers.lock().insert(code, reply.into());
            self
        }

        pub fn set_unreachable(&self, unreachable: bool) {
            *self.unreachable.lock() = unreachable;
        }

        pub fn sent_lines(&self) -> Vec<String> {
            self.sent.lock().iter().flatten().cloned().collect()
        }
    }

    impl LineSink for FakeSink {
        async fn send_lines(&self, lines: &[WireLine]) -> Result<String, TransportError> {
            if *self.unreachable.lock() {
                return Err(TransportError::Unreachable {
                    endpoint: Endpoint::default(),
                    source: std::io::ErrorKind::ConnectionRefused.into(),
                });
            }

            self.sent
                .lock()
                .push(lines.iter().map(|line| line.content().to_owned()).collect());

            let registers = self.registers.lock();
            let mut reply = String::new();
            for line in lines {
                let Some(code) = line
                    .content()
                    .strip_prefix("Q=")
                    .and_then(|demand| demand.strip_suffix("=?"))
                    .and_then(|code| code.parse::<RegisterCode>().ok())
                else {
                    continue;
                };
                if let Some(value) = registers.get(&code) {
                    reply.push_str(value);
                    reply.push_str("\r\n");
                }
            }
            Ok(reply)
        }
    }

    #[tokio::test]
    async fn it_reads_a_register() {
        let sink = FakeSink::default().with_register(RegisterCode::POWER, "Qi132=134217728");
        assert_eq!(read_register(&sink, RegisterCode::POWER).await.unwrap(), 134217728);
        assert_eq!(sink.sent_lines(), vec!["Q=Qi132=?"]);
    }

    #[tokio::test]
    async fn unanswered_demands_are_decode_errors() {
        let sink = FakeSink::default();
        let error = read_register(&sink, RegisterCode::AIR).await.unwrap_err();
        assert!(matches!(error, Error::Decode(DecodeError::NoNumericToken)));
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let sink = FakeSink::default();
        sink.set_unreachable(true);
        let error = read_register(&sink, RegisterCode::AIR).await.unwrap_err();
        assert!(matches!(
            error,
            Error::Transport(TransportError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn it_reads_decoded_states() {
        let sink = FakeSink::default()
            .with_register(RegisterCode::POWER, format!("Qi132={}", 1 | 1 << 8 | 1 << 30))
            .with_register(RegisterCode::AIR, "Qi174=2")
            .with_register(RegisterCode::DOORS_OPEN, "Qi180=8")
            .with_register(RegisterCode::DOORS_MANUAL, "9");

        let (power, _) = read_power(&sink).await.unwrap();
        assert_eq!(power.ext1, ExtPower::Connected);
        assert_eq!(power.ext2, ExtPower::NotAvailable);
        assert_eq!(power.ssb, ShoreBreaker::Open);

        let (air, raw) = read_air(&sink).await.unwrap();
        assert_eq!(raw, 2);
        assert!(air.aircon && !air.bleed);

        let doors = read_doors(&sink).await.unwrap();
        assert!(doors[&Door::L1].open);
        assert!(doors[&Door::L1].manual);
        assert!(doors[&Door::NoseCargo].manual);
        assert!(!doors[&Door::NoseCargo].open);

        // one session per register
        assert_eq!(sink.sent.lock().len(), 4);
    }
}
