//! Last known register values.
//!
//! PSX has no subscriptions, so the bridge keeps a shadow of the registers the
//! UI shows and refreshes it by polling. Writes update the shadow
//! optimistically, the next poll overwrites them.

use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    sync::Arc,
    time::Duration,
};

use chrono::{
    DateTime,
    Utc,
};
use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::RegisterCode,
    registers::{
        AirState,
        Door,
        DoorState,
        PowerState,
        decode_air,
        decode_doors,
        decode_power,
    },
    resolver::read_register,
    transport::LineSink,
};

/// Registers refreshed by the [`StatusPoller`].
pub const POLLED_REGISTERS: [RegisterCode; 4] = [
    RegisterCode::POWER,
    RegisterCode::AIR,
    RegisterCode::DOORS_OPEN,
    RegisterCode::DOORS_MANUAL,
];

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Freshness {
    /// Never read successfully.
    #[default]
    Unknown,
    /// The last read succeeded.
    Fresh,
    /// A read failed after an earlier one succeeded. The value is the last one
    /// that was read.
    Stale,
}

/// A shadowed value. `value` and `updated_at` are `None` only while the
/// freshness is [`Freshness::Unknown`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Shadowed<T> {
    pub freshness: Freshness,
    pub value: Option<T>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Shadowed<T> {
    pub fn unknown() -> Self {
        Self {
            freshness: Freshness::Unknown,
            value: None,
            updated_at: None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Shadowed<U> {
        Shadowed {
            freshness: self.freshness,
            value: self.value.map(f),
            updated_at: self.updated_at,
        }
    }
}

impl<T> Default for Shadowed<T> {
    fn default() -> Self {
        Self::unknown()
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    value: u32,
    updated_at: DateTime<Utc>,
    stale: bool,
}

impl Entry {
    fn shadowed(&self) -> Shadowed<u32> {
        Shadowed {
            freshness: if self.stale {
                Freshness::Stale
            }
            else {
                Freshness::Fresh
            },
            value: Some(self.value),
            updated_at: Some(self.updated_at),
        }
    }
}

/// Decoded view of the shadow.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShadowSnapshot {
    pub power: Shadowed<PowerState>,
    pub air: Shadowed<AirState>,
    pub doors: Shadowed<BTreeMap<Door, DoorState>>,
}

#[derive(Clone, Debug, Default)]
pub struct RegisterShadow {
    entries: Arc<Mutex<HashMap<RegisterCode, Entry>>>,
}

impl RegisterShadow {
    /// Records a value that was just read or written.
    pub fn record(&self, code: RegisterCode, value: u32) {
        let mut entries = self.entries.lock();
        if let Some(previous) = entries.get(&code) {
            if previous.value != value {
                tracing::debug!(%code, previous = previous.value, value, "register changed");
            }
        }
        entries.insert(
            code,
            Entry {
                value,
                updated_at: Utc::now(),
                stale: false,
            },
        );
    }

    /// Marks a register as stale after a failed read. Registers that were
    /// never read stay unknown.
    pub fn mark_stale(&self, code: RegisterCode) {
        if let Some(entry) = self.entries.lock().get_mut(&code) {
            entry.stale = true;
        }
    }

    pub fn get(&self, code: RegisterCode) -> Shadowed<u32> {
        self.entries
            .lock()
            .get(&code)
            .map(Entry::shadowed)
            .unwrap_or_default()
    }

    pub fn power(&self) -> Shadowed<PowerState> {
        self.get(RegisterCode::POWER).map(decode_power)
    }

    pub fn air(&self) -> Shadowed<AirState> {
        self.get(RegisterCode::AIR).map(decode_air)
    }

    /// Doors are only known if both door registers are. They are as stale and
    /// as old as the older register.
    pub fn doors(&self) -> Shadowed<BTreeMap<Door, DoorState>> {
        let (open, manual) = {
            let entries = self.entries.lock();
            (
                entries.get(&RegisterCode::DOORS_OPEN).copied(),
                entries.get(&RegisterCode::DOORS_MANUAL).copied(),
            )
        };

        match (open, manual) {
            (Some(open), Some(manual)) => {
                Shadowed {
                    freshness: if open.stale || manual.stale {
                        Freshness::Stale
                    }
                    else {
                        Freshness::Fresh
                    },
                    value: Some(decode_doors(open.value, manual.value)),
                    updated_at: Some(open.updated_at.min(manual.updated_at)),
                }
            }
            _ => Shadowed::unknown(),
        }
    }

    pub fn snapshot(&self) -> ShadowSnapshot {
        ShadowSnapshot {
            power: self.power(),
            air: self.air(),
            doors: self.doors(),
        }
    }
}

/// Reads every polled register once. Failures only mark the register stale.
pub async fn poll_once<S: LineSink>(sink: &S, shadow: &RegisterShadow) {
    for code in POLLED_REGISTERS {
        match read_register(sink, code).await {
            Ok(value) => shadow.record(code, value),
            Err(error) => {
                tracing::debug!(%code, %error, "status poll failed");
                shadow.mark_stale(code);
            }
        }
    }
}

/// Background task that keeps a [`RegisterShadow`] fresh.
#[derive(Debug)]
pub struct StatusPoller {
    join_handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl StatusPoller {
    /// Polls immediately and then every `interval`, until `shutdown` is
    /// cancelled or the poller is stopped.
    pub fn spawn<S>(
        sink: S,
        shadow: RegisterShadow,
        interval: Duration,
        shutdown: &CancellationToken,
    ) -> Self
    where
        S: LineSink + 'static,
    {
        let cancel = shutdown.child_token();

        let join_handle = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let mut ticks = tokio::time::interval(interval);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticks.tick() => {
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => break,
                                _ = poll_once(&sink, &shadow) => {}
                            }
                        }
                    }
                }

                tracing::debug!("status poller stopped");
            }
        });

        Self {
            join_handle,
            cancel,
        }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(error) = self.join_handle.await {
            tracing::error!(?error, "status poller panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::{
        codec::RegisterCode,
        registers::{
            Door,
            ExtPower,
        },
        resolver::tests::FakeSink,
        shadow::{
            Freshness,
            RegisterShadow,
            StatusPoller,
        },
    };

    #[test]
    fn unread_registers_are_unknown() {
        let shadow = RegisterShadow::default();
        shadow.mark_stale(RegisterCode::POWER);

        let snapshot = shadow.snapshot();
        assert_eq!(snapshot.power.freshness, Freshness::Unknown);
        assert_eq!(snapshot.power.value, None);
        assert_eq!(snapshot.doors.freshness, Freshness::Unknown);
    }

    #[test]
    fn failed_reads_keep_the_last_value() {
        let shadow = RegisterShadow::default();
        shadow.record(RegisterCode::POWER, 1 | 1 << 8);
        assert_eq!(shadow.power().freshness, Freshness::Fresh);

        shadow.mark_stale(RegisterCode::POWER);
        let power = shadow.power();
        assert_eq!(power.freshness, Freshness::Stale);
        assert_eq!(power.value.unwrap().ext1, ExtPower::Connected);

        shadow.record(RegisterCode::POWER, 0);
        assert_eq!(shadow.power().freshness, Freshness::Fresh);
    }

    #[test]
    fn doors_need_both_registers() {
        let shadow = RegisterShadow::default();
        shadow.record(RegisterCode::DOORS_OPEN, 1 << 3);
        assert_eq!(shadow.doors().freshness, Freshness::Unknown);

        shadow.record(RegisterCode::DOORS_MANUAL, 0);
        let doors = shadow.doors();
        assert_eq!(doors.freshness, Freshness::Fresh);
        assert!(doors.value.unwrap()[&Door::L1].open);

        shadow.mark_stale(RegisterCode::DOORS_MANUAL);
        assert_eq!(shadow.doors().freshness, Freshness::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_refreshes_and_goes_stale() {
        let sink = FakeSink::default()
            .with_register(RegisterCode::POWER, "Qi132=1")
            .with_register(RegisterCode::AIR, "Qi174=3")
            .with_register(RegisterCode::DOORS_OPEN, "Qi180=0")
            .with_register(RegisterCode::DOORS_MANUAL, "Qi181=0");
        let shadow = RegisterShadow::default();
        let shutdown = CancellationToken::new();

        let poller = StatusPoller::spawn(
            sink.clone(),
            shadow.clone(),
            Duration::from_secs(5),
            &shutdown,
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.sent.lock().len(), 4);
        assert_eq!(shadow.air().freshness, Freshness::Fresh);
        assert!(shadow.air().value.unwrap().bleed);

        sink.set_unreachable(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(shadow.air().freshness, Freshness::Stale);
        assert_eq!(shadow.doors().freshness, Freshness::Stale);

        sink.set_unreachable(false);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(shadow.air().freshness, Freshness::Fresh);
        assert_eq!(sink.sent.lock().len(), 8);

        poller.stop().await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(sink.sent.lock().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_stops_on_shutdown() {
        let sink = FakeSink::default();
        let shutdown = CancellationToken::new();
        let poller = StatusPoller::spawn(
            sink.clone(),
            RegisterShadow::default(),
            Duration::from_secs(5),
            &shutdown,
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        poller.stop().await;
        assert_eq!(sink.sent.lock().len(), 4);
    }
}
