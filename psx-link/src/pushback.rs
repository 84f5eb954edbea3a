//! Pushback control.
//!
//! All pushback commands go to one register. Its value is
//! `<direction><subcommand><heading>`, with the heading as three digits, e.g.
//! `198123` starts pushing back towards 123°. PSX forgets a turn target after a
//! while, so "hold heading" is emulated here by re-sending the turn command at
//! a fixed interval until it's released or the pushback is stopped.
//!
//! Sessions live in memory of this process only. Several bridge instances
//! would each run their own hold loops.

use std::{
    collections::HashMap,
    fmt::Display,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tokio::time::{
    Instant,
    MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    Error,
    codec::{
        RegisterCode,
        WireLine,
        encode_command,
    },
    composer::ValidationError,
    transport::LineSink,
};

pub const DEFAULT_HOLD_INTERVAL: Duration = Duration::from_secs(5);

/// Session key used when the caller doesn't give one.
pub const DEFAULT_SESSION_KEY: &str = "default";

const SUBCOMMAND_START: u32 = 98;
const SUBCOMMAND_TURN: u32 = 97;
const STOP_PREFIX: u32 = 120;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    Back,
    Forward,
}

impl Direction {
    fn digit(&self) -> u32 {
        match self {
            Self::Back => 1,
            Self::Forward => 2,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Back => write!(f, "back"),
            Self::Forward => write!(f, "forward"),
        }
    }
}

impl FromStr for Direction {
    type Err = DirectionFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "back" => Ok(Self::Back),
            "forward" => Ok(Self::Forward),
            _ => {
                Err(DirectionFromStrError {
                    input: s.to_owned(),
                })
            }
        }
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("Invalid pushback direction: {input}")]
pub struct DirectionFromStrError {
    pub input: String,
}

/// Whole degrees in `0..=359`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Heading(u16);

impl Heading {
    /// Rounds to whole degrees and wraps into `0..=359`.
    pub fn from_degrees(degrees: f64) -> Result<Self, ValidationError> {
        if !degrees.is_finite() {
            return Err(ValidationError::InvalidHeading { value: degrees });
        }
        Ok(Self(degrees.round().rem_euclid(360.0) as u16))
    }

    pub fn degrees(&self) -> u16 {
        self.0
    }
}

impl Display for Heading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushbackCommand {
    Start {
        direction: Direction,
        heading: Heading,
    },
    Turn {
        direction: Direction,
        heading: Heading,
    },
    Stop {
        heading: Heading,
    },
}

impl PushbackCommand {
    pub fn value(&self) -> u32 {
        let (prefix, heading) = match self {
            Self::Start { direction, heading } => {
                (direction.digit() * 100 + SUBCOMMAND_START, heading)
            }
            Self::Turn { direction, heading } => {
                (direction.digit() * 100 + SUBCOMMAND_TURN, heading)
            }
            Self::Stop { heading } => (STOP_PREFIX, heading),
        };
        prefix * 1000 + u32::from(heading.degrees())
    }

    pub fn line(&self) -> WireLine {
        encode_command(RegisterCode::PUSHBACK, &self.value().into())
    }
}

/// What a pushback session is doing, as seen by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "state", rename_all = "lowercase", rename_all_fields = "camelCase")
)]
pub enum PushbackState {
    Idle,
    Active {
        direction: Direction,
        heading: Heading,
    },
    Holding {
        direction: Direction,
        heading: Heading,
    },
}

#[derive(Debug)]
struct Session {
    direction: Direction,
    heading: Heading,
    hold: Option<CancellationToken>,
}

impl Session {
    fn cancel_hold(&mut self) -> bool {
        if let Some(hold) = self.hold.take() {
            hold.cancel();
            true
        }
        else {
            false
        }
    }

    fn state(&self) -> PushbackState {
        if self.hold.is_some() {
            PushbackState::Holding {
                direction: self.direction,
                heading: self.heading,
            }
        }
        else {
            PushbackState::Active {
                direction: self.direction,
                heading: self.heading,
            }
        }
    }
}

/// Session table.
///
/// Every command bumps the generation of its key before it is sent. A turn
/// only takes over the session if its generation is still current once the
/// send returned, so a stop or a newer turn that started in the meantime wins.
#[derive(Debug, Default)]
struct Sessions {
    active: HashMap<String, Session>,
    generations: HashMap<String, u64>,
}

impl Sessions {
    fn bump(&mut self, key: &str) -> u64 {
        let generation = self.generations.entry(key.to_owned()).or_default();
        *generation += 1;
        *generation
    }

    fn is_current(&self, key: &str, generation: u64) -> bool {
        self.generations.get(key) == Some(&generation)
    }
}

/// Owns the pushback sessions and their hold loops.
///
/// Cheap to clone, clones share the session table.
#[derive(Clone, Debug)]
pub struct Sequencer<S> {
    sink: S,
    sessions: Arc<Mutex<Sessions>>,
    hold_interval: Duration,
    shutdown: CancellationToken,
}

impl<S> Sequencer<S>
where
    S: LineSink + Clone + 'static,
{
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            sessions: Default::default(),
            hold_interval: DEFAULT_HOLD_INTERVAL,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_hold_interval(mut self, hold_interval: Duration) -> Self {
        self.hold_interval = hold_interval;
        self
    }

    /// Hold loops end when this token is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn start(
        &self,
        key: &str,
        direction: Direction,
        heading: Heading,
    ) -> Result<(), Error> {
        let generation = self.sessions.lock().bump(key);
        self.send(PushbackCommand::Start { direction, heading })
            .await?;

        let mut sessions = self.sessions.lock();
        if !sessions.is_current(key, generation) {
            tracing::debug!(key, "pushback start superseded");
            return Ok(());
        }
        if let Some(mut previous) = sessions.active.insert(
            key.to_owned(),
            Session {
                direction,
                heading,
                hold: None,
            },
        ) {
            previous.cancel_hold();
        }

        tracing::debug!(key, %direction, %heading, "pushback started");
        Ok(())
    }

    /// Sends a turn command. With `hold` the command is repeated until
    /// [`release`](Self::release) or [`stop`](Self::stop), replacing any
    /// earlier hold of this session. Without `hold` an earlier hold is
    /// cancelled.
    ///
    /// If another command for `key` starts while the turn is being sent, the
    /// turn leaves the session alone.
    pub async fn turn(
        &self,
        key: &str,
        direction: Direction,
        heading: Heading,
        hold: bool,
    ) -> Result<(), Error> {
        let command = PushbackCommand::Turn { direction, heading };
        let generation = self.sessions.lock().bump(key);
        self.send(command).await?;

        let mut sessions = self.sessions.lock();
        if !sessions.is_current(key, generation) {
            tracing::debug!(key, %direction, %heading, "pushback turn superseded");
            return Ok(());
        }
        let session = sessions.active.entry(key.to_owned()).or_insert_with(|| {
            Session {
                direction,
                heading,
                hold: None,
            }
        });
        session.cancel_hold();
        session.direction = direction;
        session.heading = heading;
        if hold {
            session.hold = Some(self.spawn_hold(key, command));
        }

        tracing::debug!(key, %direction, %heading, hold, "pushback turn");
        Ok(())
    }

    /// Stops re-sending turn commands. Nothing is sent to PSX. Returns whether
    /// a hold was active.
    pub fn release(&self, key: &str) -> bool {
        let mut sessions = self.sessions.lock();
        sessions.bump(key);
        let released = sessions
            .active
            .get_mut(key)
            .is_some_and(Session::cancel_hold);
        drop(sessions);
        tracing::debug!(key, released, "pushback hold released");
        released
    }

    /// Stops the pushback and ends the session.
    ///
    /// The session is gone even if sending the stop command fails.
    pub async fn stop(&self, key: &str, heading: Heading) -> Result<(), Error> {
        {
            let mut sessions = self.sessions.lock();
            sessions.bump(key);
            if let Some(mut session) = sessions.active.remove(key) {
                session.cancel_hold();
            }
        }

        self.send(PushbackCommand::Stop { heading }).await?;
        tracing::debug!(key, %heading, "pushback stopped");
        Ok(())
    }

    pub fn state(&self, key: &str) -> PushbackState {
        self.sessions
            .lock()
            .active
            .get(key)
            .map_or(PushbackState::Idle, Session::state)
    }

    pub fn active_holds(&self) -> usize {
        self.sessions
            .lock()
            .active
            .values()
            .filter(|session| session.hold.is_some())
            .count()
    }

    /// Cancels every hold loop and forgets all sessions. Turns still being
    /// sent won't install a hold afterwards.
    pub fn shutdown(&self) {
        let mut sessions = self.sessions.lock();
        for generation in sessions.generations.values_mut() {
            *generation += 1;
        }
        for (_, mut session) in sessions.active.drain() {
            session.cancel_hold();
        }
    }

    async fn send(&self, command: PushbackCommand) -> Result<(), Error> {
        self.sink.send_lines(&[command.line()]).await?;
        Ok(())
    }

    /// Must be called with the session table locked, so that a replaced hold
    /// is cancelled before the new one exists.
    fn spawn_hold(&self, key: &str, command: PushbackCommand) -> CancellationToken {
        let cancel = self.shutdown.child_token();
        let sink = self.sink.clone();
        let interval = self.hold_interval;
        let key = key.to_owned();

        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let line = command.line();
                let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticks.tick() => {}
                    }

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        result = sink.send_lines(std::slice::from_ref(&line)) => {
                            match result {
                                Ok(_) => tracing::debug!(%key, %line, "pushback hold re-sent"),
                                Err(error) => tracing::warn!(%key, %error, "pushback hold re-send failed"),
                            }
                        }
                    }
                }

                tracing::debug!(%key, "pushback hold ended");
            }
        });

        cancel
    }
}
