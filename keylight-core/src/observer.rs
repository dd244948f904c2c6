//! Fault notification sink
//!
//! Faults caught inside the core (a failing brush, a failing effect, a
//! backend error on the update thread) are handed to a `FaultObserver`
//! injected at keyboard construction. Observers must not panic.

use std::fmt;

use crossbeam_channel::Sender;
use tracing::warn;

use crate::error::LightingError;

/// Where a fault was caught
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultSource {
    Background,
    Group(String),
    Effect(String),
    /// The background update loop
    Scheduler,
}

impl fmt::Display for FaultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultSource::Background => write!(f, "background"),
            FaultSource::Group(name) => write!(f, "group '{name}'"),
            FaultSource::Effect(name) => write!(f, "effect '{name}'"),
            FaultSource::Scheduler => write!(f, "update loop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A paint source failed; its LEDs kept their previous color
    Paint,
    /// The device write failed
    Hardware,
    /// The update loop could not start or died
    Scheduler,
}

/// A caught fault, as delivered to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    pub source: FaultSource,
    pub kind: FaultKind,
    pub message: String,
}

impl FaultRecord {
    pub fn from_error(source: FaultSource, error: &LightingError) -> Self {
        let kind = match error {
            LightingError::Backend(_) => FaultKind::Hardware,
            LightingError::Thread(_) => FaultKind::Scheduler,
            _ => FaultKind::Paint,
        };
        Self {
            source,
            kind,
            message: error.to_string(),
        }
    }
}

pub trait FaultObserver: Send + Sync {
    fn on_fault(&self, record: FaultRecord);
}

/// Logs faults through `tracing`. Used when no observer is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl FaultObserver for LogObserver {
    fn on_fault(&self, record: FaultRecord) {
        warn!("{:?} fault in {}: {}", record.kind, record.source, record.message);
    }
}

/// Forwards faults into a channel. A disconnected receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<FaultRecord>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<FaultRecord>) -> Self {
        Self { tx }
    }

    /// Create an observer together with the receiving end of an unbounded channel.
    pub fn unbounded() -> (Self, crossbeam_channel::Receiver<FaultRecord>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl FaultObserver for ChannelObserver {
    fn on_fault(&self, record: FaultRecord) {
        let _ = self.tx.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;

    #[test]
    fn test_record_kind_from_error() {
        let hw = LightingError::Backend(BackendError::Disconnected);
        let rec = FaultRecord::from_error(FaultSource::Scheduler, &hw);
        assert_eq!(rec.kind, FaultKind::Hardware);

        let paint = LightingError::Paint {
            origin: FaultSource::Group("wasd".into()),
            message: "boom".into(),
        };
        let rec = FaultRecord::from_error(FaultSource::Group("wasd".into()), &paint);
        assert_eq!(rec.kind, FaultKind::Paint);
        assert!(rec.message.contains("boom"));

        let spawn = LightingError::Thread(std::io::Error::other("no threads left"));
        let rec = FaultRecord::from_error(FaultSource::Scheduler, &spawn);
        assert_eq!(rec.kind, FaultKind::Scheduler);
    }

    #[test]
    fn test_channel_observer_survives_dropped_receiver() {
        let (obs, rx) = ChannelObserver::unbounded();
        obs.on_fault(FaultRecord {
            source: FaultSource::Background,
            kind: FaultKind::Paint,
            message: "first".into(),
        });
        assert_eq!(rx.try_recv().map(|r| r.message), Ok("first".to_string()));
        drop(rx);
        obs.on_fault(FaultRecord {
            source: FaultSource::Background,
            kind: FaultKind::Paint,
            message: "second".into(),
        });
    }
}
