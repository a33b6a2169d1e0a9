//! Document expiry and its wire normalisation.
//!
//! The server interprets an expiry below 30 days as relative seconds and
//! anything larger as an absolute unix timestamp. [`Expiry::encode`] maps a
//! caller's intent onto that encoding, reading "now" from a [`Clock`] and
//! reporting noteworthy conversions to an [`EventSink`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::{KvError, Result, identifier::Identifier};

/// Largest expiry, in seconds, the server treats as relative.
pub const RELATIVE_EXPIRY_CUTOFF_SECONDS: u64 = 30 * 24 * 60 * 60;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryEvent {
    /// A relative expiry of 30 days or more was sent as an absolute timestamp.
    RelativeConvertedToAbsolute {
        relative: Duration,
        epoch_seconds: u32,
    },
    /// An absolute expiry lies in the past; the document expires immediately.
    AbsoluteInPast {
        instant: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: ExpiryEvent);
}

/// Default sink, forwards events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(&self, event: ExpiryEvent) {
        match event {
            ExpiryEvent::RelativeConvertedToAbsolute {
                relative,
                epoch_seconds,
            } => debug!(
                "relative expiry of {:?} sent as absolute timestamp {}",
                relative, epoch_seconds
            ),
            ExpiryEvent::AbsoluteInPast { instant, now } => warn!(
                "absolute expiry {} is before current time {}, document will expire immediately",
                instant, now
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Expiry {
    #[default]
    None,
    Relative(Duration),
    Absolute(DateTime<Utc>),
}

impl Expiry {
    pub fn relative(duration: Duration) -> Self {
        Expiry::Relative(duration)
    }

    pub fn absolute(instant: DateTime<Utc>) -> Self {
        Expiry::Absolute(instant)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Expiry::None) || matches!(self, Expiry::Relative(d) if d.is_zero())
    }

    /// Encodes the expiry to its wire form.
    pub fn encode(&self, clock: &dyn Clock, events: &dyn EventSink, id: &Identifier) -> Result<u32> {
        match self {
            Expiry::None => Ok(0),
            Expiry::Relative(duration) => encode_relative(*duration, clock, events, id),
            Expiry::Absolute(instant) => encode_absolute(*instant, clock, events, id),
        }
    }
}

fn encode_relative(
    duration: Duration,
    clock: &dyn Clock,
    events: &dyn EventSink,
    id: &Identifier,
) -> Result<u32> {
    if duration.is_zero() {
        return Ok(0);
    }
    // a sub-second expiry must not collapse into "never expires"
    let seconds = duration.as_secs().max(1);
    if seconds < RELATIVE_EXPIRY_CUTOFF_SECONDS {
        return Ok(seconds as u32);
    }

    let now = clock.now().timestamp();
    let epoch = u64::try_from(now)
        .ok()
        .and_then(|now| now.checked_add(seconds))
        .and_then(|epoch| u32::try_from(epoch).ok())
        .ok_or_else(|| {
            KvError::invalid_argument(
                format!("expiry of {:?} overflows the supported expiry range", duration),
                id,
            )
        })?;
    events.publish(ExpiryEvent::RelativeConvertedToAbsolute {
        relative: duration,
        epoch_seconds: epoch,
    });
    Ok(epoch)
}

fn encode_absolute(
    instant: DateTime<Utc>,
    clock: &dyn Clock,
    events: &dyn EventSink,
    id: &Identifier,
) -> Result<u32> {
    let epoch = instant.timestamp();
    if epoch == 0 {
        return Ok(0);
    }
    if epoch < RELATIVE_EXPIRY_CUTOFF_SECONDS as i64 {
        return Err(KvError::invalid_argument(
            format!(
                "absolute expiry {} is within 30 days of the unix epoch and would be read as relative",
                instant
            ),
            id,
        ));
    }
    let encoded = u32::try_from(epoch).map_err(|_| {
        KvError::invalid_argument(
            format!("absolute expiry {} is beyond the supported expiry range", instant),
            id,
        )
    })?;

    let now = clock.now();
    if instant < now {
        events.publish(ExpiryEvent::AbsoluteInPast { instant, now });
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;

    use super::*;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<ExpiryEvent>>);

    impl EventSink for RecordingSink {
        fn publish(&self, event: ExpiryEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn id() -> Identifier {
        Identifier::new("b", "_default", "_default", "k")
    }

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn short_relative_expiry_stays_relative() {
        let sink = RecordingSink::default();
        let encoded = Expiry::relative(Duration::from_secs(3600))
            .encode(&clock(), &sink, &id())
            .unwrap();
        assert_eq!(encoded, 3600);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn sub_second_expiry_rounds_up() {
        let encoded = Expiry::relative(Duration::from_millis(200))
            .encode(&clock(), &LogEventSink, &id())
            .unwrap();
        assert_eq!(encoded, 1);
        assert_eq!(
            Expiry::relative(Duration::ZERO)
                .encode(&clock(), &LogEventSink, &id())
                .unwrap(),
            0
        );
    }

    #[test]
    fn long_relative_expiry_becomes_absolute() {
        let sink = RecordingSink::default();
        let thirty_days = Duration::from_secs(RELATIVE_EXPIRY_CUTOFF_SECONDS);
        let encoded = Expiry::relative(thirty_days)
            .encode(&clock(), &sink, &id())
            .unwrap();
        let expected = clock().now().timestamp() as u32 + RELATIVE_EXPIRY_CUTOFF_SECONDS as u32;
        assert_eq!(encoded, expected);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn absolute_expiry_near_epoch_is_rejected() {
        let instant = Utc.timestamp_opt(60, 0).unwrap();
        let err = Expiry::absolute(instant)
            .encode(&clock(), &LogEventSink, &id())
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn absolute_expiry_in_past_is_reported() {
        let sink = RecordingSink::default();
        let instant = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let encoded = Expiry::absolute(instant)
            .encode(&clock(), &sink, &id())
            .unwrap();
        assert_eq!(encoded, instant.timestamp() as u32);
        assert!(matches!(
            sink.0.lock().unwrap()[0],
            ExpiryEvent::AbsoluteInPast { .. }
        ));
    }
}
