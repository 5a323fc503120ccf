//! Current-time resolution for attendance punches and workorder stamps.
//!
//! Sources are tried in a fixed order (NTP, HTTP API A, HTTP API B) and the
//! local system clock is the last resort. Any failure of a source, including
//! its timeout, moves on to the next one; nothing is retried. The resolver
//! itself never fails.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::ntp;
use crate::Config;

#[derive(Debug, thiserror::Error)]
pub enum TimeError {
    #[error("time source timed out")]
    Timeout,
    #[error("time source io: {0}")]
    Io(#[from] std::io::Error),
    #[error("time source http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed time payload: {0}")]
    Malformed(String),
}

/// A place the current instant can be read from.
#[async_trait]
pub trait TimeSource: Send + Sync {
    fn label(&self) -> &str;
    async fn now_utc(&self) -> Result<DateTime<Utc>, TimeError>;
}

pub struct NtpSource {
    server: String,
    timeout: Duration,
}

impl NtpSource {
    pub fn new(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            timeout,
        }
    }
}

#[async_trait]
impl TimeSource for NtpSource {
    fn label(&self) -> &str {
        &self.server
    }
    async fn now_utc(&self) -> Result<DateTime<Utc>, TimeError> {
        ntp::query(&self.server, self.timeout).await
    }
}

/// `{"datetime": "2024-05-01T09:00:00.123456+05:30", ...}`
#[derive(Deserialize)]
struct IsoPayload {
    datetime: String,
}

pub fn parse_iso_payload(body: &str) -> Result<DateTime<Utc>, TimeError> {
    let payload: IsoPayload =
        serde_json::from_str(body).map_err(|e| TimeError::Malformed(e.to_string()))?;
    DateTime::parse_from_rfc3339(&payload.datetime)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TimeError::Malformed(e.to_string()))
}

/// `{"year": 2024, "month": 5, "day": 1, "hour": 9, "minute": 0, "seconds": 0,
/// "milliseconds": 120, ...}` expressed in the requested zone.
#[derive(Deserialize)]
struct FieldsPayload {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    #[serde(default)]
    seconds: u32,
    #[serde(default)]
    milliseconds: u32,
}

pub fn parse_fields_payload(body: &str, zone: FixedOffset) -> Result<DateTime<Utc>, TimeError> {
    let p: FieldsPayload =
        serde_json::from_str(body).map_err(|e| TimeError::Malformed(e.to_string()))?;
    let local = NaiveDate::from_ymd_opt(p.year, p.month, p.day)
        .and_then(|d| d.and_hms_milli_opt(p.hour, p.minute, p.seconds, p.milliseconds))
        .ok_or_else(|| TimeError::Malformed("time fields out of range".to_owned()))?;
    zone.from_local_datetime(&local)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| TimeError::Malformed("ambiguous local time".to_owned()))
}

#[derive(Debug, Clone, Copy)]
pub enum PayloadKind {
    Iso,
    Fields,
}

pub struct HttpTimeSource {
    url: String,
    kind: PayloadKind,
    zone: FixedOffset,
    client: reqwest::Client,
}

impl HttpTimeSource {
    pub fn new(
        url: impl Into<String>,
        kind: PayloadKind,
        zone: FixedOffset,
        timeout: Duration,
    ) -> Result<Self, TimeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            kind,
            zone,
            client,
        })
    }
}

#[async_trait]
impl TimeSource for HttpTimeSource {
    fn label(&self) -> &str {
        &self.url
    }
    async fn now_utc(&self) -> Result<DateTime<Utc>, TimeError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        match self.kind {
            PayloadKind::Iso => parse_iso_payload(&body),
            PayloadKind::Fields => parse_fields_payload(&body, self.zone),
        }
    }
}

pub const SYSTEM_CLOCK: &str = "system clock (fallback)";

/// Outcome of one resolution, including the debug view of the source that won.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved {
    /// Civil time in the target zone, without offset.
    pub now: NaiveDateTime,
    pub source: String,
    /// The local clock read at the same moment, for comparison.
    pub system: NaiveDateTime,
    /// `false` when only the local clock was available.
    pub trusted: bool,
}

impl Resolved {
    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }
    pub fn warning(&self) -> Option<&'static str> {
        op::ternary!(self.trusted => None; Some(
            "Network time unavailable, using the server's local clock which may be incorrect."
        ))
    }
}

pub struct TimeResolver {
    sources: Vec<Box<dyn TimeSource>>,
    zone: FixedOffset,
}

impl TimeResolver {
    pub fn new(sources: Vec<Box<dyn TimeSource>>, zone: FixedOffset) -> Self {
        Self { sources, zone }
    }

    /// NTP, then the two HTTP APIs from the config.
    pub fn from_config(config: &Config) -> Result<Self, TimeError> {
        let zone = config.offset();
        let timeout = config.time_timeout();
        let sources: Vec<Box<dyn TimeSource>> = vec![
            Box::new(NtpSource::new(config.ntp_server(), timeout)),
            Box::new(HttpTimeSource::new(
                config.time_api_primary(),
                PayloadKind::Iso,
                zone,
                timeout,
            )?),
            Box::new(HttpTimeSource::new(
                config.time_api_secondary(),
                PayloadKind::Fields,
                zone,
                timeout,
            )?),
        ];
        Ok(Self::new(sources, zone))
    }

    fn to_civil(&self, t: DateTime<Utc>) -> NaiveDateTime {
        t.with_timezone(&self.zone).naive_local()
    }

    pub async fn resolve(&self) -> Resolved {
        let system = self.to_civil(Utc::now());
        for source in &self.sources {
            match source.now_utc().await {
                Ok(t) => {
                    return Resolved {
                        now: self.to_civil(t),
                        source: source.label().to_owned(),
                        system,
                        trusted: true,
                    }
                }
                Err(e) => tracing::debug!(source = source.label(), "time source failed: {e}"),
            }
        }
        tracing::warn!("network time unavailable, falling back to the system clock");
        Resolved {
            now: system,
            source: SYSTEM_CLOCK.to_owned(),
            system,
            trusted: false,
        }
    }

    pub async fn now(&self) -> NaiveDateTime {
        self.resolve().await.now
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use chrono::Timelike;

    use super::*;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    struct Fixed {
        label: &'static str,
        at: Option<DateTime<Utc>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TimeSource for Fixed {
        fn label(&self) -> &str {
            self.label
        }
        async fn now_utc(&self) -> Result<DateTime<Utc>, TimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.at.ok_or(TimeError::Timeout)
        }
    }

    fn source(label: &'static str, at: Option<DateTime<Utc>>, calls: &Arc<AtomicUsize>) -> Box<dyn TimeSource> {
        Box::new(Fixed {
            label,
            at,
            calls: calls.clone(),
        })
    }

    #[tokio::test]
    async fn first_working_source_wins_and_later_ones_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 3, 30, 0).unwrap();
        let resolver = TimeResolver::new(
            vec![
                source("ntp", Some(at), &calls),
                source("api-a", Some(at), &calls),
            ],
            ist(),
        );
        let resolved = resolver.resolve().await;
        assert_eq!(resolved.source, "ntp");
        assert!(resolved.trusted);
        assert_eq!(resolved.now.hour(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_fall_through_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let resolver = TimeResolver::new(
            vec![
                source("ntp", None, &calls),
                source("api-a", None, &calls),
                source("api-b", Some(at), &calls),
            ],
            ist(),
        );
        let resolved = resolver.resolve().await;
        assert_eq!(resolved.source, "api-b");
        assert_eq!(resolved.now, at.with_timezone(&ist()).naive_local());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn all_failing_returns_system_clock_in_target_zone() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = TimeResolver::new(
            vec![
                source("ntp", None, &calls),
                source("api-a", None, &calls),
                source("api-b", None, &calls),
            ],
            ist(),
        );
        let before = Utc::now().with_timezone(&ist()).naive_local();
        let resolved = resolver.resolve().await;
        let after = Utc::now().with_timezone(&ist()).naive_local();
        assert!(!resolved.trusted);
        assert_eq!(resolved.source, SYSTEM_CLOCK);
        assert_eq!(resolved.now, resolved.system);
        assert!(before <= resolved.now && resolved.now <= after);
        assert!(resolved.warning().is_some());
    }

    #[test]
    fn iso_payload_keeps_the_instant() {
        let body = r#"{"abbreviation":"IST","datetime":"2024-05-01T09:00:00.250000+05:30","utc_offset":"+05:30"}"#;
        let t = parse_iso_payload(body).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 5, 1, 3, 30, 0).unwrap() + chrono::Duration::milliseconds(250));
    }

    #[test]
    fn fields_payload_is_read_in_the_target_zone() {
        let body = r#"{"year":2024,"month":5,"day":1,"hour":9,"minute":0,"seconds":5,"milliseconds":0,"timeZone":"Asia/Kolkata"}"#;
        let t = parse_fields_payload(body, ist()).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 5, 1, 3, 30, 5).unwrap());
    }

    #[test]
    fn garbage_payloads_are_malformed() {
        assert!(matches!(parse_iso_payload("<html>"), Err(TimeError::Malformed(_))));
        assert!(matches!(
            parse_fields_payload(r#"{"year":2024,"month":13,"day":1,"hour":0,"minute":0}"#, ist()),
            Err(TimeError::Malformed(_))
        ));
    }
}
