//! Probe messages and round-trip latency evaluation.
//!
//! A probe is a self-addressed whisper of three TAB-separated fields:
//! emission time in seconds since the epoch, the same instant as readable
//! local time, and filler text of the configured length. When the whisper
//! comes back, the first field gives the round-trip delay.

use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tracing::{debug, warn};

use crate::config::LagReporting;
use crate::presence::Presence;
use crate::protocol::{MemberId, MemberInfo};

/// Field separator inside a probe message.
pub const FIELD_DELIMITER: char = '\t';

const PROBE_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";
const REPORT_TIME_FORMAT: &str = "%Y%m%d %H:%M:%S";

/// `len` characters cycling through `a..=z`.
pub fn filler(len: usize) -> String {
    (b'a'..=b'z').cycle().take(len).map(char::from).collect()
}

/// One outgoing probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeMessage {
    sent_at: i64,
    sent_at_text: String,
    filler: String,
}

impl ProbeMessage {
    pub fn new<Tz: TimeZone>(now: &DateTime<Tz>, filler: impl Into<String>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            sent_at: now.timestamp(),
            sent_at_text: now.format(PROBE_TIME_FORMAT).to_string(),
            filler: filler.into(),
        }
    }

    pub fn sent_at(&self) -> i64 {
        self.sent_at
    }

    /// Wire form of the probe.
    pub fn encode(&self) -> String {
        format!(
            "{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}",
            self.sent_at, self.sent_at_text, self.filler
        )
    }
}

/// Read the emission timestamp from an echoed probe.
pub fn parse_sent_at(payload: &str) -> Option<i64> {
    payload
        .split(FIELD_DELIMITER)
        .next()
        .and_then(|field| field.trim().parse().ok())
}

/// How a received whisper was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhisperVerdict {
    /// Self-echo within the lag threshold.
    OnTime { elapsed: i64 },
    /// Self-echo over the threshold; `report` went to `route`.
    Lagging {
        elapsed: i64,
        report: String,
        route: LagReporting,
    },
    /// Self-echo without a readable timestamp.
    Unreadable,
    /// Whisper from someone else, relayed into the room as `text`.
    Relayed { text: String },
}

/// Classifies whispers and routes lag reports.
#[derive(Debug, Clone)]
pub struct LatencyEvaluator {
    name: String,
    max_lag_secs: i64,
    reporting: LagReporting,
}

impl LatencyEvaluator {
    pub fn new(name: impl Into<String>, max_lag: Duration, reporting: LagReporting) -> Self {
        Self {
            name: name.into(),
            max_lag_secs: i64::try_from(max_lag.as_secs()).unwrap_or(i64::MAX),
            reporting,
        }
    }

    /// Decide what a whisper means without acting on it.
    pub fn classify(
        &self,
        myself: Option<MemberId>,
        from: &MemberInfo,
        text: &str,
        now: &DateTime<Local>,
    ) -> WhisperVerdict {
        if myself != Some(from.id) {
            return WhisperVerdict::Relayed {
                text: format!("{} said: {}", from.name, text),
            };
        }

        // The timestamp came off the wire; an out-of-range one is unreadable.
        let Some(elapsed) =
            parse_sent_at(text).and_then(|sent_at| now.timestamp().checked_sub(sent_at))
        else {
            return WhisperVerdict::Unreadable;
        };
        if elapsed <= self.max_lag_secs {
            return WhisperVerdict::OnTime { elapsed };
        }

        WhisperVerdict::Lagging {
            elapsed,
            report: format!(
                "{} - {} - LAG {} seconds",
                now.format(REPORT_TIME_FORMAT),
                self.name,
                elapsed
            ),
            route: self.reporting,
        }
    }

    /// Classify a whisper and carry out the resulting action.
    ///
    /// Room broadcasts are best-effort: a request that cannot be queued is
    /// logged, never fatal.
    pub fn on_whisper<P: Presence>(
        &self,
        myself: Option<MemberId>,
        from: &MemberInfo,
        text: &str,
        now: &DateTime<Local>,
        presence: &P,
    ) -> WhisperVerdict {
        let verdict = self.classify(myself, from, text, now);
        match &verdict {
            WhisperVerdict::OnTime { elapsed } => {
                debug!(elapsed, "probe echo on time");
            }
            WhisperVerdict::Lagging {
                report,
                route: LagReporting::Log,
                ..
            } => {
                warn!("{report}");
            }
            WhisperVerdict::Lagging {
                report,
                route: LagReporting::Room,
                ..
            } => {
                if let Err(e) = presence.chat(report) {
                    warn!("{report} (room report not sent: {e})");
                }
            }
            WhisperVerdict::Unreadable => {
                warn!(payload = %text, "self-echo without a timestamp");
            }
            WhisperVerdict::Relayed { text } => {
                if let Err(e) = presence.chat(text) {
                    warn!("relay not sent: {e}");
                }
            }
        }
        verdict
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::protocol::Position;
    use std::cell::RefCell;
    use uuid::Uuid;

    #[derive(Default)]
    struct ChatRecorder {
        chats: RefCell<Vec<String>>,
    }

    impl Presence for ChatRecorder {
        fn sign_on(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        fn navigate(&self, _: &str, _: Position, _: u32) -> Result<()> {
            Ok(())
        }
        fn whisper(&self, _: MemberId, _: &str) -> Result<()> {
            Ok(())
        }
        fn chat(&self, text: &str) -> Result<()> {
            self.chats.borrow_mut().push(text.to_string());
            Ok(())
        }
        fn move_to(&self, _: Position) -> Result<()> {
            Ok(())
        }
        fn set_face(&self, _: Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    fn me() -> MemberInfo {
        MemberInfo {
            id: Uuid::from_u128(1),
            name: "probe1".into(),
        }
    }

    fn echo_sent(secs_ago: i64, now: &DateTime<Local>) -> String {
        let sent = *now - chrono::Duration::seconds(secs_ago);
        ProbeMessage::new(&sent, filler(10)).encode()
    }

    #[test]
    fn filler_cycles_the_alphabet() {
        assert_eq!(filler(0), "");
        assert_eq!(filler(10), "abcdefghij");
        let long = filler(30);
        assert_eq!(long.len(), 30);
        assert!(long.ends_with("zabcd"));
    }

    #[test]
    fn probe_has_three_tab_separated_fields() {
        let now = Local::now();
        let encoded = ProbeMessage::new(&now, filler(25)).encode();
        let fields: Vec<&str> = encoded.split(FIELD_DELIMITER).collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], now.timestamp().to_string());
        assert_eq!(fields[2].len(), 25);
        assert_eq!(parse_sent_at(&encoded), Some(now.timestamp()));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_sent_at("hello\tthere"), None);
        assert_eq!(parse_sent_at(""), None);
    }

    #[test]
    fn seven_seconds_over_a_five_second_threshold_is_lag() {
        let presence = ChatRecorder::default();
        let evaluator = LatencyEvaluator::new("probe1", Duration::from_secs(5), LagReporting::Room);
        let now = Local::now();

        let verdict =
            evaluator.on_whisper(Some(me().id), &me(), &echo_sent(7, &now), &now, &presence);

        let WhisperVerdict::Lagging {
            elapsed, report, ..
        } = verdict.clone()
        else {
            panic!("expected lag, got {verdict:?}");
        };
        assert_eq!(elapsed, 7);
        assert!(report.contains("LAG 7 seconds"), "got {report}");
        assert!(report.contains(" - probe1 - "), "got {report}");
        assert_eq!(presence.chats.borrow().as_slice(), &[report]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let presence = ChatRecorder::default();
        let evaluator = LatencyEvaluator::new("probe1", Duration::from_secs(5), LagReporting::Room);
        let now = Local::now();

        let verdict =
            evaluator.on_whisper(Some(me().id), &me(), &echo_sent(5, &now), &now, &presence);

        assert_eq!(verdict, WhisperVerdict::OnTime { elapsed: 5 });
        assert!(presence.chats.borrow().is_empty());
    }

    #[test]
    fn log_mode_never_touches_the_room() {
        let presence = ChatRecorder::default();
        let evaluator = LatencyEvaluator::new("probe1", Duration::from_secs(1), LagReporting::Log);
        let now = Local::now();

        let verdict =
            evaluator.on_whisper(Some(me().id), &me(), &echo_sent(30, &now), &now, &presence);

        assert!(matches!(
            verdict,
            WhisperVerdict::Lagging {
                route: LagReporting::Log,
                ..
            }
        ));
        assert!(presence.chats.borrow().is_empty());
    }

    #[test]
    fn whispers_from_others_are_relayed() {
        let presence = ChatRecorder::default();
        let evaluator = LatencyEvaluator::new("probe1", Duration::from_secs(5), LagReporting::Log);
        let stranger = MemberInfo {
            id: Uuid::from_u128(2),
            name: "alice".into(),
        };

        let verdict = evaluator.on_whisper(
            Some(me().id),
            &stranger,
            "are you a bot?",
            &Local::now(),
            &presence,
        );

        assert_eq!(
            verdict,
            WhisperVerdict::Relayed {
                text: "alice said: are you a bot?".into()
            }
        );
        assert_eq!(
            presence.chats.borrow().as_slice(),
            &["alice said: are you a bot?".to_string()]
        );
    }

    #[test]
    fn out_of_range_timestamp_is_unreadable() {
        let evaluator = LatencyEvaluator::new("probe1", Duration::from_secs(5), LagReporting::Room);
        let now = Local::now();
        for stamp in [i64::MIN, i64::MIN + 1] {
            let text = format!("{stamp}\tx\ty");
            assert_eq!(
                evaluator.classify(Some(me().id), &me(), &text, &now),
                WhisperVerdict::Unreadable
            );
        }
        // A far-future stamp is still a valid (negative) delay.
        let text = format!("{}\tx\ty", i64::MAX);
        assert!(matches!(
            evaluator.classify(Some(me().id), &me(), &text, &now),
            WhisperVerdict::OnTime { .. }
        ));
    }

    #[test]
    fn unreadable_echo_is_ignored() {
        let presence = ChatRecorder::default();
        let evaluator = LatencyEvaluator::new("probe1", Duration::from_secs(5), LagReporting::Room);
        let verdict = evaluator.on_whisper(
            Some(me().id),
            &me(),
            "no timestamp here",
            &Local::now(),
            &presence,
        );
        assert_eq!(verdict, WhisperVerdict::Unreadable);
        assert!(presence.chats.borrow().is_empty());
    }
}
