//! The probe: one owned session context plus the loop that drives it.
//!
//! [`Probe`] consumes two kinds of input, presence events and timer ticks,
//! one at a time. Each input yields a [`Step`] telling the driver whether to
//! keep going, arm the timer, or stop with a [`ProbeOutcome`]. [`run`]
//! multiplexes the timer with the event channel on the current task, so no
//! two inputs are ever handled concurrently.

use std::future::Future;
use std::process::ExitCode;

use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ProbeConfig;
use crate::error::{ProbeError, Result};
use crate::error_codes::ReasonCode;
use crate::event::PresenceEvent;
use crate::latency::{filler, LatencyEvaluator, ProbeMessage};
use crate::navigation::RoomPresence;
use crate::presence::Presence;
use crate::quotes::QuoteCorpus;
use crate::scheduler::Scheduler;
use crate::session::{Phase, Session};

/// How a probe run ended.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Every configured probe was sent.
    Completed { probes: u64 },
    /// The session ended with a zero reason.
    SignedOff,
    /// The operator interrupted the run.
    Interrupted,
    /// An unrecoverable failure.
    Failed(ProbeError),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// `0` for graceful endings, `1` for failures.
    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(1)
        }
    }
}

/// What the driver should do after one input.
#[derive(Debug)]
pub enum Step {
    Continue,
    /// (Re-)arm the timer for one interval from now.
    ArmTimer,
    Finish(ProbeOutcome),
}

/// The single owned context of a probe run.
pub struct Probe<P: Presence, R: Rng = StdRng> {
    config: ProbeConfig,
    session: Session,
    scheduler: Scheduler,
    evaluator: LatencyEvaluator,
    room: Option<RoomPresence>,
    corpus: QuoteCorpus,
    filler: String,
    presence: P,
    rng: R,
    clock: fn() -> DateTime<Local>,
}

impl<P: Presence> Probe<P, StdRng> {
    /// A probe seeded from OS entropy.
    pub fn new(config: ProbeConfig, corpus: QuoteCorpus, presence: P) -> Self {
        Self::with_rng(config, corpus, presence, StdRng::from_entropy())
    }
}

impl<P: Presence, R: Rng> Probe<P, R> {
    pub fn with_rng(config: ProbeConfig, corpus: QuoteCorpus, presence: P, rng: R) -> Self {
        if corpus.is_empty() {
            warn!("quote corpus is empty, ambient speech disabled");
        }
        Self {
            session: Session::new(config.name.clone(), config.password.clone()),
            scheduler: Scheduler::new(config.probe_count, config.talk_every),
            evaluator: LatencyEvaluator::new(
                config.name.clone(),
                config.max_lag,
                config.lag_reporting,
            ),
            room: None,
            corpus,
            filler: filler(config.payload_size),
            presence,
            rng,
            clock: Local::now,
            config,
        }
    }

    /// Replace the wall clock used to stamp and evaluate probes.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn room(&self) -> Option<&RoomPresence> {
        self.room.as_ref()
    }

    pub fn presence(&self) -> &P {
        &self.presence
    }

    /// Apply one presence event.
    pub fn handle_event(&mut self, event: PresenceEvent, now: &DateTime<Local>) -> Step {
        match event {
            PresenceEvent::Connected { attributes } => {
                match self.session.on_connected(&attributes, &self.presence) {
                    Ok(()) => Step::Continue,
                    Err(e) => Step::Finish(ProbeOutcome::Failed(e)),
                }
            }
            PresenceEvent::PlaceConnected { member } => {
                if self.session.on_place_connected(member) {
                    Step::ArmTimer
                } else {
                    Step::Continue
                }
            }
            PresenceEvent::SignOnFailed { reason, message } => Step::Finish(ProbeOutcome::Failed(
                self.session.on_sign_on_failed(reason, &message),
            )),
            PresenceEvent::Navigated { reason, title, .. } => {
                let Some(room) = self.room.as_mut() else {
                    debug!(code = reason.code(), "navigation result before room entry, ignoring");
                    return Step::Continue;
                };
                match room.on_navigated(reason, &self.presence, &mut self.rng) {
                    Ok(_) => {
                        if !title.is_empty() {
                            debug!(%title, "room title");
                        }
                        Step::Continue
                    }
                    Err(e) => {
                        error!("{e}");
                        Step::Finish(ProbeOutcome::Failed(e))
                    }
                }
            }
            PresenceEvent::Whispered { from, text } => {
                self.evaluator.on_whisper(
                    self.session.member_id(),
                    &from,
                    &text,
                    now,
                    &self.presence,
                );
                Step::Continue
            }
            PresenceEvent::ChatReceived { from, text } => {
                debug!(from = %from.name, %text, "room chat");
                Step::Continue
            }
            PresenceEvent::Pong => Step::Continue,
            PresenceEvent::Error { message, reason } => {
                warn!(code = reason.map(|r| r.code()), "service error: {message}");
                Step::Continue
            }
            PresenceEvent::Disconnecting { reason } => {
                finish_on(self.session.on_disconnecting(reason), ProbeOutcome::SignedOff)
            }
            PresenceEvent::Disconnected { reason } => {
                finish_on(self.session.on_link_lost(reason), ProbeOutcome::SignedOff)
            }
        }
    }

    /// One timer expiration.
    pub fn tick(&mut self, now: &DateTime<Local>) -> Step {
        if self.session.enter_room_once() {
            if let Err(e) = self.enter_room() {
                error!("cannot enter room: {e}");
                return Step::Finish(ProbeOutcome::Failed(e));
            }
            self.apply_avatar();
        }

        if !self.scheduler.take_probe() {
            info!(probes = self.scheduler.sent(), "probe count exhausted");
            return Step::Finish(ProbeOutcome::Completed {
                probes: self.scheduler.sent(),
            });
        }

        let Some(myself) = self.session.member_id() else {
            return Step::Finish(ProbeOutcome::Failed(ProbeError::NotConnected));
        };
        let probe = ProbeMessage::new(now, self.filler.as_str());
        if let Err(e) = self.presence.whisper(myself, &probe.encode()) {
            error!("failed to whisper to myself: {e}");
            return Step::Finish(ProbeOutcome::Failed(e));
        }
        debug!(
            sent_at = probe.sent_at(),
            remaining = self.scheduler.remaining(),
            "probe sent"
        );

        if let Some(room) = self.room.as_mut() {
            room.wander(&self.presence, &mut self.rng);
        }

        if self.scheduler.should_talk() {
            if let Some(quote) = self.corpus.pick(&mut self.rng) {
                if let Err(e) = self.presence.chat(quote) {
                    warn!("ambient speech not sent: {e}");
                }
            }
        }

        Step::ArmTimer
    }

    fn enter_room(&mut self) -> Result<()> {
        let destination = self
            .config
            .room
            .clone()
            .or_else(|| self.session.lobby_url().map(str::to_string))
            .ok_or_else(|| ProbeError::Navigation {
                destination: String::new(),
                reason: ReasonCode::InvalidDestination,
            })?;
        let room = RoomPresence::new(destination);
        room.navigate(&self.presence)?;
        self.room = Some(room);
        Ok(())
    }

    /// Best-effort: a missing or unreadable image leaves the default avatar.
    fn apply_avatar(&self) {
        match std::fs::read(&self.config.avatar) {
            Ok(image) => {
                if let Err(e) = self.presence.set_face(image) {
                    debug!("avatar not applied: {e}");
                }
            }
            Err(e) => {
                debug!(path = %self.config.avatar.display(), "avatar not loaded: {e}");
            }
        }
    }
}

fn finish_on(result: Result<()>, clean: ProbeOutcome) -> Step {
    match result {
        Ok(()) => Step::Finish(clean),
        Err(e) => Step::Finish(ProbeOutcome::Failed(e)),
    }
}

/// Drive `probe` until its session ends, the count is exhausted, or
/// `interrupt` resolves.
///
/// The loop waits on the event channel, the probe timer (armed once the
/// session is Connected and re-armed after every tick) and, while still
/// Connecting, the sign-on deadline. The deadline runs from the call to
/// `run`, so it covers the service greeting as well as the sign-on itself.
pub async fn run<P, R, F>(
    probe: &mut Probe<P, R>,
    events: &mut mpsc::Receiver<PresenceEvent>,
    interrupt: F,
) -> ProbeOutcome
where
    P: Presence,
    R: Rng,
    F: Future<Output = ()>,
{
    let interval = probe.config.interval;
    let timer = tokio::time::sleep(interval);
    tokio::pin!(timer);
    let mut armed = false;

    let sign_on_deadline = tokio::time::sleep(probe.config.sign_on_timeout);
    tokio::pin!(sign_on_deadline);

    tokio::pin!(interrupt);

    loop {
        let step = tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    let now = (probe.clock)();
                    probe.handle_event(event, &now)
                }
                None => Step::Finish(ProbeOutcome::Failed(ProbeError::TransportClosed)),
            },
            () = &mut timer, if armed => {
                armed = false;
                let now = (probe.clock)();
                probe.tick(&now)
            }
            () = &mut sign_on_deadline, if probe.session.phase() == Phase::Connecting => {
                error!(name = %probe.session.name(), "sign-on did not complete in time");
                Step::Finish(ProbeOutcome::Failed(ProbeError::Timeout))
            }
            () = &mut interrupt => {
                info!("interrupted");
                Step::Finish(ProbeOutcome::Interrupted)
            }
        };

        match step {
            Step::Continue => {}
            Step::ArmTimer => {
                timer.as_mut().reset(Instant::now() + interval);
                armed = true;
            }
            Step::Finish(outcome) => return outcome,
        }
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
    use crate::protocol::{Attribute, AttributeId, MemberId, MemberInfo, Position};
    use std::cell::RefCell;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        SignOn,
        Navigate(String, Position, u32),
        Whisper(MemberId, String),
        Chat(String),
        Move(Position),
        SetFace(usize),
    }

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<Call>>,
        refuse_whisper: bool,
    }

    impl Recorder {
        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.borrow().iter().filter(|c| pred(*c)).count()
        }
    }

    impl Presence for Recorder {
        fn sign_on(&self, _: &str, _: &str) -> Result<()> {
            self.calls.borrow_mut().push(Call::SignOn);
            Ok(())
        }
        fn navigate(&self, destination: &str, position: Position, replica: u32) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(Call::Navigate(destination.into(), position, replica));
            Ok(())
        }
        fn whisper(&self, to: MemberId, text: &str) -> Result<()> {
            if self.refuse_whisper {
                return Err(ProbeError::NotConnected);
            }
            self.calls.borrow_mut().push(Call::Whisper(to, text.into()));
            Ok(())
        }
        fn chat(&self, text: &str) -> Result<()> {
            self.calls.borrow_mut().push(Call::Chat(text.into()));
            Ok(())
        }
        fn move_to(&self, position: Position) -> Result<()> {
            self.calls.borrow_mut().push(Call::Move(position));
            Ok(())
        }
        fn set_face(&self, image: Vec<u8>) -> Result<()> {
            self.calls.borrow_mut().push(Call::SetFace(image.len()));
            Ok(())
        }
    }

    fn me() -> MemberInfo {
        MemberInfo {
            id: Uuid::from_u128(77),
            name: "probe1".into(),
        }
    }

    fn connected_probe(config: ProbeConfig, presence: Recorder) -> Probe<Recorder, StdRng> {
        let corpus = QuoteCorpus::parse("Yow!\n%\nAre we having fun yet?\n");
        let mut probe = Probe::with_rng(config, corpus, presence, StdRng::seed_from_u64(42));
        let now = Local::now();
        let attrs = vec![Attribute::new(AttributeId::LobbyUrl, "vp://hal/lobby")];
        assert!(matches!(
            probe.handle_event(PresenceEvent::Connected { attributes: attrs }, &now),
            Step::Continue
        ));
        assert!(matches!(
            probe.handle_event(PresenceEvent::PlaceConnected { member: me() }, &now),
            Step::ArmTimer
        ));
        probe
    }

    fn base_config() -> ProbeConfig {
        ProbeConfig::new("probe1", "secret", "ws://test").with_avatar("/no/such/avatar.gif")
    }

    #[test]
    fn sends_exactly_the_configured_count() {
        let mut probe = connected_probe(base_config().with_probe_count(3), Recorder::default());
        let now = Local::now();

        for _ in 0..3 {
            assert!(matches!(probe.tick(&now), Step::ArmTimer));
        }
        let Step::Finish(outcome) = probe.tick(&now) else {
            panic!("expected the fourth tick to finish");
        };
        assert!(matches!(outcome, ProbeOutcome::Completed { probes: 3 }));
        assert!(outcome.is_success());
        assert_eq!(
            probe
                .presence()
                .count(|c| matches!(c, Call::Whisper(id, _) if *id == me().id)),
            3
        );
    }

    #[test]
    fn zero_count_enters_room_then_finishes() {
        let mut probe = connected_probe(base_config().with_probe_count(0), Recorder::default());
        let step = probe.tick(&Local::now());
        assert!(matches!(
            step,
            Step::Finish(ProbeOutcome::Completed { probes: 0 })
        ));
        assert_eq!(
            probe.presence().count(|c| matches!(c, Call::Navigate(..))),
            1
        );
        assert_eq!(probe.presence().count(|c| matches!(c, Call::Whisper(..))), 0);
    }

    #[test]
    fn room_entry_happens_once_and_falls_back_to_lobby() {
        let mut probe = connected_probe(base_config().with_probe_count(20), Recorder::default());
        let now = Local::now();
        for _ in 0..10 {
            probe.tick(&now);
        }
        let navigations: Vec<Call> = probe
            .presence()
            .calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Navigate(..)))
            .cloned()
            .collect();
        assert_eq!(
            navigations,
            vec![Call::Navigate(
                "vp://hal/lobby".into(),
                Position::new(500, 500),
                1
            )]
        );
        assert!(probe.session().has_entered_room());
    }

    #[test]
    fn configured_room_wins_over_lobby() {
        let mut probe = connected_probe(
            base_config().with_room("vp://hal/lounge"),
            Recorder::default(),
        );
        probe.tick(&Local::now());
        assert_eq!(probe.room().unwrap().destination(), "vp://hal/lounge");
    }

    #[test]
    fn avatar_is_applied_when_readable() {
        let dir = tempfile::tempdir().unwrap();
        let avatar = dir.path().join("av1.gif");
        std::fs::write(&avatar, b"GIF89a-fake").unwrap();
        let mut probe = connected_probe(base_config().with_avatar(&avatar), Recorder::default());
        let now = Local::now();
        probe.tick(&now);
        probe.tick(&now);
        assert_eq!(
            probe.presence().count(|c| matches!(c, Call::SetFace(11))),
            1
        );
    }

    #[test]
    fn missing_avatar_is_not_fatal() {
        let mut probe = connected_probe(base_config(), Recorder::default());
        assert!(matches!(probe.tick(&Local::now()), Step::ArmTimer));
        assert_eq!(probe.presence().count(|c| matches!(c, Call::SetFace(_))), 0);
    }

    #[test]
    fn each_tick_whispers_then_moves() {
        let mut probe = connected_probe(
            base_config().with_payload_size(10),
            Recorder::default(),
        );
        probe.tick(&Local::now());
        let calls = probe.presence().calls.borrow();
        let whisper_at = calls
            .iter()
            .position(|c| matches!(c, Call::Whisper(..)))
            .unwrap();
        let Call::Whisper(_, text) = &calls[whisper_at] else {
            unreachable!()
        };
        assert!(text.ends_with("\tabcdefghij"), "got {text:?}");
        assert!(matches!(calls[whisper_at + 1], Call::Move(_)));
    }

    #[test]
    fn talks_every_fifth_tick() {
        let mut probe = connected_probe(base_config().with_probe_count(100), Recorder::default());
        let now = Local::now();
        for _ in 0..4 {
            probe.tick(&now);
        }
        assert_eq!(probe.presence().count(|c| matches!(c, Call::Chat(_))), 0);
        probe.tick(&now);
        assert_eq!(probe.presence().count(|c| matches!(c, Call::Chat(_))), 1);
        for _ in 0..5 {
            probe.tick(&now);
        }
        assert_eq!(probe.presence().count(|c| matches!(c, Call::Chat(_))), 2);
    }

    #[test]
    fn whisper_failure_is_fatal() {
        let presence = Recorder {
            refuse_whisper: true,
            ..Default::default()
        };
        let mut probe = connected_probe(base_config(), presence);
        let Step::Finish(outcome) = probe.tick(&Local::now()) else {
            panic!("expected failure");
        };
        assert!(!outcome.is_success());
    }

    #[test]
    fn room_full_retries_with_next_replica() {
        let mut probe = connected_probe(base_config(), Recorder::default());
        let now = Local::now();
        probe.tick(&now);

        let step = probe.handle_event(
            PresenceEvent::Navigated {
                requested: Some(Position::new(500, 500)),
                reason: ReasonCode::RoomIsFull,
                title: String::new(),
            },
            &now,
        );
        assert!(matches!(step, Step::Continue));
        assert_eq!(probe.room().unwrap().replica(), 2);

        let calls = probe.presence().calls.borrow();
        let navs: Vec<&Call> = calls
            .iter()
            .filter(|c| matches!(c, Call::Navigate(..)))
            .collect();
        assert_eq!(navs.len(), 2);
        let (Call::Navigate(_, first_pos, first_rep), Call::Navigate(_, retry_pos, retry_rep)) =
            (navs[0], navs[1])
        else {
            unreachable!()
        };
        assert_eq!(*retry_rep, first_rep + 1);
        assert_ne!(retry_pos, first_pos);
    }

    #[test]
    fn other_navigation_failures_end_the_run() {
        let mut probe = connected_probe(base_config(), Recorder::default());
        let now = Local::now();
        probe.tick(&now);
        let step = probe.handle_event(
            PresenceEvent::Navigated {
                requested: None,
                reason: ReasonCode::AccessDenied,
                title: String::new(),
            },
            &now,
        );
        assert!(matches!(
            step,
            Step::Finish(ProbeOutcome::Failed(ProbeError::Navigation { .. }))
        ));
    }

    #[test]
    fn disconnect_reason_decides_exit_status() {
        let now = Local::now();
        let mut probe = connected_probe(base_config(), Recorder::default());
        let Step::Finish(clean) = probe.handle_event(
            PresenceEvent::Disconnecting {
                reason: ReasonCode::Ok,
            },
            &now,
        ) else {
            panic!("expected finish");
        };
        assert!(clean.is_success());
        assert_eq!(probe.session().phase(), Phase::Disconnected);

        let mut probe = connected_probe(base_config(), Recorder::default());
        let Step::Finish(failed) = probe.handle_event(
            PresenceEvent::Disconnecting {
                reason: ReasonCode::SignedOffByServer,
            },
            &now,
        ) else {
            panic!("expected finish");
        };
        assert!(!failed.is_success());
    }

    #[test]
    fn sign_on_rejection_fails_the_run() {
        let mut probe = Probe::with_rng(
            base_config(),
            QuoteCorpus::default(),
            Recorder::default(),
            StdRng::seed_from_u64(1),
        );
        let step = probe.handle_event(
            PresenceEvent::SignOnFailed {
                reason: ReasonCode::InvalidCredentials,
                message: "bad password".into(),
            },
            &Local::now(),
        );
        assert!(matches!(
            step,
            Step::Finish(ProbeOutcome::Failed(ProbeError::SignOnRejected { .. }))
        ));
    }
}
