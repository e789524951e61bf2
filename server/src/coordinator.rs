use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use lockstep_core::{Command, Link, ProtocolError};
use serde::Serialize;

use crate::barrier::SyncRound;

/// Hands out `slave-<millis>` ids, forced strictly increasing so that two
/// connects inside the same millisecond still get distinct ids.
#[derive(Debug, Default)]
struct SessionIds {
    last: u64,
}

impl SessionIds {
    fn next(&mut self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        self.last = now.max(self.last + 1);
        format!("slave-{}", self.last)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CoordinatorStatus {
    pub sessions: Vec<String>,
    pub round_pending: bool,
    pub reports: usize,
}

/// The session registry and the synchronization round, owned together so
/// that every inbound event mutates both under one critical section.
pub struct Coordinator<L: Link> {
    sessions: HashMap<String, L>,
    round: Option<SyncRound>,
    ids: SessionIds,
}

impl<L: Link> Default for Coordinator<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Link> Coordinator<L> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            round: None,
            ids: SessionIds::default(),
        }
    }

    /// Stores a new session, tells it its id and pulls it into a fresh sync
    /// round straight away.
    pub fn register(&mut self, mut link: L) -> String {
        let id = self.ids.next();
        tracing::info!("New slave connected, assigning id {}", id);

        if let Err(e) = link.send(Command::Identity(id.clone()).encode()) {
            tracing::debug!("[{}] could not deliver id: {}", id, e);
        }
        self.sessions.insert(id.clone(), link);

        self.yik();
        id
    }

    /// Removes a session and re-checks the pending round against the smaller
    /// registry. Returns the seek target if that completed the round.
    pub fn unregister(&mut self, id: &str) -> Option<f64> {
        self.sessions.remove(id)?;
        tracing::info!("[{}] disconnected, {} slaves left", id, self.sessions.len());

        if let Some(round) = self.round.as_mut() {
            round.forget(id);
        }

        if self.sessions.is_empty() {
            if self.round.take().is_some() {
                tracing::debug!("Abandoning sync round, no slaves left");
            }
            return None;
        }

        self.try_resolve()
    }

    /// Sends a command to every session whose link is open. Returns how many
    /// sessions it reached.
    pub fn broadcast(&mut self, command: &Command) -> usize {
        let frame = command.encode();
        let mut delivered = 0;

        for (id, link) in self.sessions.iter_mut() {
            if !link.is_open() {
                tracing::debug!("[{}] skipped {}: link {:?}", id, command.key(), link.state());
                continue;
            }
            match link.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!("[{}] skipped {}: {}", id, command.key(), e),
            }
        }

        delivered
    }

    /// Starts a new sync round, discarding any partial one, and polls every
    /// session for its position.
    pub fn yik(&mut self) {
        if let Some(stale) = self.round.replace(SyncRound::new()) {
            tracing::debug!("Superseding sync round with {} reports", stale.len());
        }
        let polled = self.broadcast(&Command::RequestPosition);
        tracing::debug!("Sync round started, polled {} slaves", polled);
    }

    /// Records a position report into the current round. Returns the seek
    /// target when this report completed the round.
    pub fn report(&mut self, id: &str, position: Option<f64>) -> Option<f64> {
        if !self.sessions.contains_key(id) {
            tracing::debug!("[{}] report from unknown slave ignored", id);
            return None;
        }
        let Some(round) = self.round.as_mut() else {
            tracing::debug!("[{}] report outside of a sync round ignored", id);
            return None;
        };

        round.record(id, position);
        self.try_resolve()
    }

    /// Decodes and applies a frame received from session `id`. Bad frames
    /// are logged and dropped.
    pub fn handle_frame(&mut self, id: &str, frame: &str) {
        match Command::decode(frame) {
            Ok(command) => {
                tracing::debug!("[{}] sent: {:?}", id, command);
                self.handle_command(id, command);
            }
            Err(ProtocolError::UnknownKey(key)) => {
                tracing::debug!("[{}] ignoring unknown command `{}`", id, key);
            }
            Err(e) => {
                tracing::warn!("[{}] dropped frame {:?}: {}", id, frame, e);
            }
        }
    }

    pub fn handle_command(&mut self, from: &str, command: Command) {
        match command {
            Command::RequestPosition => self.yik(),
            Command::ReportPosition(position) => {
                self.report(from, position);
            }
            Command::Stop | Command::TogglePlayPause => {
                self.broadcast(&command);
            }
            Command::Seek(fraction) => {
                self.broadcast(&Command::Seek(fraction.clamp(0.0, 1.0)));
            }
            Command::Identity(_) => {
                tracing::debug!("[{}] ignoring id sent by a slave", from);
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn round_pending(&self) -> bool {
        self.round.is_some()
    }

    pub fn status(&self) -> CoordinatorStatus {
        let mut sessions: Vec<String> = self.sessions.keys().cloned().collect();
        sessions.sort();
        CoordinatorStatus {
            sessions,
            round_pending: self.round.is_some(),
            reports: self.round.as_ref().map_or(0, SyncRound::len),
        }
    }

    fn try_resolve(&mut self) -> Option<f64> {
        let registered = self.sessions.len();
        if !self.round.as_ref()?.is_complete(registered) {
            return None;
        }

        let round = self.round.take()?;
        let target = round.target();
        tracing::info!(
            "Sync round complete ({} reports), seeking to {:.3}",
            round.len(),
            target
        );
        self.broadcast(&Command::Seek(target));
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{LinkError, LinkState};
    use std::sync::{Arc, Mutex};

    /// Link double that records every frame it is asked to send.
    #[derive(Clone)]
    struct RecordingLink {
        state: Arc<Mutex<LinkState>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingLink {
        fn open() -> Self {
            Self {
                state: Arc::new(Mutex::new(LinkState::Open)),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn set_state(&self, state: LinkState) {
            *self.state.lock().unwrap() = state;
        }

        fn commands(&self) -> Vec<Command> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|frame| Command::decode(frame).unwrap())
                .collect()
        }

        fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }

        fn seeks(&self) -> Vec<f64> {
            self.commands()
                .into_iter()
                .filter_map(|command| match command {
                    Command::Seek(value) => Some(value),
                    _ => None,
                })
                .collect()
        }
    }

    impl Link for RecordingLink {
        fn state(&self) -> LinkState {
            *self.state.lock().unwrap()
        }

        fn open(&mut self) {}

        fn send(&mut self, frame: String) -> Result<(), LinkError> {
            let state = self.state();
            if state != LinkState::Open {
                return Err(LinkError::NotOpen(state));
            }
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }
    }

    fn connect(coordinator: &mut Coordinator<RecordingLink>) -> (String, RecordingLink) {
        let link = RecordingLink::open();
        let id = coordinator.register(link.clone());
        (id, link)
    }

    #[test]
    fn test_register_assigns_id_then_polls() {
        let mut coordinator = Coordinator::new();
        let (id, link) = connect(&mut coordinator);

        assert!(id.starts_with("slave-"));
        assert_eq!(
            link.commands(),
            vec![Command::Identity(id.clone()), Command::RequestPosition]
        );
        assert!(coordinator.round_pending());
    }

    #[test]
    fn test_ids_are_unique() {
        let mut coordinator = Coordinator::new();
        let ids: Vec<String> = (0..50).map(|_| connect(&mut coordinator).0).collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_round_resolves_to_max_report() {
        let mut coordinator = Coordinator::new();
        let peers: Vec<_> = (0..3).map(|_| connect(&mut coordinator)).collect();
        coordinator.yik();
        peers.iter().for_each(|(_, link)| link.clear());

        assert_eq!(coordinator.report(&peers[0].0, Some(0.3)), None);
        assert_eq!(coordinator.report(&peers[1].0, Some(0.8)), None);
        assert_eq!(coordinator.report(&peers[2].0, None), Some(0.8));

        assert!(!coordinator.round_pending());
        assert_eq!(coordinator.status().reports, 0);
        for (_, link) in &peers {
            assert_eq!(link.commands(), vec![Command::Seek(0.8)]);
        }
    }

    #[test]
    fn test_all_inactive_round_seeks_to_zero() {
        let mut coordinator = Coordinator::new();
        let (a, link_a) = connect(&mut coordinator);
        let (b, _) = connect(&mut coordinator);

        coordinator.report(&a, None);
        assert_eq!(coordinator.report(&b, None), Some(0.0));
        assert_eq!(link_a.seeks(), vec![0.0]);
    }

    #[test]
    fn test_new_session_changes_the_denominator() {
        let mut coordinator = Coordinator::new();
        let (a, _) = connect(&mut coordinator);
        let (b, _) = connect(&mut coordinator);
        coordinator.report(&a, Some(0.5));

        // Joining restarts the round, so the earlier report no longer counts.
        let (c, link_c) = connect(&mut coordinator);
        assert_eq!(coordinator.report(&b, Some(0.1)), None);
        assert_eq!(coordinator.report(&c, Some(0.2)), None);
        assert!(coordinator.round_pending());
        assert_eq!(coordinator.report(&a, Some(0.6)), Some(0.6));
        assert_eq!(link_c.seeks(), vec![0.6]);
    }

    #[test]
    fn test_unregistering_last_straggler_completes_round() {
        let mut coordinator = Coordinator::new();
        let (a, link_a) = connect(&mut coordinator);
        let (b, _) = connect(&mut coordinator);
        coordinator.yik();

        coordinator.report(&a, Some(0.25));
        assert_eq!(coordinator.unregister(&b), Some(0.25));
        assert_eq!(link_a.seeks(), vec![0.25]);
        assert!(!coordinator.round_pending());
    }

    #[test]
    fn test_departed_reporter_is_dropped_from_round() {
        let mut coordinator = Coordinator::new();
        let (a, _) = connect(&mut coordinator);
        let (b, _) = connect(&mut coordinator);
        let (c, link_c) = connect(&mut coordinator);
        coordinator.yik();

        coordinator.report(&a, Some(0.9));
        assert_eq!(coordinator.unregister(&a), None);
        assert_eq!(coordinator.report(&b, Some(0.1)), None);
        assert_eq!(coordinator.report(&c, None), Some(0.1));
        assert_eq!(link_c.seeks(), vec![0.1]);
    }

    #[test]
    fn test_last_session_leaving_abandons_round() {
        let mut coordinator = Coordinator::new();
        let (a, _) = connect(&mut coordinator);
        assert!(coordinator.round_pending());
        assert_eq!(coordinator.unregister(&a), None);
        assert!(!coordinator.round_pending());
        assert_eq!(coordinator.unregister(&a), None);
    }

    #[test]
    fn test_reports_outside_a_round_are_ignored() {
        let mut coordinator = Coordinator::new();
        let (a, link) = connect(&mut coordinator);
        assert_eq!(coordinator.report(&a, Some(0.4)), Some(0.4));
        link.clear();

        assert_eq!(coordinator.report(&a, Some(0.7)), None);
        assert_eq!(coordinator.report("slave-0", Some(0.7)), None);
        assert!(link.commands().is_empty());
    }

    #[test]
    fn test_broadcast_skips_links_that_are_not_open() {
        let mut coordinator = Coordinator::new();
        let (_, open) = connect(&mut coordinator);
        let (_, closing) = connect(&mut coordinator);
        closing.set_state(LinkState::Closing);
        open.clear();
        closing.clear();

        assert_eq!(coordinator.broadcast(&Command::Stop), 1);
        assert_eq!(open.commands(), vec![Command::Stop]);
        assert!(closing.commands().is_empty());
    }

    #[test]
    fn test_direct_commands_bypass_the_round() {
        let mut coordinator = Coordinator::new();
        let (a, link_a) = connect(&mut coordinator);
        let (b, _) = connect(&mut coordinator);
        coordinator.report(&a, Some(0.3));
        link_a.clear();

        coordinator.handle_frame(&b, r#"{"key":"stop"}"#);
        coordinator.handle_frame(&b, r#"{"key":"seek","value":1.7}"#);
        coordinator.handle_frame(&b, r#"{"key":"toggle"}"#);
        assert_eq!(
            link_a.commands(),
            vec![Command::Stop, Command::Seek(1.0), Command::TogglePlayPause]
        );

        assert!(coordinator.round_pending());
        assert_eq!(coordinator.status().reports, 1);
        assert_eq!(coordinator.report(&b, None), Some(0.3));
    }

    #[test]
    fn test_slave_yik_restarts_round() {
        let mut coordinator = Coordinator::new();
        let (a, link_a) = connect(&mut coordinator);
        let (b, _) = connect(&mut coordinator);
        coordinator.report(&a, Some(0.3));
        link_a.clear();

        coordinator.handle_frame(&b, r#"{"key":"yik"}"#);
        assert_eq!(link_a.commands(), vec![Command::RequestPosition]);
        assert_eq!(coordinator.status().reports, 0);
    }

    #[test]
    fn test_bad_frames_are_dropped() {
        let mut coordinator = Coordinator::new();
        let (a, link) = connect(&mut coordinator);
        link.clear();

        coordinator.handle_frame(&a, "not json");
        coordinator.handle_frame(&a, r#"{"key":"warp"}"#);
        coordinator.handle_frame(&a, r#"{"key":"id","value":"slave-x"}"#);
        assert!(link.commands().is_empty());
        assert_eq!(coordinator.session_count(), 1);
        assert!(coordinator.round_pending());
    }

    #[test]
    fn test_three_slaves_one_drops_mid_round() {
        let mut coordinator = Coordinator::new();
        let (one, _) = connect(&mut coordinator);
        let (two, link_two) = connect(&mut coordinator);
        let (three, link_three) = connect(&mut coordinator);
        coordinator.yik();
        link_two.clear();
        link_three.clear();

        coordinator.handle_frame(&two, r#"{"key":"yak","value":0.4}"#);
        coordinator.handle_frame(&three, r#"{"key":"yak","value":null}"#);
        assert!(coordinator.round_pending());

        assert_eq!(coordinator.unregister(&one), Some(0.4));
        assert_eq!(link_two.commands(), vec![Command::Seek(0.4)]);
        assert_eq!(link_three.commands(), vec![Command::Seek(0.4)]);
        assert_eq!(coordinator.status().sessions.len(), 2);
    }
}
