use std::time::Duration;

use lockstep_core::{Command, Link, LinkEvent, LinkState, ProtocolError};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::control::Control;
use crate::player::Actuator;

pub const DEFAULT_LABEL: &str = "slave-?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_delivery_attempts: u32,
    pub max_yik_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            max_delivery_attempts: 10,
            max_yik_attempts: 10,
        }
    }
}

/// Deferred work the agent schedules for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    RetryDelivery,
    RetryYik,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Disconnected,
    Connecting,
    Connected,
}

/// A bounded retry counter plus the handle of the timer it last armed.
#[derive(Debug)]
struct Retry {
    attempts: u32,
    max: u32,
    timer: Option<AbortHandle>,
}

impl Retry {
    fn new(max: u32) -> Self {
        Self {
            attempts: 0,
            max,
            timer: None,
        }
    }

    /// Arms a timer that sends `task` after `delay`. Returns false, and
    /// starts counting from zero again, once the attempts are spent.
    fn schedule(
        &mut self,
        scheduler: &mpsc::UnboundedSender<Scheduled>,
        task: Scheduled,
        delay: Duration,
    ) -> bool {
        if self.attempts >= self.max {
            self.reset();
            return false;
        }
        self.attempts += 1;

        let scheduler = scheduler.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = scheduler.send(task);
        });
        if let Some(stale) = self.timer.replace(timer.abort_handle()) {
            stale.abort();
        }
        true
    }

    fn reset(&mut self) {
        self.attempts = 0;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Client half of the protocol: keeps the local player in step with the
/// coordinator and makes sure outgoing commands survive short disconnects.
///
/// At most one outgoing command is buffered. Sending a second one before the
/// first was delivered replaces it.
pub struct SyncAgent<L, A> {
    label: String,
    link: L,
    actuator: A,
    active: bool,
    pending: Option<Command>,
    delivery_retry: Retry,
    yik_retry: Retry,
    policy: RetryPolicy,
    scheduler: mpsc::UnboundedSender<Scheduled>,
}

impl<L: Link, A: Actuator> SyncAgent<L, A> {
    /// Returns the agent and the receiver its retry timers fire into.
    pub fn new(
        link: L,
        actuator: A,
        policy: RetryPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<Scheduled>) {
        let (scheduler, scheduled) = mpsc::unbounded_channel();
        let agent = Self {
            label: DEFAULT_LABEL.to_string(),
            link,
            actuator,
            active: false,
            pending: None,
            delivery_retry: Retry::new(policy.max_delivery_attempts),
            yik_retry: Retry::new(policy.max_yik_attempts),
            policy,
            scheduler,
        };
        (agent, scheduled)
    }

    /// Drives the agent until the process stops. Local controls are optional:
    /// the agent keeps following the coordinator after they close.
    pub async fn run(
        mut self,
        mut link_events: mpsc::UnboundedReceiver<LinkEvent>,
        mut controls: mpsc::UnboundedReceiver<Control>,
        mut scheduled: mpsc::UnboundedReceiver<Scheduled>,
    ) {
        self.link.open();
        loop {
            tokio::select! {
                Some(event) = link_events.recv() => self.on_link_event(event),
                Some(task) = scheduled.recv() => self.on_scheduled(task),
                Some(control) = controls.recv() => self.on_control(control),
                else => break,
            }
        }
    }

    pub fn state(&self) -> AgentState {
        match self.link.state() {
            LinkState::Open => AgentState::Connected,
            LinkState::Connecting => AgentState::Connecting,
            LinkState::Closing | LinkState::Closed => AgentState::Disconnected,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn pending(&self) -> Option<&Command> {
        self.pending.as_ref()
    }

    pub fn delivery_attempts(&self) -> u32 {
        self.delivery_retry.attempts
    }

    pub fn yik_attempts(&self) -> u32 {
        self.yik_retry.attempts
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened => {
                tracing::info!("[{}] Connected to master", self.label);
                if let Some(command) = self.pending.take() {
                    self.deliver(command);
                }
            }
            LinkEvent::Errored(cause) => {
                tracing::warn!("[{}] Connection error: {}", self.label, cause);
            }
            LinkEvent::MessageReceived(frame) => self.handle_frame(&frame),
            LinkEvent::Closed => {
                tracing::info!("[{}] Connection to master closed", self.label);
            }
        }
    }

    pub fn on_scheduled(&mut self, task: Scheduled) {
        match task {
            Scheduled::RetryDelivery => {
                if let Some(command) = self.pending.take() {
                    self.deliver(command);
                }
            }
            Scheduled::RetryYik => self.yik(),
        }
    }

    pub fn on_control(&mut self, control: Control) {
        match control {
            Control::Toggle => self.toggle(),
            Control::Stop => self.send_message(Command::Stop),
            Control::Seek(fraction) => {
                let fraction = fraction.unwrap_or_else(rand::random::<f64>);
                self.send_message(Command::Seek(fraction));
            }
            Control::Status => {
                let duration = self.actuator.duration();
                tracing::info!(
                    "[{}] {:?}, {}, {} / {}",
                    self.label,
                    self.state(),
                    if self.actuator.paused() { "paused" } else { "playing" },
                    format_timestamp(self.actuator.current_time()),
                    format_timestamp(duration),
                );
            }
        }
    }

    /// Sends a command to the coordinator, reconnecting first if the link
    /// was closed. Undeliverable commands are retried a bounded number of
    /// times and then dropped.
    pub fn send_message(&mut self, command: Command) {
        if let Some(replaced) = self.pending.take() {
            tracing::debug!("[{}] dropping undelivered {}", self.label, replaced.key());
        }
        self.deliver(command);
    }

    fn deliver(&mut self, command: Command) {
        self.link.open();

        if self.link.is_open() {
            match self.link.send(command.encode()) {
                Ok(()) => {
                    self.delivery_retry.reset();
                    return;
                }
                Err(e) => tracing::debug!("[{}] send failed: {}", self.label, e),
            }
        }

        let key = command.key();
        self.pending = Some(command);
        let scheduled = self.delivery_retry.schedule(
            &self.scheduler,
            Scheduled::RetryDelivery,
            self.policy.delay,
        );
        if !scheduled {
            tracing::debug!("[{}] giving up on {}", self.label, key);
            self.pending = None;
        }
    }

    pub fn play(&mut self) {
        tracing::info!("[{}] Playing", self.label);
        self.active = true;
        self.actuator.play();
    }

    pub fn pause(&mut self) {
        tracing::info!("[{}] Paused", self.label);
        self.active = false;
        self.actuator.pause();
    }

    pub fn stop(&mut self) {
        tracing::info!("[{}] Stopped", self.label);
        self.pause();
        self.actuator.set_current_time(0.0);
    }

    /// Jumps to `fraction` (0-1) of the media and resumes playback. While the
    /// media has no duration yet, asks the group to sync again shortly.
    pub fn seek(&mut self, fraction: f64) {
        let time = fraction.clamp(0.0, 1.0) * self.actuator.duration();

        if time.is_nan() {
            let scheduled =
                self.yik_retry
                    .schedule(&self.scheduler, Scheduled::RetryYik, self.policy.delay);
            if !scheduled {
                tracing::debug!("[{}] media still not ready, giving up on sync", self.label);
            }
            return;
        }

        tracing::info!("[{}] Jumping to {}", self.label, format_timestamp(time));
        self.actuator.set_current_time(time);
        self.play();
        self.yik_retry.reset();
    }

    /// Asks the coordinator to start a sync round.
    pub fn yik(&mut self) {
        self.send_message(Command::RequestPosition);
    }

    /// Answers a poll with the current position, or `null` when this client
    /// is not part of the synchronized group.
    pub fn yak(&mut self) {
        let mut position = self.actuator.current_time() / self.actuator.duration();
        if !position.is_finite() {
            position = 0.0;
        }
        tracing::info!("[{}] Echoing {:.3}", self.label, position);
        self.send_message(Command::ReportPosition(self.active.then_some(position)));
    }

    /// The local play/pause button: rejoin the group if idle, else pause.
    pub fn toggle(&mut self) {
        if self.actuator.paused() || !self.active {
            self.yik();
        } else {
            self.pause();
        }
    }

    pub fn handle_message(&mut self, command: Command) {
        match command {
            Command::Identity(id) => {
                tracing::info!("[{}] Assigned id {}", self.label, id);
                self.label = id;
            }
            Command::RequestPosition => self.yak(),
            Command::Stop => self.stop(),
            Command::Seek(fraction) => self.seek(fraction),
            Command::TogglePlayPause => {
                if self.actuator.paused() {
                    self.play();
                } else {
                    self.pause();
                }
            }
            Command::ReportPosition(_) => {}
        }
    }

    fn handle_frame(&mut self, frame: &str) {
        match Command::decode(frame) {
            Ok(command) => self.handle_message(command),
            Err(ProtocolError::UnknownKey(key)) => {
                tracing::debug!("[{}] ignoring unknown command `{}`", self.label, key);
            }
            Err(e) => {
                tracing::warn!(
                    "[{}] This doesn't look like a valid frame: {:?} ({})",
                    self.label,
                    frame,
                    e
                );
            }
        }
    }
}

/// Renders seconds as `mm:ss`, or `--:--` when unknown.
pub fn format_timestamp(secs: f64) -> String {
    if !secs.is_finite() {
        return "--:--".to_string();
    }
    let whole = secs.max(0.0) as u64;
    format!("{:02}:{:02}", (whole / 60) % 60, whole % 60)
}
