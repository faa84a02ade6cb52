//! The cooperative session loop and its handle.

use crate::error::{ParleyError, Result};
use crate::event::{EventReceiver, EventSender, SessionCommand, SessionEvent};
use crate::session::machine::SessionStateMachine;
use crate::session::state::SessionSnapshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Control surface of a running session.
///
/// Commands are queued behind whatever events are already pending; state is
/// observed only through snapshots.
pub struct SessionHandle {
    events: EventSender,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

/// Start the loop on the current runtime.
///
/// `events` and `receiver` must be the two ends of the channel the machine
/// was built with.
pub fn spawn_session(
    machine: SessionStateMachine,
    events: EventSender,
    receiver: EventReceiver,
) -> SessionHandle {
    let (publisher, snapshots) = watch::channel(machine.snapshot());
    let task = tokio::spawn(run_loop(machine, receiver, publisher));
    SessionHandle {
        events,
        snapshots,
        task,
    }
}

async fn run_loop(
    mut machine: SessionStateMachine,
    mut receiver: EventReceiver,
    publisher: watch::Sender<SessionSnapshot>,
) {
    tracing::debug!("session loop started");
    while let Some(event) = receiver.recv().await {
        let shutdown = matches!(event, SessionEvent::Command(SessionCommand::Shutdown));
        machine.handle(event);

        let snapshot = machine.snapshot();
        publisher.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });

        if shutdown {
            break;
        }
    }
    tracing::debug!("session loop stopped");
}

impl SessionHandle {
    pub fn start(&self) -> Result<()> {
        self.send(SessionCommand::Start)
    }

    pub fn end(&self) -> Result<()> {
        self.send(SessionCommand::End)
    }

    pub fn set_muted(&self, muted: bool) -> Result<()> {
        self.send(SessionCommand::SetMuted(muted))
    }

    pub fn toggle_mute(&self) -> Result<()> {
        self.send(SessionCommand::ToggleMute)
    }

    pub fn clear_error(&self) -> Result<()> {
        self.send(SessionCommand::ClearError)
    }

    pub fn clear_transcript(&self) -> Result<()> {
        self.send(SessionCommand::ClearTranscript)
    }

    pub fn send(&self, command: SessionCommand) -> Result<()> {
        self.events
            .send(command.into())
            .map_err(|_| ParleyError::SessionClosed)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that wakes on every published change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// End the call, stop the loop and wait for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.send(SessionCommand::Shutdown)?;
        self.task.await.map_err(|e| ParleyError::Other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connection::MockConnector;
    use crate::event;
    use crate::session::state::{SessionStatus, TurnState};
    use crate::speech::{MockCapture, MockSpeaker};
    use std::sync::Arc;
    use std::time::Duration;

    fn spawn() -> (SessionHandle, MockConnector, MockCapture) {
        let (tx, rx) = event::channel();
        let connector = MockConnector::new();
        let capture = MockCapture::new();
        let machine = SessionStateMachine::new(
            &Config::default(),
            Arc::new(connector.clone()),
            Box::new(capture.clone()),
            Box::new(MockSpeaker::new()),
            tx.clone(),
        );
        (spawn_session(machine, tx, rx), connector, capture)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_publish_snapshots() {
        let (handle, _connector, capture) = spawn();
        assert_eq!(handle.snapshot().status, SessionStatus::Idle);

        handle.start().unwrap();
        settle().await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Active);
        assert_eq!(snapshot.turn, TurnState::Listening);
        assert!(snapshot.listening);
        assert!(capture.is_running());

        handle.toggle_mute().unwrap();
        settle().await;
        assert!(handle.snapshot().muted);
        assert!(!handle.snapshot().listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_sees_ticks() {
        let (handle, _connector, _capture) = spawn();
        let mut updates = handle.subscribe();
        handle.start().unwrap();
        settle().await;
        updates.mark_unchanged();

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().elapsed_seconds, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_fail_after_shutdown() {
        let (handle, connector, _capture) = spawn();
        handle.start().unwrap();
        settle().await;

        let events = handle.events.clone();
        handle.shutdown().await.unwrap();
        assert_eq!(connector.attempts(), 1);
        assert!(events.send(SessionCommand::Start.into()).is_err());
    }
}
