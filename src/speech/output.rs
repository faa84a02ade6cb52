//! Spoken playback of peer replies, one utterance at a time.

use crate::error::Result;
use crate::event::EventSender;
use crate::speech::playback::{PlaybackBackend, PlaybackEvent, PlaybackEvents, Utterance, Voice};
use tracing::{debug, warn};

/// What a playback event means to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Started,
    Finished,
    Failed(String),
    Ignored,
}

pub struct SpeechOutputController {
    backend: Box<dyn PlaybackBackend>,
    events: EventSender,
    voice: Voice,
    next_id: u64,
    current: Option<u64>,
}

impl SpeechOutputController {
    pub fn new(backend: Box<dyn PlaybackBackend>, events: EventSender, voice: Voice) -> Self {
        Self {
            backend,
            events,
            voice,
            next_id: 0,
            current: None,
        }
    }

    /// Whether an utterance is playing (or about to).
    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    /// Speak `text`, cancelling whatever is playing first.
    ///
    /// Returns the utterance id. Fails immediately if playback is
    /// unavailable; nothing is left playing in that case.
    pub fn speak(&mut self, text: &str) -> Result<u64> {
        self.cancel();
        self.next_id += 1;
        let utterance = Utterance {
            id: self.next_id,
            text: text.to_string(),
            voice: self.voice,
        };

        self.backend
            .speak(&utterance, PlaybackEvents::new(utterance.id, self.events.clone()))?;
        debug!(utterance = utterance.id, chars = text.len(), "playback requested");
        self.current = Some(utterance.id);
        Ok(utterance.id)
    }

    /// Stop the current utterance. No-op when nothing plays.
    pub fn cancel(&mut self) {
        if let Some(id) = self.current.take() {
            debug!(utterance = id, "playback cancelled");
            self.backend.cancel();
        }
    }

    /// Apply an event from the playback backend.
    pub fn handle(&mut self, utterance: u64, event: PlaybackEvent) -> PlaybackOutcome {
        if self.current != Some(utterance) {
            debug!(utterance, current = ?self.current, ?event, "dropping stale playback event");
            return PlaybackOutcome::Ignored;
        }
        match event {
            PlaybackEvent::Started => PlaybackOutcome::Started,
            PlaybackEvent::Ended => {
                self.current = None;
                debug!(utterance, "playback finished");
                PlaybackOutcome::Finished
            }
            PlaybackEvent::Errored(reason) => {
                self.current = None;
                warn!(utterance, %reason, "playback failed");
                PlaybackOutcome::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParleyError;
    use crate::event::{self, EventReceiver, SessionEvent};
    use crate::speech::playback::MockSpeaker;

    fn controller() -> (SpeechOutputController, MockSpeaker, EventReceiver) {
        let (tx, rx) = event::channel();
        let mock = MockSpeaker::new();
        let controller = SpeechOutputController::new(Box::new(mock.clone()), tx, Voice::default());
        (controller, mock, rx)
    }

    fn pump(controller: &mut SpeechOutputController, rx: &mut EventReceiver) -> Vec<PlaybackOutcome> {
        let mut seen = Vec::new();
        while let Ok(SessionEvent::Playback { utterance, event }) = rx.try_recv() {
            seen.push(controller.handle(utterance, event));
        }
        seen
    }

    #[test]
    fn test_speak_then_finish() {
        let (mut controller, mock, mut rx) = controller();

        let id = controller.speak("Hi there.").unwrap();
        assert_eq!(id, 1);
        assert!(controller.is_playing());
        assert_eq!(mock.spoken(), vec!["Hi there."]);

        mock.finish();
        assert_eq!(
            pump(&mut controller, &mut rx),
            vec![PlaybackOutcome::Started, PlaybackOutcome::Finished]
        );
        assert!(!controller.is_playing());
    }

    #[test]
    fn test_speak_cancels_current_utterance() {
        let (mut controller, mock, mut rx) = controller();

        controller.speak("first").unwrap();
        controller.speak("second").unwrap();
        assert_eq!(mock.cancel_count(), 1);

        // The first utterance's Started is stale now.
        assert_eq!(
            pump(&mut controller, &mut rx),
            vec![PlaybackOutcome::Ignored, PlaybackOutcome::Started]
        );
        assert_eq!(mock.last_utterance().map(|u| u.id), Some(2));
    }

    #[test]
    fn test_cancel_when_idle_is_noop() {
        let (mut controller, mock, _rx) = controller();
        controller.cancel();
        assert_eq!(mock.cancel_count(), 0);
    }

    #[test]
    fn test_unavailable_playback_fails_immediately() {
        let (mut controller, mock, _rx) = controller();
        mock.set_unavailable(true);

        assert!(matches!(
            controller.speak("hello"),
            Err(ParleyError::PlaybackUnavailable { .. })
        ));
        assert!(!controller.is_playing());
    }

    #[test]
    fn test_playback_error_reported() {
        let (mut controller, mock, mut rx) = controller();
        controller.speak("hello").unwrap();
        mock.fail("device lost");

        assert_eq!(
            pump(&mut controller, &mut rx),
            vec![
                PlaybackOutcome::Started,
                PlaybackOutcome::Failed("device lost".to_string())
            ]
        );
        assert!(!controller.is_playing());
    }
}
