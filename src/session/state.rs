//! Session lifecycle states

use std::fmt;

/// Where the session is in its wake/conversation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum State {
    /// Listening for a wake phrase
    #[default]
    Standby,
    /// Wake phrase heard, acknowledgement being spoken
    WakeAcknowledged,
    /// Capturing and answering commands
    Conversing,
    /// Torn down; no further events are accepted
    Terminated,
}

/// Something that happened to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    WakeWordDetected,
    Acknowledged,
    TurnCompleted,
    ShutdownPhraseDetected,
    SilenceCaptured,
    Interrupted,
    FatalError,
}

impl State {
    /// Whether `event` moves the session along a defined edge
    #[must_use]
    pub const fn accepts(self, event: Event) -> bool {
        matches!(
            (self, event),
            (Self::Standby, Event::WakeWordDetected)
                | (Self::WakeAcknowledged, Event::Acknowledged)
                | (
                    Self::Conversing,
                    Event::TurnCompleted | Event::SilenceCaptured | Event::ShutdownPhraseDetected
                )
                | (
                    Self::Standby | Self::WakeAcknowledged | Self::Conversing,
                    Event::Interrupted | Event::FatalError
                )
        )
    }

    /// Next state for any event
    ///
    /// Events a state does not accept leave it unchanged. `Terminated`
    /// absorbs everything.
    #[must_use]
    pub const fn next(self, event: Event) -> Self {
        match (self, event) {
            (Self::Terminated, _) => Self::Terminated,
            (_, Event::Interrupted | Event::FatalError) => Self::Terminated,
            (Self::Standby, Event::WakeWordDetected) => Self::WakeAcknowledged,
            (Self::WakeAcknowledged, Event::Acknowledged) => Self::Conversing,
            (Self::Conversing, Event::TurnCompleted | Event::SilenceCaptured) => Self::Conversing,
            (Self::Conversing, Event::ShutdownPhraseDetected) => Self::Standby,
            (state, _) => state,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standby => write!(f, "standby"),
            Self::WakeAcknowledged => write!(f, "wake_acknowledged"),
            Self::Conversing => write!(f, "conversing"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: [State; 4] = [
        State::Standby,
        State::WakeAcknowledged,
        State::Conversing,
        State::Terminated,
    ];

    const EVENTS: [Event; 7] = [
        Event::WakeWordDetected,
        Event::Acknowledged,
        Event::TurnCompleted,
        Event::ShutdownPhraseDetected,
        Event::SilenceCaptured,
        Event::Interrupted,
        Event::FatalError,
    ];

    #[test]
    fn wake_cycle() {
        let state = State::Standby.next(Event::WakeWordDetected);
        assert_eq!(state, State::WakeAcknowledged);

        let state = state.next(Event::Acknowledged);
        assert_eq!(state, State::Conversing);

        assert_eq!(state.next(Event::TurnCompleted), State::Conversing);
        assert_eq!(state.next(Event::SilenceCaptured), State::Conversing);
        assert_eq!(state.next(Event::ShutdownPhraseDetected), State::Standby);
    }

    #[test]
    fn interrupts_terminate_from_anywhere() {
        for state in STATES {
            assert_eq!(state.next(Event::Interrupted), State::Terminated);
            assert_eq!(state.next(Event::FatalError), State::Terminated);
        }
    }

    #[test]
    fn terminated_absorbs_everything() {
        for event in EVENTS {
            assert_eq!(State::Terminated.next(event), State::Terminated);
            assert!(!State::Terminated.accepts(event));
        }
    }

    #[test]
    fn unaccepted_events_leave_state_unchanged() {
        for state in STATES {
            for event in EVENTS {
                if !state.accepts(event) && !state.is_terminal() {
                    assert_eq!(state.next(event), state, "{state} on {event:?}");
                }
            }
        }
    }

    #[test]
    fn standby_ignores_turn_events() {
        assert!(!State::Standby.accepts(Event::TurnCompleted));
        assert_eq!(State::Standby.next(Event::ShutdownPhraseDetected), State::Standby);
        assert_eq!(State::WakeAcknowledged.next(Event::WakeWordDetected), State::WakeAcknowledged);
    }
}
