use thiserror::Error;

/// High-level phases the shared poll record can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// No poll is running or displayed.
    Idle,
    /// A poll is accepting votes.
    Active,
    /// A poll ended and its winner is on display.
    Winner,
}

/// Events that move the poll record between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// A start request is activated immediately.
    Started,
    /// A start request arrives while a poll is active and goes to the queue.
    Queued,
    /// The active poll became overdue; `queued` tells whether a queued poll takes over.
    Expired {
        /// A queued poll is promoted in the same step.
        queued: bool,
    },
    /// The winner display window elapsed.
    DisplayElapsed {
        /// A queued poll is promoted in the same step.
        queued: bool,
    },
    /// An administrator discarded the current poll.
    Cleared,
}

/// Error returned when an event cannot be applied from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the record was in when the event was received.
    pub from: PollPhase,
    /// The event that cannot be applied from this phase.
    pub event: PollEvent,
}

impl PollPhase {
    /// Compute the phase reached by applying `event`, if the move is legal.
    pub fn apply(self, event: PollEvent) -> Result<PollPhase, InvalidTransition> {
        let next = match (self, event) {
            (PollPhase::Idle | PollPhase::Winner, PollEvent::Started) => PollPhase::Active,
            (PollPhase::Active, PollEvent::Queued) => PollPhase::Active,
            (PollPhase::Active, PollEvent::Expired { queued: true }) => PollPhase::Active,
            (PollPhase::Active, PollEvent::Expired { queued: false }) => PollPhase::Winner,
            (PollPhase::Winner, PollEvent::DisplayElapsed { queued: true }) => PollPhase::Active,
            (PollPhase::Winner, PollEvent::DisplayElapsed { queued: false }) => PollPhase::Idle,
            (_, PollEvent::Cleared) => PollPhase::Idle,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
