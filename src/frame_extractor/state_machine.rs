/// Run state of one extraction.
///
/// `Tracking` holds the number of slides accepted so far; the terminal states
/// keep that count and absorb every further event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtractionState {
    Initial,
    Tracking { accepted: u64 },
    Done { accepted: u64 },
    Cancelled { accepted: u64 },
    Failed { accepted: u64 },
}

/// What the engine observed at one sampling step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameEvent {
    /// A candidate was decoded. `similarity` is `None` when there is no
    /// previous slide to compare against; `same_text` is the optional OCR
    /// filter's verdict.
    Candidate {
        similarity: Option<f64>,
        same_text: bool,
    },
    EndOfStream,
    CancelRequested,
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    TooSimilar,
    TextUnchanged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateAction {
    Accept,
    Reject(RejectReason),
    Stop,
}

impl ExtractionState {
    pub fn new() -> Self {
        ExtractionState::Initial
    }

    pub fn accepted(&self) -> u64 {
        match *self {
            ExtractionState::Initial => 0,
            ExtractionState::Tracking { accepted }
            | ExtractionState::Done { accepted }
            | ExtractionState::Cancelled { accepted }
            | ExtractionState::Failed { accepted } => accepted,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExtractionState::Done { .. }
                | ExtractionState::Cancelled { .. }
                | ExtractionState::Failed { .. }
        )
    }

    /// Pure transition function. `threshold` is inclusive on the duplicate
    /// side: a score equal to it is rejected.
    pub fn transition(&self, event: FrameEvent, threshold: f64) -> (ExtractionState, StateAction) {
        if self.is_terminal() {
            return (*self, StateAction::Stop);
        }

        let accepted = self.accepted();
        match event {
            FrameEvent::Candidate {
                similarity,
                same_text,
            } => match (self, similarity) {
                (ExtractionState::Initial, _) | (_, None) => (
                    ExtractionState::Tracking {
                        accepted: accepted + 1,
                    },
                    StateAction::Accept,
                ),
                (_, Some(score)) if score >= threshold => {
                    (*self, StateAction::Reject(RejectReason::TooSimilar))
                }
                (_, Some(_)) if same_text => {
                    (*self, StateAction::Reject(RejectReason::TextUnchanged))
                }
                (_, Some(_)) => (
                    ExtractionState::Tracking {
                        accepted: accepted + 1,
                    },
                    StateAction::Accept,
                ),
            },
            FrameEvent::EndOfStream => (ExtractionState::Done { accepted }, StateAction::Stop),
            FrameEvent::CancelRequested => {
                (ExtractionState::Cancelled { accepted }, StateAction::Stop)
            }
            FrameEvent::Fault => (ExtractionState::Failed { accepted }, StateAction::Stop),
        }
    }
}

impl Default for ExtractionState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StateMachine {
    state: ExtractionState,
    threshold: f64,
    frame_counter: u64,
}

impl StateMachine {
    pub fn new(threshold: f64) -> Self {
        Self {
            state: ExtractionState::new(),
            threshold,
            frame_counter: 0,
        }
    }

    pub fn process(&mut self, event: FrameEvent) -> StateAction {
        if matches!(event, FrameEvent::Candidate { .. }) && !self.state.is_terminal() {
            self.frame_counter += 1;
        }

        let (new_state, action) = self.state.transition(event, self.threshold);
        self.state = new_state;

        action
    }

    pub fn current_state(&self) -> &ExtractionState {
        &self.state
    }

    /// Whether the next candidate will be compared against a previous slide.
    pub fn has_reference(&self) -> bool {
        !matches!(self.state, ExtractionState::Initial)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(similarity: f64) -> FrameEvent {
        FrameEvent::Candidate {
            similarity: Some(similarity),
            same_text: false,
        }
    }

    #[test]
    fn test_first_frame_always_accepted() {
        let mut sm = StateMachine::new(0.0);
        assert_eq!(*sm.current_state(), ExtractionState::Initial);

        let action = sm.process(FrameEvent::Candidate {
            similarity: None,
            same_text: false,
        });
        assert_eq!(action, StateAction::Accept);
        assert_eq!(*sm.current_state(), ExtractionState::Tracking { accepted: 1 });
    }

    #[test]
    fn test_threshold_tie_is_duplicate() {
        let state = ExtractionState::Tracking { accepted: 1 };
        let (next, action) = state.transition(candidate(0.9), 0.9);
        assert_eq!(action, StateAction::Reject(RejectReason::TooSimilar));
        assert_eq!(next, state);

        let (next, action) = state.transition(candidate(0.8999), 0.9);
        assert_eq!(action, StateAction::Accept);
        assert_eq!(next, ExtractionState::Tracking { accepted: 2 });
    }

    #[test]
    fn test_identical_frames_rejected_at_any_threshold() {
        let state = ExtractionState::Tracking { accepted: 3 };
        for t in [0.0, 0.25, 0.5, 0.9, 1.0] {
            let (_, action) = state.transition(candidate(1.0), t);
            assert_eq!(action, StateAction::Reject(RejectReason::TooSimilar));
        }
    }

    #[test]
    fn test_same_text_rejects_visually_new_frame() {
        let state = ExtractionState::Tracking { accepted: 1 };
        let (next, action) = state.transition(
            FrameEvent::Candidate {
                similarity: Some(0.3),
                same_text: true,
            },
            0.9,
        );
        assert_eq!(action, StateAction::Reject(RejectReason::TextUnchanged));
        assert_eq!(next, state);
    }

    #[test]
    fn test_terminal_states_absorb_events() {
        let mut sm = StateMachine::new(0.5);
        sm.process(FrameEvent::Candidate {
            similarity: None,
            same_text: false,
        });
        sm.process(FrameEvent::CancelRequested);
        assert_eq!(*sm.current_state(), ExtractionState::Cancelled { accepted: 1 });

        let action = sm.process(candidate(0.0));
        assert_eq!(action, StateAction::Stop);
        assert_eq!(*sm.current_state(), ExtractionState::Cancelled { accepted: 1 });
        assert_eq!(sm.frame_count(), 1);
    }

    #[test]
    fn test_end_and_fault_keep_count() {
        let state = ExtractionState::Tracking { accepted: 4 };
        assert_eq!(
            state.transition(FrameEvent::EndOfStream, 0.9).0,
            ExtractionState::Done { accepted: 4 }
        );
        assert_eq!(
            state.transition(FrameEvent::Fault, 0.9).0,
            ExtractionState::Failed { accepted: 4 }
        );
        assert_eq!(
            ExtractionState::Initial.transition(FrameEvent::EndOfStream, 0.9).0,
            ExtractionState::Done { accepted: 0 }
        );
    }
}
