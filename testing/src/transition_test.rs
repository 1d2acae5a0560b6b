//! Ergonomic testing utilities for the request state machine
//!
//! This module provides a fluent API for testing transitions with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // TransitionTest is the natural name

use hookline_core::{Meta, RequestEvent, RequestState, Transition};

/// Type alias for state assertion functions
type StateAssertion<P, R> = Box<dyn FnOnce(&RequestState<P, R>)>;

/// Type alias for event assertion functions
type EventAssertion<P, R> = Box<dyn FnOnce(&[RequestEvent<P, R>])>;

/// Fluent API for testing [`RequestState::apply`] with Given-When-Then syntax
///
/// Transitions are applied in order. Rejected transitions leave the state
/// untouched and emit nothing; [`TransitionTest::then_rejected`] asserts on
/// how many were rejected.
///
/// # Example
///
/// ```
/// use hookline_core::{EventKind, RequestStatus, Transition};
/// use hookline_testing::TransitionTest;
///
/// TransitionTest::<u32, String>::new()
///     .given_payload(1)
///     .when(Transition::Result("ok".to_string()))
///     .when(Transition::Settle { success: true })
///     .then_state(|state| assert_eq!(state.status(), RequestStatus::Success))
///     .then_events(|events| {
///         assert_eq!(events.last().map(|e| e.kind()), Some(EventKind::Finish));
///     })
///     .run();
/// ```
pub struct TransitionTest<P, R> {
    initial_state: Option<RequestState<P, R>>,
    transitions: Vec<Transition<P, R>>,
    state_assertions: Vec<StateAssertion<P, R>>,
    event_assertions: Vec<EventAssertion<P, R>>,
    expected_rejections: Option<usize>,
}

impl<P, R> Default for TransitionTest<P, R> {
    fn default() -> Self {
        Self {
            initial_state: None,
            transitions: Vec::new(),
            state_assertions: Vec::new(),
            event_assertions: Vec::new(),
            expected_rejections: None,
        }
    }
}

impl<P, R> TransitionTest<P, R>
where
    P: Clone,
    R: Clone,
{
    /// Create a new transition test
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: RequestState<P, R>) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Start from a fresh pending request with `payload` (Given)
    #[must_use]
    pub fn given_payload(self, payload: P) -> Self {
        self.given_state(RequestState::new(payload, None, Meta::Null))
    }

    /// Append a transition to apply (When)
    #[must_use]
    pub fn when(mut self, transition: Transition<P, R>) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Append several transitions to apply (When)
    #[must_use]
    pub fn when_all(mut self, transitions: impl IntoIterator<Item = Transition<P, R>>) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&RequestState<P, R>) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about every emitted event, in emission order (Then)
    #[must_use]
    pub fn then_events<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[RequestEvent<P, R>]) + 'static,
    {
        self.event_assertions.push(Box::new(assertion));
        self
    }

    /// Expect exactly `count` transitions to be rejected (Then)
    #[must_use]
    pub const fn then_rejected(mut self, count: usize) -> Self {
        self.expected_rejections = Some(count);
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if the initial state is not set, or if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state() or given_payload()");

        let mut events = Vec::new();
        let mut rejected = 0;
        for transition in self.transitions {
            match state.apply(transition) {
                Some(applied) => {
                    events.extend(applied.changes);
                    state = applied.next;
                    events.extend(applied.lifecycle);
                }
                None => rejected += 1,
            }
        }

        if let Some(expected) = self.expected_rejections {
            assert_eq!(
                rejected, expected,
                "Expected {expected} rejected transitions, but found {rejected}"
            );
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.event_assertions {
            assertion(&events);
        }
    }
}

/// Helper assertions for event sequences
pub mod assertions {
    use hookline_core::{EventKind, RequestEvent};

    /// Assert the exact sequence of event kinds
    ///
    /// # Panics
    ///
    /// Panics if the kinds differ.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_kinds<P, R>(events: &[RequestEvent<P, R>], expected: &[EventKind]) {
        let kinds: Vec<EventKind> = events.iter().map(RequestEvent::kind).collect();
        assert_eq!(kinds, expected, "Unexpected event sequence");
    }

    /// Assert that no events were emitted
    ///
    /// # Panics
    ///
    /// Panics if events is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_events<P, R>(events: &[RequestEvent<P, R>]) {
        assert!(
            events.is_empty(),
            "Expected no events, but found {}: {:?}",
            events.len(),
            events.iter().map(RequestEvent::kind).collect::<Vec<_>>()
        );
    }

    /// Assert that exactly one terminal event (`done`, `fail` or `cancel`) was emitted
    ///
    /// # Panics
    ///
    /// Panics if the number of terminal events is not one.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_single_terminal<P, R>(events: &[RequestEvent<P, R>]) {
        let terminal = events
            .iter()
            .filter(|e| matches!(e.kind(), EventKind::Done | EventKind::Fail | EventKind::Cancel))
            .count();
        assert_eq!(terminal, 1, "Expected one terminal event, but found {terminal}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookline_core::{EventKind, RequestStatus};

    #[test]
    fn test_resolve_then_settle() {
        TransitionTest::<u32, &str>::new()
            .given_payload(1)
            .when(Transition::Result("ok"))
            .when(Transition::Settle { success: true })
            .then_state(|state| {
                assert_eq!(state.status(), RequestStatus::Success);
                assert_eq!(state.result(), Some(&"ok"));
            })
            .then_events(|events| {
                assertions::assert_kinds(
                    events,
                    &[
                        EventKind::ResultChanged,
                        EventKind::StateChanged,
                        EventKind::Done,
                        EventKind::Finish,
                    ],
                );
            })
            .then_rejected(0)
            .run();
    }

    #[test]
    fn test_nothing_after_terminal_except_cancel() {
        TransitionTest::<u32, &str>::new()
            .given_payload(1)
            .when(Transition::Settle { success: false })
            .when(Transition::Payload(2))
            .when(Transition::Result("late"))
            .when(Transition::Settle { success: true })
            .then_state(|state| {
                assert_eq!(state.status(), RequestStatus::Failed);
                assert_eq!(state.payload(), &1);
            })
            .then_events(assertions::assert_single_terminal)
            .then_rejected(3)
            .run();
    }

    #[test]
    fn test_double_cancel_is_rejected() {
        TransitionTest::<u32, &str>::new()
            .given_payload(1)
            .when_all([Transition::Cancel, Transition::Cancel])
            .then_state(|state| assert_eq!(state.status(), RequestStatus::Cancelled))
            .then_events(|events| {
                assertions::assert_kinds(events, &[EventKind::StateChanged, EventKind::Cancel]);
            })
            .then_rejected(1)
            .run();
    }
}
