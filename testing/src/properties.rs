//! Property-based testing utilities using proptest.

use hookline_core::{Meta, RequestState, StateFlags, Transition};
use proptest::prelude::*;

/// Any transition over small integer payloads and results.
pub fn transition() -> impl Strategy<Value = Transition<u8, u8>> {
    prop_oneof![
        4 => any::<u8>().prop_map(Transition::Payload),
        4 => any::<u8>().prop_map(Transition::Result),
        2 => any::<bool>().prop_map(|success| Transition::Settle { success }),
        1 => Just(Transition::Cancel),
    ]
}

/// Sequences of up to `max` transitions.
pub fn transitions(max: usize) -> impl Strategy<Value = Vec<Transition<u8, u8>>> {
    prop::collection::vec(transition(), 0..=max)
}

/// One of the four reachable flag combinations.
pub fn flags() -> impl Strategy<Value = StateFlags> {
    prop_oneof![
        Just(StateFlags::PENDING),
        Just(StateFlags::SUCCEEDED),
        Just(StateFlags::FAILED),
        Just(StateFlags::CANCELLED),
    ]
}

/// A pending request with an arbitrary payload and optional initial result.
pub fn pending_state() -> impl Strategy<Value = RequestState<u8, u8>> {
    (any::<u8>(), proptest::option::of(any::<u8>()))
        .prop_map(|(payload, result)| RequestState::new(payload, result, Meta::Null))
}

/// True if `flags` is one of the four reachable combinations.
#[must_use]
pub fn is_reachable(flags: StateFlags) -> bool {
    [
        StateFlags::PENDING,
        StateFlags::SUCCEEDED,
        StateFlags::FAILED,
        StateFlags::CANCELLED,
    ]
    .contains(&flags)
}
