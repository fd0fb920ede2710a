// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of the wrapped command. The numeric value is what the
/// `command_status` metric reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum CommandState {
    Pending = 0,
    Running = 1,
    Done = 2,
}

impl CommandState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => CommandState::Pending,
            1 => CommandState::Running,
            _ => CommandState::Done,
        }
    }
}

/// Command state shared between the runner and the sampler.
///
/// Transitions only move forward: advancing to an earlier state is ignored.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    state: Arc<AtomicU8>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> CommandState {
        CommandState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `state` unless a later state was already reached. Returns the
    /// state in effect afterwards.
    pub fn advance(&self, state: CommandState) -> CommandState {
        let previous = self.state.fetch_max(state as u8, Ordering::AcqRel);
        CommandState::from_u8(previous.max(state as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_pending() {
        assert_eq!(RunState::new().get(), CommandState::Pending);
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let state = RunState::new();
        assert_eq!(state.advance(CommandState::Running), CommandState::Running);
        assert_eq!(state.advance(CommandState::Done), CommandState::Done);
        assert_eq!(state.advance(CommandState::Running), CommandState::Done);
        assert_eq!(state.get(), CommandState::Done);
    }

    #[test]
    fn test_clones_share_state() {
        let state = RunState::new();
        let observer = state.clone();
        state.advance(CommandState::Running);
        assert_eq!(observer.get(), CommandState::Running);
        assert_eq!(observer.get() as u8, 1);
    }
}
