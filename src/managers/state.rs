//! A small finite state machine.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use crate::errors::{WorkerError, WorkerResult};
use crate::model::WorkerState;

/// Tracks a current state, the states it may move to and the states it
/// came from.
///
/// Transitions are validated before anything is recorded, so a
/// rejected [`StateManager::transit_to`] leaves both the current state
/// and the history untouched.
#[derive(Debug)]
pub struct StateManager<S> {
    transitions: HashMap<S, HashSet<S>>,
    current: S,
    history: Vec<S>,
}

impl<S> StateManager<S>
where
    S: Copy + Eq + Hash + Debug,
{
    pub fn new(transitions: impl IntoIterator<Item = (S, Vec<S>)>, initial: S) -> Self {
        Self {
            transitions: transitions
                .into_iter()
                .map(|(from, to)| (from, to.into_iter().collect()))
                .collect(),
            current: initial,
            history: Vec::new(),
        }
    }

    pub fn assert_state(&self, state: S) -> WorkerResult<()> {
        if self.current == state {
            Ok(())
        } else {
            Err(WorkerError::InvalidState {
                expected: format!("{state:?}"),
                actual: format!("{:?}", self.current),
            })
        }
    }

    /// Whether the current state is any of `states`.
    pub fn confirm_state(&self, states: &[S]) -> bool {
        states.contains(&self.current)
    }

    /// Move to `state`.
    ///
    /// Moving to the current state does nothing. Otherwise the previous
    /// state is remembered; `discard_old` forgets everything remembered
    /// before that.
    pub fn transit_to(&mut self, state: S, discard_old: bool) -> WorkerResult<()> {
        if self.current == state {
            return Ok(());
        }
        let allowed = self
            .transitions
            .get(&self.current)
            .map_or(false, |next| next.contains(&state));
        if !allowed {
            return Err(WorkerError::InvalidTransition {
                from: format!("{:?}", self.current),
                to: format!("{state:?}"),
            });
        }
        if discard_old {
            self.history.clear();
        }
        self.history.push(self.current);
        self.current = state;
        Ok(())
    }

    /// Return to the state before the last transition.
    pub fn back_to_previous_state(&mut self) -> WorkerResult<()> {
        match self.history.pop() {
            Some(previous) => {
                self.current = previous;
                Ok(())
            }
            None => Err(WorkerError::InvalidTransition {
                from: format!("{:?}", self.current),
                to: "previous state".to_owned(),
            }),
        }
    }

    pub fn get_current_state(&self) -> S {
        self.current
    }
}

impl StateManager<WorkerState> {
    /// State machine of a freshly created worker.
    pub fn for_worker() -> Self {
        Self::new(WorkerState::transitions(), WorkerState::Uninitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkerState::*;

    const ALL: [WorkerState; 5] = [Uninitialized, Ready, Paused, Running, Completed];

    fn at(state: WorkerState) -> StateManager<WorkerState> {
        let mut manager = StateManager::for_worker();
        manager.current = state;
        manager
    }

    #[test]
    fn allowed_transitions_succeed() {
        for (from, targets) in WorkerState::transitions() {
            for to in targets {
                let mut manager = at(from);
                manager.transit_to(to, true).unwrap();
                assert_eq!(manager.get_current_state(), to);
            }
        }
    }

    #[test]
    fn disallowed_transitions_fail() {
        for (from, targets) in WorkerState::transitions() {
            for to in ALL {
                if to == from || targets.contains(&to) {
                    continue;
                }
                let mut manager = at(from);
                assert!(
                    matches!(
                        manager.transit_to(to, true),
                        Err(WorkerError::InvalidTransition { .. })
                    ),
                    "{from:?} -> {to:?} should be rejected"
                );
                assert_eq!(manager.get_current_state(), from);
                assert!(manager.history.is_empty());
            }
        }
    }

    #[test]
    fn transit_to_current_is_noop() {
        let mut manager = at(Running);
        manager.transit_to(Running, false).unwrap();
        assert!(manager.history.is_empty());
        assert!(manager.back_to_previous_state().is_err());
    }

    #[test]
    fn history_goes_back() {
        let mut manager = StateManager::for_worker();
        manager.transit_to(Ready, true).unwrap();
        manager.transit_to(Running, false).unwrap();
        manager.transit_to(Paused, false).unwrap();
        manager.back_to_previous_state().unwrap();
        assert_eq!(manager.get_current_state(), Running);
        manager.back_to_previous_state().unwrap();
        assert_eq!(manager.get_current_state(), Ready);
    }

    #[test]
    fn discard_old_forgets_history() {
        let mut manager = StateManager::for_worker();
        manager.transit_to(Ready, true).unwrap();
        manager.transit_to(Running, true).unwrap();
        manager.back_to_previous_state().unwrap();
        assert_eq!(manager.get_current_state(), Ready);
        assert!(manager.back_to_previous_state().is_err());
    }

    #[test]
    fn assert_and_confirm() {
        let manager = at(Paused);
        manager.assert_state(Paused).unwrap();
        assert!(matches!(
            manager.assert_state(Running),
            Err(WorkerError::InvalidState { .. })
        ));
        assert!(manager.confirm_state(&[Running, Paused]));
        assert!(!manager.confirm_state(&[Completed]));
    }
}
