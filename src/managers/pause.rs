use std::collections::BTreeSet;

use crate::model::PauseType;

/// Set of active pause reasons.
///
/// The worker is paused while any reason is active; resuming one
/// reason leaves the others in place.
#[derive(Debug, Default)]
pub struct PauseManager {
    reasons: BTreeSet<PauseType>,
}

impl PauseManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&mut self, reason: PauseType) {
        if self.reasons.insert(reason) {
            tracing::debug!("pause reason {reason:?} activated");
        }
    }

    pub fn resume(&mut self, reason: PauseType) {
        if self.reasons.remove(&reason) {
            tracing::debug!("pause reason {reason:?} cleared");
        }
    }

    pub fn is_paused(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn is_paused_by(&self, reason: PauseType) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn active(&self) -> impl Iterator<Item = &PauseType> {
        self.reasons.iter()
    }
}

#[test]
fn paused_while_any_reason_active() {
    let mut pauses = PauseManager::new();
    assert!(!pauses.is_paused());

    pauses.pause(PauseType::UserPause);
    pauses.pause(PauseType::ExceptionPause);
    pauses.pause(PauseType::UserPause);
    assert!(pauses.is_paused());

    pauses.resume(PauseType::UserPause);
    assert!(pauses.is_paused());
    assert!(pauses.is_paused_by(PauseType::ExceptionPause));

    pauses.resume(PauseType::ExceptionPause);
    pauses.resume(PauseType::ExceptionPause);
    assert!(!pauses.is_paused());
}
