use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Whose turn it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    MainLoop,
    DataProcessor,
    /// Nobody runs any more; every waiter returns.
    Shutdown,
}

/// A strict two party baton pass.
///
/// Every method that hands the baton over also blocks until it comes
/// back, and reports `false` if the switch was shut down meanwhile.
#[derive(Debug)]
pub struct ContextSwitch {
    turn: Mutex<Turn>,
    changed: Condvar,
}

impl Default for ContextSwitch {
    fn default() -> Self {
        Self {
            turn: Mutex::new(Turn::MainLoop),
            changed: Condvar::new(),
        }
    }
}

impl ContextSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Turn> {
        self.turn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pass_and_wait(&self, to: Turn) -> bool {
        let mut turn = self.lock();
        if *turn == Turn::Shutdown {
            return false;
        }
        *turn = to;
        self.changed.notify_all();
        while *turn == to {
            turn = self
                .changed
                .wait(turn)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *turn != Turn::Shutdown
    }

    pub fn current(&self) -> Turn {
        *self.lock()
    }

    /// Main loop side: let the data processor run until it hands back.
    pub fn switch_to_data_processor(&self) -> bool {
        self.pass_and_wait(Turn::DataProcessor)
    }

    /// Data processor side: block until the main loop hands over.
    pub fn wait_for_turn(&self) -> bool {
        let mut turn = self.lock();
        while *turn == Turn::MainLoop {
            turn = self
                .changed
                .wait(turn)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *turn == Turn::DataProcessor
    }

    /// Data processor side: give the baton back and wait for the next
    /// turn.
    pub fn hand_back(&self) -> bool {
        self.pass_and_wait(Turn::MainLoop)
    }

    pub fn shutdown(&self) {
        *self.lock() = Turn::Shutdown;
        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn sides_alternate() {
        let switch = Arc::new(ContextSwitch::new());
        let steps = Arc::new(AtomicUsize::new(0));

        let dp = {
            let switch = switch.clone();
            let steps = steps.clone();
            std::thread::spawn(move || {
                let mut seen = Vec::new();
                if !switch.wait_for_turn() {
                    return seen;
                }
                loop {
                    seen.push(steps.fetch_add(1, Ordering::SeqCst));
                    if !switch.hand_back() {
                        return seen;
                    }
                }
            })
        };

        let mut seen = Vec::new();
        for _ in 0..3 {
            assert!(switch.switch_to_data_processor());
            assert_eq!(switch.current(), Turn::MainLoop);
            seen.push(steps.fetch_add(1, Ordering::SeqCst));
        }
        switch.shutdown();
        assert_eq!(dp.join().unwrap(), vec![0, 2, 4]);
        assert_eq!(seen, vec![1, 3, 5]);
    }

    #[test]
    fn shutdown_releases_waiter() {
        let switch = Arc::new(ContextSwitch::new());
        let dp = {
            let switch = switch.clone();
            std::thread::spawn(move || switch.wait_for_turn())
        };
        switch.shutdown();
        assert!(!dp.join().unwrap());
        assert!(!switch.switch_to_data_processor());
    }
}
