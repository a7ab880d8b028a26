//! Non-reentrant batch gate

use std::cell::Cell;
use std::rc::Rc;

/// Single busy flag guarding notification batches.
///
/// While a [`GateGuard`] is alive, further [`try_enter`](Self::try_enter)
/// calls fail. The flag drops back to idle when the guard is dropped, also
/// on unwind.
#[derive(Debug, Clone, Default)]
pub struct BatchGate {
    busy: Rc<Cell<bool>>,
}

#[derive(Debug)]
pub struct GateGuard {
    busy: Rc<Cell<bool>>,
}

impl BatchGate {
    pub fn try_enter(&self) -> Option<GateGuard> {
        if self.busy.replace(true) {
            return None;
        }
        Some(GateGuard {
            busy: Rc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.busy.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_is_exclusive() {
        let gate = BatchGate::default();
        let guard = gate.try_enter().unwrap();
        assert!(gate.is_busy());
        assert!(gate.try_enter().is_none());
        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_some());
    }
}
