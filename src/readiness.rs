use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadinessState {
    Ready = 0,
    Draining = 1,
}

impl ReadinessState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadinessState::Ready,
            _ => ReadinessState::Draining,
        }
    }
}

/// Process-wide readiness register.
///
/// Every transition is a single compare-and-exchange, so readers never see a
/// torn state and only one of several concurrent drain calls wins the
/// transition.
#[derive(Debug)]
pub struct Readiness {
    state: AtomicU8,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ReadinessState::Ready as u8),
        }
    }

    pub fn state(&self) -> ReadinessState {
        ReadinessState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ReadinessState::Ready
    }

    /// Ready -> Draining. Returns `true` only for the caller that performed
    /// the transition.
    pub fn drain(&self) -> bool {
        self.transition(ReadinessState::Ready, ReadinessState::Draining)
    }

    /// Draining -> Ready. Returns `true` only for the caller that performed
    /// the transition.
    pub fn undrain(&self) -> bool {
        self.transition(ReadinessState::Draining, ReadinessState::Ready)
    }

    fn transition(&self, from: ReadinessState, to: ReadinessState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn starts_ready() {
        let readiness = Readiness::new();
        assert_eq!(readiness.state(), ReadinessState::Ready);
        assert!(readiness.is_ready());
    }

    #[test]
    fn drain_and_undrain_are_idempotent() {
        let readiness = Readiness::new();

        assert!(readiness.drain());
        assert!(!readiness.drain());
        assert_eq!(readiness.state(), ReadinessState::Draining);

        assert!(readiness.undrain());
        assert!(!readiness.undrain());
        assert_eq!(readiness.state(), ReadinessState::Ready);
    }

    #[test]
    fn cycles_indefinitely() {
        let readiness = Readiness::new();
        for _ in 0..10 {
            assert!(readiness.drain());
            assert!(!readiness.is_ready());
            assert!(readiness.undrain());
            assert!(readiness.is_ready());
        }
    }

    #[test]
    fn exactly_one_concurrent_drain_wins() {
        let readiness = Arc::new(Readiness::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let readiness = Arc::clone(&readiness);
                thread::spawn(move || readiness.drain())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(readiness.state(), ReadinessState::Draining);
    }
}
