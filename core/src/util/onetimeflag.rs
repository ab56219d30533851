use std::sync::atomic::{AtomicBool, Ordering};

/// A flag that can be raised exactly once and never lowered. Raising it again
/// is a no-op, which makes it safe to hand to callbacks that may fire more
/// than once.
#[derive(Debug, Default)]
pub struct OneTimeFlag(AtomicBool);

impl OneTimeFlag {
    pub fn new() -> Self { Self(AtomicBool::new(false)) }

    /// Raise the flag. Returns true the first time, false afterwards.
    pub fn set(&self) -> bool { !self.0.swap(true, Ordering::SeqCst) }

    pub fn is_set(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_only_once() {
        let flag = OneTimeFlag::new();
        assert!(!flag.is_set());
        assert!(flag.set());
        assert!(!flag.set());
        assert!(flag.is_set());
    }
}
