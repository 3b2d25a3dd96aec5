use std::sync::atomic::{AtomicBool, Ordering};

/// One-shot shutdown state shared by the normal exit path and the interrupt
/// handler. Whoever calls [`Shutdown::begin`] first owns the shutdown.
#[derive(Debug, Default)]
pub struct Shutdown {
    started: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` exactly once.
    pub fn begin(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_begin_once() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_started());
        assert!(shutdown.begin());
        assert!(!shutdown.begin());
        assert!(shutdown.is_started());
    }

    #[test]
    fn test_single_winner_across_threads() {
        let shutdown = Arc::new(Shutdown::new());
        let winners: usize = (0..8)
            .map(|_| {
                let shutdown = Arc::clone(&shutdown);
                std::thread::spawn(move || shutdown.begin() as usize)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
    }
}
