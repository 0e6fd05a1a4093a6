//! Observable state container.
//!
//! A small get/set/subscribe cell over `tokio::sync::watch`, replacing the
//! reactive globals the UI layer would otherwise poke at. The coordinator
//! owns one for the "awaiting test result" flag and one for the modal
//! prompt slot; both reset on step change.

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Observable<T: Clone> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Last write wins. Setting the current value again is harmless, which
    /// keeps racing writers (an on-time result vs. the fallback timer) safe.
    pub fn set(&self, value: T) {
        // send_replace never fails; a plain send would error with no
        // subscribers.
        self.tx.send_replace(value);
    }

    /// Watch for changes. The receiver sees the value at subscription time
    /// and every subsequent set.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
