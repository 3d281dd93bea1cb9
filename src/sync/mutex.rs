//! Mutex wrapper - uses parking_lot if available, std otherwise.

#[cfg(feature = "parking_lot")]
pub use parking_lot::{Mutex, MutexGuard};

#[cfg(not(feature = "parking_lot"))]
mod std_mutex {
    use std::sync::{Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError, TryLockError};

    /// Thin wrapper around std::sync::Mutex.
    ///
    /// Lock poisoning is ignored, matching parking_lot.
    pub struct Mutex<T>(StdMutex<T>);

    impl<T> Mutex<T> {
        /// Create a new mutex.
        pub const fn new(value: T) -> Self {
            Self(StdMutex::new(value))
        }

        /// Lock the mutex.
        pub fn lock(&self) -> MutexGuard<'_, T> {
            MutexGuard(self.0.lock().unwrap_or_else(PoisonError::into_inner))
        }

        /// Whether some thread currently holds the lock.
        #[allow(dead_code)]
        pub fn is_locked(&self) -> bool {
            matches!(self.0.try_lock(), Err(TryLockError::WouldBlock))
        }
    }

    impl<T: Default> Default for Mutex<T> {
        fn default() -> Self {
            Self::new(T::default())
        }
    }

    /// Guard for std mutex.
    pub struct MutexGuard<'a, T>(StdMutexGuard<'a, T>);

    impl<'a, T> std::ops::Deref for MutexGuard<'a, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            &self.0
        }
    }

    impl<'a, T> std::ops::DerefMut for MutexGuard<'a, T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            &mut self.0
        }
    }
}

#[cfg(not(feature = "parking_lot"))]
pub use std_mutex::{Mutex, MutexGuard};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_and_mutate() {
        let m = Mutex::new(vec![1u8, 2, 3]);
        m.lock().push(4);
        assert_eq!(m.lock().len(), 4);
    }

    #[test]
    fn test_is_locked_while_guard_lives() {
        let m = Mutex::new(0u32);
        assert!(!m.is_locked());
        let guard = m.lock();
        assert!(m.is_locked());
        drop(guard);
        assert!(!m.is_locked());
    }
}
