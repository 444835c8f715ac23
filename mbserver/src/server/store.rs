use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::BANK_CAPACITY;
use crate::types::AddressRange;

/// One addressable bank of 65536 values
///
/// Every address is valid. Operations spanning several values wrap from 65535 to 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterBank<T> {
    values: Box<[T]>,
}

impl<T> RegisterBank<T>
where
    T: Copy + Default,
{
    /// Create a bank with every value set to its default (`false` or `0`)
    pub fn new() -> Self {
        Self {
            values: vec![T::default(); BANK_CAPACITY].into_boxed_slice(),
        }
    }

    /// Value at `address`
    pub fn get(&self, address: u16) -> T {
        self.values
            .get(address as usize)
            .copied()
            .unwrap_or_default()
    }

    /// Set the value at `address`
    pub fn set(&mut self, address: u16, value: T) {
        if let Some(x) = self.values.get_mut(address as usize) {
            *x = value;
        }
    }

    /// Read `count` consecutive values starting at `start`, wrapping past the top
    pub fn read(&self, start: u16, count: u16) -> Vec<T> {
        AddressRange::new(start, count)
            .iter()
            .map(|address| self.get(address))
            .collect()
    }

    /// Write consecutive values starting at `start`, wrapping past the top
    pub fn write(&mut self, start: u16, values: &[T]) {
        let mut address = start;
        for value in values {
            self.set(address, *value);
            address = address.wrapping_add(1);
        }
    }
}

impl<T> Default for RegisterBank<T>
where
    T: Copy + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A [`RegisterBank`] behind its own lock, cheap to clone and share across tasks
///
/// The dispatcher and any out-of-band provisioning code go through the same
/// lock, so each operation on a bank is atomic with respect to the others.
#[derive(Debug)]
pub struct SharedBank<T> {
    inner: Arc<Mutex<RegisterBank<T>>>,
}

impl<T> Clone for SharedBank<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for SharedBank<T>
where
    T: Copy + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedBank<T>
where
    T: Copy + Default,
{
    /// Create a bank with every value set to its default
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegisterBank::new())),
        }
    }

    /// Value at `address`
    pub fn get(&self, address: u16) -> T {
        self.lock().get(address)
    }

    /// Set the value at `address`
    pub fn set(&self, address: u16, value: T) {
        self.lock().set(address, value)
    }

    /// Read `count` consecutive values starting at `start`, wrapping past the top
    pub fn read(&self, start: u16, count: u16) -> Vec<T> {
        self.lock().read(start, count)
    }

    /// Write consecutive values starting at `start`, wrapping past the top
    pub fn write(&self, start: u16, values: &[T]) {
        self.lock().write(start, values)
    }

    /// Run a closure with exclusive access to the bank
    pub fn with<R, F>(&self, func: F) -> R
    where
        F: FnOnce(&mut RegisterBank<T>) -> R,
    {
        func(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, RegisterBank<T>> {
        // a panic while holding the lock can't leave a bank of plain values inconsistent
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The four register banks of a server
#[derive(Clone, Debug, Default)]
pub struct RegisterStore {
    /// read/write bits
    pub coils: SharedBank<bool>,
    /// read-only bits
    pub discrete_inputs: SharedBank<bool>,
    /// read/write 16-bit words
    pub holding_registers: SharedBank<u16>,
    /// read-only 16-bit words
    pub input_registers: SharedBank<u16>,
}

impl RegisterStore {
    /// Create a store with every value cleared
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_address_is_valid() {
        let mut bank = RegisterBank::<u16>::new();
        bank.set(0, 1);
        bank.set(u16::MAX, 2);
        assert_eq!(bank.get(0), 1);
        assert_eq!(bank.get(u16::MAX), 2);
        assert_eq!(bank.get(1234), 0);
    }

    #[test]
    fn reads_wrap_past_the_top() {
        let bank = SharedBank::<u16>::new();
        bank.set(65530, 1);
        bank.set(65535, 65535);
        bank.set(0, 7);
        assert_eq!(bank.read(65534, 3), vec![0, 65535, 7]);
        assert_eq!(bank.read(65530, 6), vec![1, 0, 0, 0, 0, 65535]);
    }

    #[test]
    fn writes_wrap_past_the_top() {
        let bank = SharedBank::<bool>::new();
        bank.write(65535, &[true, true, false, true]);
        assert!(bank.get(65535));
        assert!(bank.get(0));
        assert!(!bank.get(1));
        assert!(bank.get(2));
    }

    #[test]
    fn clones_share_the_same_bank() {
        let store = RegisterStore::new();
        let copy = store.clone();
        copy.holding_registers.set(10, 0xCAFE);
        assert_eq!(store.holding_registers.get(10), 0xCAFE);
        assert_eq!(store.input_registers.get(10), 0);
    }

    #[test]
    fn with_grants_exclusive_access() {
        let bank = SharedBank::<u16>::new();
        let sum = bank.with(|bank| {
            bank.write(0, &[1, 2, 3]);
            bank.read(0, 3).iter().sum::<u16>()
        });
        assert_eq!(sum, 6);
    }

    #[test]
    fn survives_a_poisoned_lock() {
        let bank = SharedBank::<u16>::new();
        let other = bank.clone();
        let _ = std::thread::spawn(move || {
            other.with(|bank| {
                bank.set(1, 42);
                panic!("boom");
            })
        })
        .join();
        assert_eq!(bank.get(1), 42);
    }

    #[test]
    fn concurrent_writers_are_serialized() {
        let bank = SharedBank::<u16>::new();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let bank = bank.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        bank.with(|b| b.set(0, b.get(0) + 1));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(bank.get(0), 8000);
    }
}
