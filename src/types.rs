//! Core data types shared by the foreground and the worker
//!
//! # Main Types
//!
//! - [`FieldVector`] - Three-axis actuation target
//! - [`Axis`] - Selector for one component of a [`FieldVector`]
//! - [`Published`] - Single-writer value holder with whole-value swaps
//!
//! # Publication
//!
//! Every value shared between execution contexts lives in a [`Published`].
//! Writers build a complete new value and swap it in; readers take an
//! `Arc` snapshot. A reader therefore sees either the old value or the new
//! one, never a mixture of fields. The lock inside only guards the pointer
//! swap and is never held while doing I/O.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

/// One axis of the coil system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in device order
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Lower-case letter of the axis
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'x',
            Axis::Y => 'y',
            Axis::Z => 'z',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(format!("unknown axis '{}'", other)),
        }
    }
}

/// Target field value for the three coil axes
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl FieldVector {
    /// The safe all-zero vector
    pub const ZERO: FieldVector = FieldVector {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Component for one axis
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Copy of this vector with one axis replaced
    pub fn with_axis(self, axis: Axis, value: f64) -> Self {
        let mut v = self;
        match axis {
            Axis::X => v.x = value,
            Axis::Y => v.y = value,
            Axis::Z => v.z = value,
        }
        v
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    /// First axis holding a NaN or infinite value
    pub fn first_non_finite(&self) -> Option<(Axis, f64)> {
        Axis::ALL
            .into_iter()
            .map(|axis| (axis, self.get(axis)))
            .find(|(_, value)| !value.is_finite())
    }

    /// Clamp every component to `[-limit, limit]`
    pub fn clamped(self, limit: f64) -> Self {
        Self {
            x: self.x.clamp(-limit, limit),
            y: self.y.clamp(-limit, limit),
            z: self.z.clamp(-limit, limit),
        }
    }
}

impl fmt::Display for FieldVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Holder for a value published by one writer and read by many
#[derive(Debug)]
pub struct Published<T> {
    slot: RwLock<Arc<T>>,
}

impl<T> Published<T> {
    pub fn new(value: T) -> Self {
        Self {
            slot: RwLock::new(Arc::new(value)),
        }
    }

    /// Snapshot of the current value
    pub fn load(&self) -> Arc<T> {
        // The slot only ever holds a complete value, so a poisoned lock is still consistent.
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the value, returning the previous one
    pub fn store(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, next)
    }

    /// Build the next value from the current one and publish it in one swap
    pub fn update<F>(&self, f: F) -> Arc<T>
    where
        F: FnOnce(&T) -> T,
    {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(f(&slot));
        *slot = next.clone();
        next
    }
}

impl<T: Default> Default for Published<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_with_axis_keeps_other_components() {
        let v = FieldVector::new(1.0, 2.0, 3.0).with_axis(Axis::Y, -5.0);
        assert_eq!(v, FieldVector::new(1.0, -5.0, 3.0));
    }

    #[test]
    fn test_axis_parse() {
        assert_eq!("X".parse::<Axis>().unwrap(), Axis::X);
        assert_eq!(" z ".parse::<Axis>().unwrap(), Axis::Z);
        assert!("w".parse::<Axis>().is_err());
    }

    #[test]
    fn test_first_non_finite() {
        assert_eq!(FieldVector::new(1.0, 2.0, 3.0).first_non_finite(), None);
        let (axis, _) = FieldVector::new(1.0, f64::NAN, 3.0)
            .first_non_finite()
            .unwrap();
        assert_eq!(axis, Axis::Y);
    }

    #[test]
    fn test_clamped() {
        let v = FieldVector::new(12.0, -30.0, 0.5).clamped(10.0);
        assert_eq!(v, FieldVector::new(10.0, -10.0, 0.5));
    }

    #[test]
    fn test_published_store_returns_previous() {
        let p = Published::new(FieldVector::ZERO);
        let prev = p.store(FieldVector::new(1.0, 1.0, 1.0));
        assert!(prev.is_zero());
        assert_eq!(*p.load(), FieldVector::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_published_readers_never_see_torn_vectors() {
        // Writer publishes vectors whose components are all equal; readers check that.
        let p = Arc::new(Published::new(FieldVector::ZERO));
        let writer = {
            let p = p.clone();
            thread::spawn(move || {
                for i in 0..5_000 {
                    let v = i as f64;
                    p.store(FieldVector::new(v, v, v));
                }
            })
        };
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let p = p.clone();
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        let v = p.load();
                        assert!(v.x == v.y && v.y == v.z, "torn read: {:?}", v);
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
