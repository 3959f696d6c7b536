//! HAL-dependent boolean properties
//!
//! Classes carry a [`PropertySet`] of "PDB" properties whose values are fixed
//! from the halspec while the object is constructed. The set is a plain bit
//! mask, so a zeroed object starts with every property clear.

use std::fmt;
use std::marker::PhantomData;

/// A property enum usable in a [`PropertySet`]
pub trait PdbProperty: Copy + Eq + 'static {
    /// Every property, in bit order
    const ALL: &'static [Self];

    /// Bit position (must be below 64)
    fn bit(self) -> u32;

    /// Property name
    fn name(self) -> &'static str;
}

/// Bit set of properties
#[repr(transparent)]
pub struct PropertySet<P: PdbProperty> {
    bits: u64,
    _marker: PhantomData<P>,
}

impl<P: PdbProperty> PropertySet<P> {
    /// Empty set
    pub const fn new() -> Self {
        Self {
            bits: 0,
            _marker: PhantomData,
        }
    }

    /// Set or clear a property
    #[inline]
    pub fn set(&mut self, property: P, value: bool) {
        let mask = 1u64 << property.bit();
        if value {
            self.bits |= mask;
        } else {
            self.bits &= !mask;
        }
    }

    /// Read a property
    #[inline]
    pub fn get(&self, property: P) -> bool {
        self.bits & (1u64 << property.bit()) != 0
    }

    /// Raw mask
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Properties currently set
    pub fn iter_set(&self) -> impl Iterator<Item = P> + '_ {
        P::ALL.iter().copied().filter(move |property| self.get(*property))
    }
}

impl<P: PdbProperty> Default for PropertySet<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PdbProperty> Clone for PropertySet<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: PdbProperty> Copy for PropertySet<P> {}

impl<P: PdbProperty> fmt::Debug for PropertySet<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.iter_set().map(|property| property.name()))
            .finish()
    }
}
