// SPDX-License-Identifier: AGPL-3.0-only

//! Scratch spinor pool.
//!
//! Operators need temporaries for composite applications (`M` built from two
//! hopping applications, `MdagM`, the Schur reduction). Buffers are checked
//! out for the duration of one call and returned on drop, so concurrent
//! calls on one operator never share a temporary.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

use crate::lattice::spinor::{ColorSpinorField, FieldShape};

/// Free list of scratch fields of any shape.
#[derive(Debug, Default)]
pub struct ScratchPool {
    free: Mutex<Vec<ColorSpinorField>>,
}

impl ScratchPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a buffer of the given shape.
    ///
    /// Contents are unspecified; every user overwrites the whole field.
    pub fn take(&self, shape: FieldShape) -> Scratch<'_> {
        let reused = {
            let mut free = self.free.lock();
            free.iter()
                .position(|f| f.shape() == shape)
                .map(|i| free.swap_remove(i))
        };
        let field = reused.unwrap_or_else(|| {
            ColorSpinorField::zeros(shape.geometry, shape.nspin, shape.subset, shape.precision)
        });
        Scratch {
            pool: self,
            field: Some(field),
        }
    }

    /// Check out a buffer shaped like `field`.
    pub fn take_like(&self, field: &ColorSpinorField) -> Scratch<'_> {
        self.take(field.shape())
    }

    /// Buffers currently idle in the pool.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

/// A checked-out scratch field, returned to its pool on drop.
#[derive(Debug)]
pub struct Scratch<'a> {
    pool: &'a ScratchPool,
    field: Option<ColorSpinorField>,
}

impl Deref for Scratch<'_> {
    type Target = ColorSpinorField;

    fn deref(&self) -> &ColorSpinorField {
        match &self.field {
            Some(f) => f,
            None => unreachable!("scratch field is only taken in drop"),
        }
    }
}

impl DerefMut for Scratch<'_> {
    fn deref_mut(&mut self) -> &mut ColorSpinorField {
        match &mut self.field {
            Some(f) => f,
            None => unreachable!("scratch field is only taken in drop"),
        }
    }
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        if let Some(field) = self.field.take() {
            self.pool.free.lock().push(field);
        }
    }
}
