//! Pools shared by several handles.
//!
//! Every [`PoolHandle`](crate::PoolHandle) for one (arena, type) works on
//! the same [`SharedPool`]. Vending, `reserve` and `prepare_to_add` only
//! need a shared borrow, so any number of handles can use them side by
//! side. `reset`, `erase`, iteration and indexed access could alias or
//! invalidate an element another handle vended, so they are checked at run
//! time, in the manner of `RefCell`:
//!
//! - a handle opens a loan the first time it returns a reference into
//!   the pool;
//! - the loan is settled when the handle is next borrowed mutably or
//!   dropped, since either proves its references are gone;
//! - a checked operation fails with [`PoolError::ElementsOnLoan`] while any
//!   other handle's loan is open.

#![allow(unsafe_code)]

use std::cell::Cell;
use std::fmt;

use parking_lot::ReentrantMutex;

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::stats::PoolStats;
use crate::typed::{ClearFn, Iter, IterMut, PoolElement, TypedPoolAllocator};

/// A pool as stored in its arena.
///
/// The mutex is re-entrant: every handle on one thread shares it, while
/// other threads wait until that thread's handles are gone.
pub type PoolCell<T> = ReentrantMutex<SharedPool<T>>;

/// Record of whether one handle may still hold references into its pool.
#[derive(Debug, Default)]
pub(crate) struct Loan {
    open: Cell<bool>,
}

/// A [`TypedPoolAllocator`] plus the count of handles with open loans.
pub struct SharedPool<T> {
    pool: TypedPoolAllocator<T>,
    loans: Cell<usize>,
}

impl<T: PoolElement> SharedPool<T> {
    pub(crate) fn new(pool: TypedPoolAllocator<T>) -> Self {
        Self {
            pool,
            loans: Cell::new(0),
        }
    }

    /// Total slots, vended or not.
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Slots vended since the last reset.
    pub fn allocated(&self) -> usize {
        self.pool.allocated()
    }

    /// Element, byte and block usage.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Name of the element type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.pool.type_name()
    }

    /// The clear callback registered at creation.
    pub fn clear_callback(&self) -> Option<ClearFn<T>> {
        self.pool.clear_callback()
    }

    /// Configuration the pool was created with.
    pub fn config(&self) -> &PoolConfig {
        self.pool.config()
    }

    /// Number of handles that may still hold references into the pool.
    pub fn loans(&self) -> usize {
        self.loans.get()
    }

    #[allow(clippy::mut_from_ref)]
    pub(crate) fn next_element<'a>(&'a self, loan: &'a Loan) -> Result<&'a mut T> {
        self.open(loan);
        self.pool.next_element()
    }

    pub(crate) fn prepare_to_add(&self, n: usize) -> Result<()> {
        self.pool.prepare_to_add(n)
    }

    pub(crate) fn reserve(&self, n: usize) -> Result<()> {
        self.pool.reserve(n)
    }

    pub(crate) fn reset(&self, loan: &mut Loan) -> Result<()> {
        self.settle(loan);
        self.reset_unlent()
    }

    /// Reset on behalf of a holder with no loan of its own.
    pub(crate) fn reset_unlent(&self) -> Result<()> {
        self.ensure_unlent()?;
        // SAFETY: no handle has an open loan, so no vended reference is alive.
        unsafe { self.pool.reset_unchecked() };
        Ok(())
    }

    pub(crate) fn erase(&self, loan: &mut Loan) -> Result<()> {
        self.settle(loan);
        self.erase_unlent()
    }

    /// Erase on behalf of a holder with no loan of its own.
    pub(crate) fn erase_unlent(&self) -> Result<()> {
        self.ensure_unlent()?;
        // SAFETY: as for `reset_unlent`.
        unsafe { self.pool.erase_unchecked() };
        Ok(())
    }

    pub(crate) fn iter<'a>(&'a self, loan: &'a mut Loan) -> Result<Iter<'a, T>> {
        self.settle(loan);
        self.ensure_unlent()?;
        self.open(loan);
        // SAFETY: no other handle holds references, and the caller's loan
        // stays open until it is mutably borrowed again, after `'a`.
        Ok(unsafe { self.pool.iter_unchecked() })
    }

    pub(crate) fn iter_mut<'a>(&'a self, loan: &'a mut Loan) -> Result<IterMut<'a, T>> {
        self.settle(loan);
        self.ensure_unlent()?;
        self.open(loan);
        // SAFETY: as for `iter`.
        Ok(unsafe { self.pool.iter_mut_unchecked() })
    }

    pub(crate) fn get_mut<'a>(
        &'a self,
        loan: &'a mut Loan,
        index: usize,
    ) -> Result<Option<&'a mut T>> {
        self.settle(loan);
        self.ensure_unlent()?;
        self.open(loan);
        // SAFETY: as for `iter`.
        Ok(unsafe { self.pool.get_unchecked(index) })
    }

    /// Close `loan`; `&mut` proves the references it covered are gone.
    pub(crate) fn settle(&self, loan: &mut Loan) {
        if loan.open.replace(false) {
            self.loans.set(self.loans.get() - 1);
        }
    }

    fn open(&self, loan: &Loan) {
        if !loan.open.replace(true) {
            self.loans.set(self.loans.get() + 1);
        }
    }

    fn ensure_unlent(&self) -> Result<()> {
        match self.loans.get() {
            0 => Ok(()),
            handles => Err(PoolError::ElementsOnLoan {
                type_name: self.type_name(),
                handles,
            }),
        }
    }
}

impl<T> fmt::Debug for SharedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPool")
            .field("pool", &self.pool)
            .field("loans", &self.loans.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Digit {
        adc: u16,
    }

    fn shared() -> SharedPool<Digit> {
        SharedPool::new(TypedPoolAllocator::new(PoolConfig::new(), None).unwrap())
    }

    #[test]
    fn vending_opens_one_loan_per_holder() {
        let pool = shared();
        let (a, b) = (Loan::default(), Loan::default());
        pool.next_element(&a).unwrap().adc = 1;
        pool.next_element(&a).unwrap().adc = 2;
        assert_eq!(pool.loans(), 1);
        pool.next_element(&b).unwrap();
        assert_eq!(pool.loans(), 2);
        assert_eq!(pool.allocated(), 3);
    }

    #[test]
    fn reset_waits_for_other_loans() {
        let pool = shared();
        let (mut a, mut b) = (Loan::default(), Loan::default());
        pool.next_element(&a).unwrap();
        pool.next_element(&b).unwrap();

        let err = pool.reset(&mut a).unwrap_err();
        assert!(matches!(err, PoolError::ElementsOnLoan { handles: 1, .. }));
        assert_eq!(pool.allocated(), 2);

        pool.settle(&mut b);
        pool.reset(&mut a).unwrap();
        assert_eq!(pool.allocated(), 0);
        assert_eq!(pool.loans(), 0);
    }

    #[test]
    fn own_loan_does_not_block_iteration() {
        let pool = shared();
        let mut a = Loan::default();
        for adc in 0..3 {
            pool.next_element(&a).unwrap().adc = adc;
        }
        let adcs: Vec<u16> = pool.iter(&mut a).unwrap().map(|d| d.adc).collect();
        assert_eq!(adcs, vec![2, 1, 0]);
        // Iterating leaves the loan open.
        assert_eq!(pool.loans(), 1);
        assert!(pool.reset_unlent().is_err());
    }

    #[test]
    fn erase_without_loans_releases_blocks() {
        let pool = shared();
        let mut a = Loan::default();
        pool.reserve(10).unwrap();
        pool.next_element(&a).unwrap();
        pool.erase(&mut a).unwrap();
        assert_eq!(pool.capacity(), 0);
    }
}
