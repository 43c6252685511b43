//! Pool of typed temporary slots.
//!
//! A slot is checked out with [`TempPool::acquire`] and handed back with
//! [`TempPool::release`]. Released slots are reused by later acquisitions
//! of the same type, so non-overlapping lowering operations share
//! storage. The pool belongs to one procedure's driver; nothing is shared
//! across procedures.

use quill_bound::Ty;
use rustc_hash::FxHashMap;

use crate::error::LowerError;
use crate::instr::TempSlot;

#[derive(Debug, Default)]
pub struct TempPool {
    /// Type of every slot ever allocated, indexed by `TempSlot::index()`.
    slots: Vec<Ty>,
    in_use: Vec<bool>,
    /// Released slots by type, reused LIFO.
    free: FxHashMap<Ty, Vec<TempSlot>>,
}

impl TempPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a slot of type `ty`, reusing a released one if possible.
    ///
    /// Returns the slot and whether it was freshly allocated.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "temporary counts never exceed u32"
    )]
    pub fn acquire(&mut self, ty: Ty) -> (TempSlot, bool) {
        if let Some(slot) = self.free.get_mut(&ty).and_then(Vec::pop) {
            self.in_use[slot.index()] = true;
            return (slot, false);
        }
        let slot = TempSlot::new(self.slots.len() as u32);
        self.slots.push(ty);
        self.in_use.push(true);
        (slot, true)
    }

    /// Return a slot to the pool.
    pub fn release(&mut self, slot: TempSlot) -> Result<(), LowerError> {
        match self.in_use.get_mut(slot.index()) {
            Some(in_use) if *in_use => {
                *in_use = false;
                let ty = self.slots[slot.index()];
                self.free.entry(ty).or_default().push(slot);
                Ok(())
            }
            _ => Err(LowerError::TempDoubleFree(slot)),
        }
    }

    pub fn ty(&self, slot: TempSlot) -> Option<Ty> {
        self.slots.get(slot.index()).copied()
    }

    /// Number of distinct slots ever allocated.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// First slot still checked out, if any.
    pub fn first_leaked(&self) -> Option<TempSlot> {
        self.in_use
            .iter()
            .position(|&in_use| in_use)
            .and_then(|i| u32::try_from(i).ok())
            .map(TempSlot::new)
    }

    /// Consume the pool, yielding the type of every slot.
    pub fn into_slot_types(self) -> Vec<Ty> {
        self.slots
    }
}
