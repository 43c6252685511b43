//! Variable storage.
//!
//! A variable lives in its own slot, or, when the procedure keeps a
//! locals array, as an entry of that array keyed by the variable's name.
//! Stores are split in two halves so the array and key can be pushed
//! before the value is computed.

use quill_bound::{LocalId, Name, Ty, VarKind};

use crate::error::LowerError;
use crate::instr::{Instr, RuntimeFn};

use super::Emitter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum VarPlace {
    Slot(LocalId),
    Indirect { array: LocalId, name: Name, ty: Ty },
}

impl Emitter<'_> {
    /// Where `id` is stored.
    ///
    /// Named user variables and parameters go to the locals array when
    /// there is one; temporaries, `$this`, superglobals and the array
    /// itself keep their slots.
    pub(super) fn place_of(&self, id: LocalId) -> Result<VarPlace, LowerError> {
        let var = self.local(id)?;
        let array = match self.proc.locals_array {
            Some(array) if array != id => array,
            _ => return Ok(VarPlace::Slot(id)),
        };
        let named = matches!(var.kind, VarKind::Local | VarKind::Parameter) && !var.name.is_empty();
        if !named {
            return Ok(VarPlace::Slot(id));
        }
        self.local(array)?;
        Ok(VarPlace::Indirect {
            array,
            name: var.name,
            ty: var.ty,
        })
    }

    /// Push the value of `id`, typed as the variable.
    pub(super) fn emit_load_var(&mut self, id: LocalId) -> Result<(), LowerError> {
        match self.place_of(id)? {
            VarPlace::Slot(local) => self.emit(Instr::LoadLocal(local)),
            VarPlace::Indirect { array, name, ty } => {
                self.emit(Instr::LoadLocal(array))?;
                self.emit(Instr::ConstStr(name))?;
                self.call_runtime(RuntimeFn::ArrayGet)?;
                self.emit_convert(Ty::Value, ty)
            }
        }
    }

    /// First half of a store: push whatever the store consumes besides
    /// the value.
    pub(super) fn emit_store_prepare(&mut self, place: VarPlace) -> Result<(), LowerError> {
        match place {
            VarPlace::Slot(_) => Ok(()),
            VarPlace::Indirect { array, name, .. } => {
                self.emit(Instr::LoadLocal(array))?;
                self.emit(Instr::ConstStr(name))
            }
        }
    }

    /// Second half of a store: the value, typed as the variable, is on top.
    pub(super) fn emit_store(&mut self, place: VarPlace) -> Result<(), LowerError> {
        match place {
            VarPlace::Slot(local) => self.emit(Instr::StoreLocal(local)),
            VarPlace::Indirect { ty, .. } => {
                self.emit_convert(ty, Ty::Value)?;
                self.call_runtime(RuntimeFn::ArraySet)
            }
        }
    }

    /// Store the `Value` already on top of the stack into `id`.
    ///
    /// An indirect store needs the value above the array and key, so it
    /// goes through a temporary.
    pub(super) fn emit_store_pending(&mut self, id: LocalId) -> Result<(), LowerError> {
        let place = self.place_of(id)?;
        if let VarPlace::Slot(local) = place {
            return self.emit(Instr::StoreLocal(local));
        }
        let slot = self.acquire_temp(Ty::Value)?;
        self.emit(Instr::StoreTemp(slot))?;
        self.emit_store_prepare(place)?;
        self.emit(Instr::LoadTemp(slot))?;
        self.call_runtime(RuntimeFn::ArraySet)?;
        self.release_temp(slot)
    }

    /// Remove `id`'s binding: drop the array entry, or reset the slot.
    pub(super) fn emit_unset_var(&mut self, id: LocalId) -> Result<(), LowerError> {
        match self.place_of(id)? {
            VarPlace::Slot(local) => self.emit(Instr::ClearLocal(local)),
            VarPlace::Indirect { array, name, .. } => {
                self.emit(Instr::LoadLocal(array))?;
                self.emit(Instr::ConstStr(name))?;
                self.call_runtime(RuntimeFn::RemoveKey)
            }
        }
    }
}
