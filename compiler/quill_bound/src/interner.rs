//! String interner shared between the binder and the backend.
//!
//! Lookups take a read lock; interning a new string takes the write lock
//! once. Several procedures are lowered in parallel while the binder's
//! interner stays shared, so the interner must be `Sync`.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::Name;

/// Error when interning a string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InternError {
    /// More than `u32::MAX` strings were interned.
    #[error("interner exceeded capacity: {count} strings, max is {max}", max = u32::MAX)]
    Overflow { count: usize },
}

struct InternTable {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

/// Thread-safe string interner.
///
/// Interned strings are leaked for the lifetime of the process so that
/// [`lookup`](StringInterner::lookup) can hand out `&'static str` without
/// holding the lock.
pub struct StringInterner {
    table: RwLock<InternTable>,
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl StringInterner {
    /// Create an interner with the empty string pre-interned as [`Name::EMPTY`].
    pub fn new() -> Self {
        let empty: &'static str = "";
        let mut map = FxHashMap::default();
        map.insert(empty, 0);
        Self {
            table: RwLock::new(InternTable {
                map,
                strings: vec![empty],
            }),
        }
    }

    /// Intern a string, returning its `Name` or an error on overflow.
    pub fn try_intern(&self, s: &str) -> Result<Name, InternError> {
        if let Some(&idx) = self.table.read().map.get(s) {
            return Ok(Name::from_raw(idx));
        }

        let mut table = self.table.write();
        // Another thread may have interned `s` between the two locks.
        if let Some(&idx) = table.map.get(s) {
            return Ok(Name::from_raw(idx));
        }

        let count = table.strings.len();
        let idx = u32::try_from(count).map_err(|_| InternError::Overflow { count })?;
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        table.map.insert(leaked, idx);
        table.strings.push(leaked);
        Ok(Name::from_raw(idx))
    }

    /// Intern a string.
    ///
    /// # Panics
    ///
    /// Panics if the interner overflows `u32::MAX` entries.
    pub fn intern(&self, s: &str) -> Name {
        self.try_intern(s).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Look up the string for a name. Unknown names resolve to `""`.
    pub fn lookup(&self, name: Name) -> &'static str {
        self.table
            .read()
            .strings
            .get(name.index())
            .copied()
            .unwrap_or("")
    }

    /// Number of interned strings, including the empty string.
    pub fn len(&self) -> usize {
        self.table.read().strings.len()
    }

    /// Always `false`: the empty string is pre-interned.
    pub fn is_empty(&self) -> bool {
        false
    }
}
