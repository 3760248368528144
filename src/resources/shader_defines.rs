//! Shader Define Sets
//!
//! A program variant is described by the set of `#define`-style switches it is
//! compiled with. [`ShaderDefines`] stores those switches as interned
//! `(name, value)` symbol pairs kept in sorted order, so two sets built in a
//! different insertion order compare and hash identically.
//!
//! ```rust,ignore
//! use strata::resources::ShaderDefines;
//!
//! let mut defines = ShaderDefines::new();
//! defines.set("USE_MAP", "1");
//! defines.set("NUM_POINT_LIGHTS", "2");
//! let hash = defines.compute_hash();
//! ```

use std::collections::BTreeMap;
use std::hash::{BuildHasher, Hash, Hasher};

use crate::utils::interner::{self, Symbol};

/// An ordered collection of shader define switches.
#[derive(Debug, Clone, Default)]
pub struct ShaderDefines {
    defines: Vec<(Symbol, Symbol)>,
}

impl ShaderDefines {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            defines: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            defines: Vec::with_capacity(capacity),
        }
    }

    /// Sets `key` to `value`, replacing a previous value.
    pub fn set(&mut self, key: &str, value: &str) {
        let key_sym = interner::intern(key);
        let value_sym = interner::intern(value);
        self.set_symbol(key_sym, value_sym);
    }

    /// Sets `key` to the decimal rendering of `value`.
    pub fn set_count(&mut self, key: &str, value: usize) {
        self.set(key, &value.to_string());
    }

    /// Sets `key` to `"1"` when `enabled`, removes it otherwise.
    pub fn toggle(&mut self, key: &str, enabled: bool) {
        if enabled {
            self.set(key, "1");
        } else {
            self.remove(key);
        }
    }

    #[inline]
    pub fn set_symbol(&mut self, key: Symbol, value: Symbol) {
        match self.defines.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(idx) => self.defines[idx].1 = value,
            Err(idx) => self.defines.insert(idx, (key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let Some(key_sym) = interner::get(key) else {
            return false;
        };
        if let Ok(idx) = self.defines.binary_search_by_key(&key_sym, |&(k, _)| k) {
            self.defines.remove(idx);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        interner::get(key).is_some_and(|key_sym| {
            self.defines
                .binary_search_by_key(&key_sym, |&(k, _)| k)
                .is_ok()
        })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'static str> {
        let key_sym = interner::get(key)?;
        self.defines
            .binary_search_by_key(&key_sym, |&(k, _)| k)
            .ok()
            .map(|idx| interner::resolve(self.defines[idx].1))
    }

    #[inline]
    pub fn clear(&mut self) {
        self.defines.clear();
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Iterates `(name, value)` pairs as strings.
    pub fn iter_strings(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.defines
            .iter()
            .map(|&(k, v)| (interner::resolve(k), interner::resolve(v)))
    }

    /// Name-sorted map, used as template context and for diagnostics.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter_strings()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Human readable `NAME=value` list in name order.
    #[must_use]
    pub fn describe(&self) -> String {
        self.to_map()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Merges `other` into `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: &ShaderDefines) {
        for &(key, value) in &other.defines {
            self.set_symbol(key, value);
        }
    }

    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        rustc_hash::FxBuildHasher.hash_one(self)
    }
}

impl Hash for ShaderDefines {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.defines.hash(state);
    }
}

impl PartialEq for ShaderDefines {
    fn eq(&self, other: &Self) -> bool {
        self.defines == other.defines
    }
}

impl Eq for ShaderDefines {}

impl From<&[(&str, &str)]> for ShaderDefines {
    fn from(defines: &[(&str, &str)]) -> Self {
        let mut result = Self::with_capacity(defines.len());
        for (k, v) in defines {
            result.set(k, v);
        }
        result
    }
}
