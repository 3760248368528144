//! Utility Module
//!
//! - [`interner`]: String interning for shader define names and values
//!
//! ```rust,ignore
//! use strata::utils::interner;
//!
//! let sym1 = interner::intern("USE_NORMAL_MAP");
//! let sym2 = interner::intern("USE_NORMAL_MAP");
//! assert_eq!(sym1, sym2); // O(1) comparison
//! ```

pub mod interner;

pub use interner::Symbol;
