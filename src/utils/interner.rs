//! Global string interner.
//!
//! Converts shader define names and values into integer [`Symbol`]s so that
//! define sets can be compared and hashed without touching string data.

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact integer identifier for an interned string.
pub type Symbol = Spur;

/// Interns `s`, returning the existing symbol when it was seen before.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up an already interned string without allocating.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

/// Interns the define names every program variant touches, keeping the hot
/// path of feature-key derivation free of first-time insertions.
pub fn preload_common_defines() {
    let common = [
        // material
        "SHADING_MODEL",
        "USE_MAP",
        "USE_ALPHA_MAP",
        "USE_NORMAL_MAP",
        "USE_EMISSIVE_MAP",
        "USE_AO_MAP",
        "USE_ROUGHNESS_MAP",
        "USE_METALNESS_MAP",
        "USE_SPECULAR_MAP",
        "USE_ENV_MAP",
        "USE_TRANSMISSION",
        "USE_TRANSMISSION_MAP",
        "USE_ALPHA_TEST",
        "USE_ALPHA_TO_COVERAGE",
        "PREMULTIPLIED_ALPHA",
        "DOUBLE_SIDED",
        "FLIP_SIDED",
        "FLAT_SHADED",
        "USE_FOG",
        "DITHERING",
        // geometry
        "USE_COLOR",
        "USE_UV",
        "USE_NORMAL",
        "USE_TANGENT",
        "USE_INSTANCING",
        "USE_SKINNING",
        "USE_MORPH_TARGETS",
        "USE_MORPH_NORMALS",
        "MORPH_TARGETS_COUNT",
        // scene / output
        "NUM_DIR_LIGHTS",
        "NUM_POINT_LIGHTS",
        "NUM_SPOT_LIGHTS",
        "NUM_HEMI_LIGHTS",
        "NUM_RECT_AREA_LIGHTS",
        "NUM_DIR_LIGHT_SHADOWS",
        "NUM_POINT_LIGHT_SHADOWS",
        "NUM_SPOT_LIGHT_SHADOWS",
        "NUM_CLIPPING_PLANES",
        "OUTPUT_COLOR_SPACE",
        "TONE_MAPPING",
        // values
        "0",
        "1",
    ];

    for name in common {
        intern(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_resolve() {
        let s1 = intern("USE_MAP");
        let s2 = intern("USE_MAP");
        let s3 = intern("USE_FOG");

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);

        assert_eq!(resolve(s1), "USE_MAP");
        assert_eq!(resolve(s3), "USE_FOG");
    }

    #[test]
    fn test_get_does_not_insert() {
        let _ = intern("EXISTING_DEFINE");

        assert!(get("EXISTING_DEFINE").is_some());
        assert!(get("NEVER_INTERNED_DEFINE").is_none());
    }
}
