//! Asset Handles
//!
//! Generational slotmap keys. A handle stays `Copy` and cheap to store in
//! scene components; resolving a handle whose asset was disposed yields `None`
//! instead of aliasing a newer asset in the same slot.

use slotmap::new_key_type;

new_key_type! {
    pub struct GeometryHandle;
    pub struct MaterialHandle;
    pub struct TextureHandle;
}
