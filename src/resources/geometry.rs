use std::cell::RefCell;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use glam::Vec3;
use rustc_hash::FxHashMap;
use uuid::Uuid;
use wgpu::{IndexFormat, PrimitiveTopology, VertexFormat, VertexStepMode};

use crate::errors::{Result, StrataError};
use crate::resources::bounds::{BoundingBox, BoundingSphere};
use crate::resources::primitives;
use crate::resources::shader_defines::ShaderDefines;
use crate::resources::version_tracker::ChangeTracker;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_GEOMETRY_ID: AtomicU32 = AtomicU32::new(1);

/// How often the CPU side of a buffer is expected to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Written once, drawn many times.
    #[default]
    Static,
    /// Rewritten repeatedly, drawn many times.
    Dynamic,
    /// Rewritten every frame.
    Stream,
}

/// One attribute channel: CPU-side bytes plus their vertex layout.
///
/// Interleaved attributes share both the `Arc` data and the `buffer_id`, so the
/// backend keeps one GPU buffer for all of them. Editing a shared channel
/// copies its bytes and moves it to a fresh `buffer_id`; the siblings keep
/// the old buffer.
#[derive(Debug, Clone)]
pub struct Attribute {
    buffer_id: u64,
    data: Arc<Vec<u8>>,
    version: u64,
    update_ranges: Vec<Range<u64>>,
    needs_full_upload: bool,

    pub format: VertexFormat,
    pub offset: u64,
    pub stride: u64,
    pub count: u32,
    pub step_mode: VertexStepMode,
    pub usage: BufferUsage,
}

impl Attribute {
    /// Planar (non-interleaved) per-vertex attribute.
    pub fn new_planar<T: bytemuck::Pod>(data: &[T], format: VertexFormat) -> Self {
        Self::from_bytes(
            bytemuck::cast_slice(data).to_vec(),
            format,
            std::mem::size_of::<T>() as u64,
            data.len() as u32,
            VertexStepMode::Vertex,
        )
    }

    /// Per-instance attribute.
    pub fn new_instanced<T: bytemuck::Pod>(data: &[T], format: VertexFormat) -> Self {
        Self::from_bytes(
            bytemuck::cast_slice(data).to_vec(),
            format,
            std::mem::size_of::<T>() as u64,
            data.len() as u32,
            VertexStepMode::Instance,
        )
    }

    fn from_bytes(
        bytes: Vec<u8>,
        format: VertexFormat,
        stride: u64,
        count: u32,
        step_mode: VertexStepMode,
    ) -> Self {
        Self {
            buffer_id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            data: Arc::new(bytes),
            version: 1,
            update_ranges: Vec::new(),
            needs_full_upload: false,
            format,
            offset: 0,
            stride,
            count,
            step_mode,
            usage: BufferUsage::Static,
        }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Identifier of the backing buffer (shared by interleaved siblings).
    #[inline]
    #[must_use]
    pub fn buffer_id(&self) -> u64 {
        self.buffer_id
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of scalar components per element (3 for `Float32x3`).
    #[must_use]
    pub fn item_size(&self) -> u32 {
        component_count(self.format)
    }

    #[must_use]
    pub fn normalized(&self) -> bool {
        matches!(
            self.format,
            VertexFormat::Unorm8x2
                | VertexFormat::Unorm8x4
                | VertexFormat::Snorm8x2
                | VertexFormat::Snorm8x4
                | VertexFormat::Unorm16x2
                | VertexFormat::Unorm16x4
                | VertexFormat::Snorm16x2
                | VertexFormat::Snorm16x4
        )
    }

    #[must_use]
    pub fn is_instanced(&self) -> bool {
        self.step_mode == VertexStepMode::Instance
    }

    /// Byte ranges modified since the last upload.
    #[must_use]
    pub fn update_ranges(&self) -> &[Range<u64>] {
        &self.update_ranges
    }

    /// True once [`update_data`](Self::update_data) replaced the contents.
    /// Sub-range edits made afterwards do not narrow the pending upload.
    #[must_use]
    pub fn needs_full_upload(&self) -> bool {
        self.needs_full_upload
    }

    /// Marks the pending upload as done.
    pub fn clear_update_ranges(&mut self) {
        self.update_ranges.clear();
        self.needs_full_upload = false;
    }

    /// Replaces the whole data array; the next upload is a full one.
    pub fn update_data<T: bytemuck::Pod>(&mut self, new_data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(new_data);
        if Arc::get_mut(&mut self.data).is_some() {
            let vec = Arc::make_mut(&mut self.data);
            vec.clear();
            vec.extend_from_slice(bytes);
        } else {
            self.data = Arc::new(bytes.to_vec());
            self.buffer_id = NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed);
        }

        self.count = new_data.len() as u32;
        self.update_ranges.clear();
        self.needs_full_upload = true;
        self.version = self.version.wrapping_add(1);
    }

    /// Gives this channel sole ownership of its bytes before an in-place edit.
    fn make_unique(&mut self) -> &mut Vec<u8> {
        if Arc::get_mut(&mut self.data).is_none() {
            self.data = Arc::new(self.data.as_ref().clone());
            self.buffer_id = NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed);
            self.needs_full_upload = true;
        }
        Arc::make_mut(&mut self.data)
    }

    /// Overwrites a byte region in place and records it as a dirty sub-range.
    /// Out-of-bounds writes are rejected and logged.
    pub fn update_region<T: bytemuck::Pod>(&mut self, offset_bytes: u64, new_data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(new_data);
        let start = offset_bytes as usize;
        let end = start + bytes.len();
        if end > self.data.len() {
            log::warn!(
                "Attribute region update {start}..{end} exceeds buffer size {}",
                self.data.len()
            );
            return;
        }
        self.make_unique()[start..end].copy_from_slice(bytes);
        if !self.needs_full_upload {
            self.update_ranges.push(offset_bytes..end as u64);
        }
        self.version = self.version.wrapping_add(1);
    }

    fn element_bytes(&self, i: u32) -> Option<&[u8]> {
        let start = self.offset as usize + i as usize * self.stride as usize;
        self.data.get(start..start + self.format.size() as usize)
    }

    #[must_use]
    pub fn read_vec3(&self, i: u32) -> Option<Vec3> {
        if self.format != VertexFormat::Float32x3 {
            return None;
        }
        let bytes = self.element_bytes(i)?;
        let vals: [f32; 3] = bytemuck::pod_read_unaligned(bytes);
        Some(Vec3::from_array(vals))
    }

    pub fn iter_vec3(&self) -> impl Iterator<Item = Vec3> + '_ {
        (0..self.count).filter_map(|i| self.read_vec3(i))
    }

    /// De-indexes this attribute: element `k` of the result is element `indices[k]`.
    /// Out-of-range indices produce zeroed elements.
    #[must_use]
    pub fn expand(&self, indices: &[u32]) -> Attribute {
        let size = self.format.size() as usize;
        let mut bytes = Vec::with_capacity(indices.len() * size);
        for &idx in indices {
            match self.element_bytes(idx) {
                Some(src) if idx < self.count => bytes.extend_from_slice(src),
                _ => bytes.resize(bytes.len() + size, 0),
            }
        }
        let mut attr = Self::from_bytes(
            bytes,
            self.format,
            size as u64,
            indices.len() as u32,
            self.step_mode,
        );
        attr.usage = self.usage;
        attr
    }
}

fn component_count(format: VertexFormat) -> u32 {
    match format {
        VertexFormat::Float32
        | VertexFormat::Uint32
        | VertexFormat::Sint32
        | VertexFormat::Float16 => 1,
        VertexFormat::Float32x2
        | VertexFormat::Uint32x2
        | VertexFormat::Sint32x2
        | VertexFormat::Float16x2
        | VertexFormat::Unorm8x2
        | VertexFormat::Snorm8x2
        | VertexFormat::Uint8x2
        | VertexFormat::Sint8x2
        | VertexFormat::Unorm16x2
        | VertexFormat::Snorm16x2
        | VertexFormat::Uint16x2
        | VertexFormat::Sint16x2 => 2,
        VertexFormat::Float32x3 | VertexFormat::Uint32x3 | VertexFormat::Sint32x3 => 3,
        _ => 4,
    }
}

/// Index sub-range drawn with one material slot of a multi-material mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryGroup {
    pub start: u32,
    pub count: u32,
    pub material_index: usize,
}

/// Vertex/index data of a drawable.
///
/// The geometry never talks to the GPU. Mutations only bump versions; the
/// renderer's buffer manager compares versions and uploads what changed.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub uuid: Uuid,
    id: u32,

    // vertex layout versioning (feeds program features)
    layout_version: ChangeTracker,
    data_version: ChangeTracker,

    attributes: FxHashMap<String, Attribute>,
    index_attribute: Option<Attribute>,

    morph_attributes: FxHashMap<String, Vec<Attribute>>,
    morph_targets_relative: bool,

    pub groups: Vec<GeometryGroup>,
    pub topology: PrimitiveTopology,
    pub draw_range: Range<u32>,

    bounding_box: Option<BoundingBox>,
    bounding_sphere: Option<BoundingSphere>,

    /// ShaderDefines cache: (layout_version, defines)
    cached_shader_defines: RefCell<Option<(u64, ShaderDefines)>>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

impl Geometry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed),
            layout_version: ChangeTracker::new(),
            data_version: ChangeTracker::new(),
            attributes: FxHashMap::default(),
            index_attribute: None,
            morph_attributes: FxHashMap::default(),
            morph_targets_relative: false,
            groups: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            draw_range: 0..u32::MAX,
            bounding_box: None,
            bounding_sphere: None,
            cached_shader_defines: RefCell::new(None),
        }
    }

    /// Process-unique id, stable for the lifetime of the geometry.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn layout_version(&self) -> u64 {
        self.layout_version.version()
    }

    #[inline]
    #[must_use]
    pub fn data_version(&self) -> u64 {
        self.data_version.version()
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn attributes(&self) -> &FxHashMap<String, Attribute> {
        &self.attributes
    }

    /// Attaches or replaces the attribute channel `name`.
    pub fn set_attribute(&mut self, name: &str, attr: Attribute) {
        let layout_changed = self
            .attributes
            .get(name)
            .is_none_or(|old| old.format != attr.format || old.step_mode != attr.step_mode);

        self.attributes.insert(name.to_string(), attr);

        if layout_changed {
            self.layout_version.changed();
        }
        if name == "position" {
            self.invalidate_bounds();
        }
        self.data_version.changed();
    }

    pub fn delete_attribute(&mut self, name: &str) -> Option<Attribute> {
        let removed = self.attributes.remove(name);
        if removed.is_some() {
            self.layout_version.changed();
            self.data_version.changed();
            if name == "position" {
                self.invalidate_bounds();
            }
        }
        removed
    }

    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Mutable access for in-place edits. Bounds are *not* invalidated here:
    /// callers that move positions must call the `compute_*` methods again.
    pub fn get_attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.data_version.changed();
        self.attributes.get_mut(name)
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Creates several attributes sharing one interleaved buffer.
    /// `layout` lists `(name, format, byte offset)`.
    pub fn set_interleaved_attributes(
        &mut self,
        interleaved_data: Vec<u8>,
        stride: u64,
        layout: &[(&str, VertexFormat, u64)],
    ) {
        let shared = Arc::new(interleaved_data);
        let count = (shared.len() as u64 / stride) as u32;
        let buffer_id = NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed);

        for &(name, format, offset) in layout {
            let attr = Attribute {
                buffer_id,
                data: Arc::clone(&shared),
                version: 1,
                update_ranges: Vec::new(),
                needs_full_upload: false,
                format,
                offset,
                stride,
                count,
                step_mode: VertexStepMode::Vertex,
                usage: BufferUsage::Static,
            };
            self.set_attribute(name, attr);
        }
    }

    /// Writes into an attribute and records the dirty sub-range for upload.
    pub fn update_attribute_region<T: bytemuck::Pod>(
        &mut self,
        name: &str,
        offset_bytes: u64,
        data: &[T],
    ) {
        if let Some(attr) = self.attributes.get_mut(name) {
            attr.update_region(offset_bytes, data);
            self.data_version.changed();
        }
    }

    /// Every channel the backend needs a buffer for: attributes, morph targets, index.
    pub fn buffer_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes
            .values()
            .chain(self.morph_attributes.values().flatten())
            .chain(self.index_attribute.iter())
    }

    /// Marks every pending sub-range as uploaded. Does not bump `data_version`.
    pub(crate) fn clear_update_ranges(&mut self) {
        for attr in self
            .attributes
            .values_mut()
            .chain(self.morph_attributes.values_mut().flatten())
            .chain(self.index_attribute.iter_mut())
        {
            attr.clear_update_ranges();
        }
    }

    // ------------------------------------------------------------------------
    // Morph targets
    // ------------------------------------------------------------------------

    pub fn add_morph_attribute(&mut self, name: &str, attr: Attribute) {
        self.morph_attributes
            .entry(name.to_string())
            .or_default()
            .push(attr);
        self.layout_version.changed();
        self.data_version.changed();
        if name == "position" {
            self.invalidate_bounds();
        }
    }

    #[must_use]
    pub fn morph_attributes(&self, name: &str) -> &[Attribute] {
        self.morph_attributes.get(name).map_or(&[], Vec::as_slice)
    }

    /// Whether morph targets store offsets instead of absolute values.
    #[must_use]
    pub fn morph_targets_relative(&self) -> bool {
        self.morph_targets_relative
    }

    /// Changes how morph targets are blended; this alters the shader variant.
    pub fn set_morph_targets_relative(&mut self, relative: bool) {
        if self.morph_targets_relative == relative {
            return;
        }
        self.morph_targets_relative = relative;
        self.layout_version.changed();
        self.invalidate_bounds();
    }

    #[must_use]
    pub fn morph_target_count(&self) -> usize {
        self.morph_attributes
            .values()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Index
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn index_attribute(&self) -> Option<&Attribute> {
        self.index_attribute.as_ref()
    }

    pub fn index_attribute_mut(&mut self) -> Option<&mut Attribute> {
        self.data_version.changed();
        self.index_attribute.as_mut()
    }

    /// Sets 16-bit indices. Values are not checked against the vertex count;
    /// use [`Geometry::validate`] for that.
    pub fn set_indices(&mut self, indices: &[u16]) {
        self.set_index_attribute(Attribute::new_planar(indices, VertexFormat::Uint16));
    }

    pub fn set_indices_u32(&mut self, indices: &[u32]) {
        self.set_index_attribute(Attribute::new_planar(indices, VertexFormat::Uint32));
    }

    fn set_index_attribute(&mut self, attr: Attribute) {
        let had_index = self.index_attribute.is_some();
        self.index_attribute = Some(attr);
        if !had_index {
            self.layout_version.changed();
        }
        self.data_version.changed();
    }

    pub fn clear_indices(&mut self) {
        if self.index_attribute.take().is_some() {
            self.layout_version.changed();
            self.data_version.changed();
        }
    }

    #[must_use]
    pub fn index_format(&self) -> Option<IndexFormat> {
        self.index_attribute.as_ref().map(|a| match a.format {
            VertexFormat::Uint32 => IndexFormat::Uint32,
            _ => IndexFormat::Uint16,
        })
    }

    /// Index values widened to `u32`.
    #[must_use]
    pub fn indices(&self) -> Option<Vec<u32>> {
        let index = self.index_attribute.as_ref()?;
        let bytes = index.data();
        let values = match index.format {
            VertexFormat::Uint32 => bytes
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<u32>)
                .collect(),
            _ => bytes
                .chunks_exact(2)
                .map(|c| u32::from(bytemuck::pod_read_unaligned::<u16>(c)))
                .collect(),
        };
        Some(values)
    }

    // ------------------------------------------------------------------------
    // Counts, groups and draw range
    // ------------------------------------------------------------------------

    /// Vertex count of the position channel (or of the first per-vertex channel).
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        if let Some(pos) = self.attributes.get("position") {
            return pos.count;
        }
        self.attributes
            .values()
            .find(|a| !a.is_instanced())
            .map_or(0, |a| a.count)
    }

    /// Smallest element count among per-instance channels, if any.
    #[must_use]
    pub fn instance_count(&self) -> Option<u32> {
        self.attributes
            .values()
            .filter(|a| a.is_instanced())
            .map(|a| a.count)
            .min()
    }

    /// Number of elements a full draw consumes (index count or vertex count).
    #[must_use]
    pub fn element_count(&self) -> u32 {
        self.index_attribute
            .as_ref()
            .map_or_else(|| self.vertex_count(), |i| i.count)
    }

    pub fn add_group(&mut self, start: u32, count: u32, material_index: usize) {
        self.groups.push(GeometryGroup {
            start,
            count,
            material_index,
        });
    }

    pub fn clear_groups(&mut self) {
        self.groups.clear();
    }

    /// Restricts subsequent draws to `count` elements starting at `start`.
    pub fn set_draw_range(&mut self, start: u32, count: u32) {
        self.draw_range = start..start.saturating_add(count);
    }

    // ------------------------------------------------------------------------
    // Bounding volumes
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn bounding_box(&self) -> Option<&BoundingBox> {
        self.bounding_box.as_ref()
    }

    #[must_use]
    pub fn bounding_sphere(&self) -> Option<&BoundingSphere> {
        self.bounding_sphere.as_ref()
    }

    fn invalidate_bounds(&mut self) {
        self.bounding_box = None;
        self.bounding_sphere = None;
    }

    /// Axis-aligned box of the position channel, unioned with morph position targets.
    pub fn compute_bounding_box(&mut self) -> BoundingBox {
        let bbox = self.position_bounds();
        self.bounding_box = Some(bbox);
        bbox
    }

    fn position_bounds(&self) -> BoundingBox {
        let Some(position) = self.attributes.get("position") else {
            return BoundingBox::EMPTY;
        };
        let mut bbox = BoundingBox::from_points(position.iter_vec3());

        for morph in self.morph_attributes("position") {
            let morph_box = BoundingBox::from_points(morph.iter_vec3());
            if morph_box.is_empty() {
                continue;
            }
            if self.morph_targets_relative {
                bbox.expand_by_point(bbox.min + morph_box.min);
                bbox.expand_by_point(bbox.max + morph_box.max);
            } else {
                bbox.expand_by_point(morph_box.min);
                bbox.expand_by_point(morph_box.max);
            }
        }
        bbox
    }

    /// Sphere centred on the box center whose radius reaches the farthest vertex.
    /// Not the minimal enclosing sphere, but it contains every vertex.
    pub fn compute_bounding_sphere(&mut self) -> BoundingSphere {
        let Some(position) = self.attributes.get("position") else {
            let sphere = BoundingSphere::default();
            self.bounding_sphere = Some(sphere);
            return sphere;
        };

        let center = {
            let bbox = self.position_bounds();
            if bbox.is_empty() {
                Vec3::ZERO
            } else {
                bbox.center()
            }
        };

        let mut max_dist_sq = position
            .iter_vec3()
            .map(|p| p.distance_squared(center))
            .fold(0.0_f32, f32::max);

        for morph in self.morph_attributes("position") {
            for j in 0..morph.count {
                let Some(mut p) = morph.read_vec3(j) else {
                    continue;
                };
                if self.morph_targets_relative
                    && let Some(base) = position.read_vec3(j)
                {
                    p += base;
                }
                max_dist_sq = max_dist_sq.max(p.distance_squared(center));
            }
        }

        let radius = max_dist_sq.sqrt();
        if radius.is_nan() {
            log::error!("Geometry {}: bounding sphere radius is NaN, position data contains NaN values", self.id);
        }

        let sphere = BoundingSphere { center, radius };
        self.bounding_sphere = Some(sphere);
        sphere
    }

    // ------------------------------------------------------------------------
    // Derived data
    // ------------------------------------------------------------------------

    /// Area-weighted vertex normals from the position channel.
    pub fn compute_vertex_normals(&mut self) {
        let Some(pos_attr) = self.attributes.get("position") else {
            return;
        };
        if pos_attr.format != VertexFormat::Float32x3 {
            return;
        }

        let pos_count = pos_attr.count as usize;
        let mut normals = vec![Vec3::ZERO; pos_count];

        let mut accumulate_triangle = |i0: usize, i1: usize, i2: usize| {
            if i0 >= pos_count || i1 >= pos_count || i2 >= pos_count {
                return;
            }
            let (Some(v0), Some(v1), Some(v2)) = (
                pos_attr.read_vec3(i0 as u32),
                pos_attr.read_vec3(i1 as u32),
                pos_attr.read_vec3(i2 as u32),
            ) else {
                return;
            };
            let face_normal = (v1 - v0).cross(v2 - v0);
            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        };

        if let Some(indices) = self.indices() {
            for chunk in indices.chunks_exact(3) {
                accumulate_triangle(chunk[0] as usize, chunk[1] as usize, chunk[2] as usize);
            }
        } else {
            for i in (0..pos_count.saturating_sub(2)).step_by(3) {
                accumulate_triangle(i, i + 1, i + 2);
            }
        }

        for n in &mut normals {
            *n = n.normalize_or_zero();
        }

        self.set_attribute(
            "normal",
            Attribute::new_planar(&normals, VertexFormat::Float32x3),
        );
    }

    /// Expands every per-vertex channel through the index list.
    ///
    /// Memory grows to one element per index. Per-instance channels are copied
    /// unchanged. Calling this on a non-indexed geometry logs a warning and
    /// returns a copy.
    #[must_use]
    pub fn to_non_indexed(&self) -> Geometry {
        let Some(indices) = self.indices() else {
            log::warn!(
                "Geometry {}: to_non_indexed() called on a non-indexed geometry",
                self.id
            );
            let mut copy = self.clone();
            copy.id = NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed);
            copy.uuid = Uuid::new_v4();
            return copy;
        };

        let mut out = Geometry::new();
        out.topology = self.topology;
        out.morph_targets_relative = self.morph_targets_relative;

        for (name, attr) in &self.attributes {
            let expanded = if attr.is_instanced() {
                attr.clone()
            } else {
                attr.expand(&indices)
            };
            out.set_attribute(name, expanded);
        }

        for (name, targets) in &self.morph_attributes {
            for target in targets {
                out.add_morph_attribute(name, target.expand(&indices));
            }
        }

        out.groups.clone_from(&self.groups);
        out
    }

    /// Checks the invariants the geometry does not enforce on mutation:
    /// per-vertex channels agree on vertex count and every index is in range.
    pub fn validate(&self) -> Result<()> {
        let vertex_count = self.vertex_count();

        for (name, attr) in &self.attributes {
            if !attr.is_instanced() && attr.count != vertex_count {
                return Err(StrataError::InvalidGeometry(format!(
                    "attribute '{name}' has {} elements, expected {vertex_count}",
                    attr.count
                )));
            }
        }

        if let Some(indices) = self.indices()
            && let Some((pos, &bad)) = indices
                .iter()
                .enumerate()
                .find(|&(_, &idx)| idx >= vertex_count)
        {
            return Err(StrataError::InvalidGeometry(format!(
                "index {bad} at position {pos} is out of range for {vertex_count} vertices"
            )));
        }

        Ok(())
    }

    /// Defines contributed by the attribute layout, cached per `layout_version`.
    pub fn shader_defines(&self) -> ShaderDefines {
        {
            let cache = self.cached_shader_defines.borrow();
            if let Some((cached_version, cached_defines)) = cache.as_ref()
                && *cached_version == self.layout_version.version()
            {
                return cached_defines.clone();
            }
        }

        let mut defines = ShaderDefines::new();
        defines.toggle("USE_UV", self.has_attribute("uv"));
        defines.toggle("USE_NORMAL", self.has_attribute("normal"));
        defines.toggle("USE_TANGENT", self.has_attribute("tangent"));
        defines.toggle(
            "USE_INSTANCING",
            self.attributes.values().any(Attribute::is_instanced),
        );

        let morph_count = self.morph_target_count();
        if morph_count > 0 {
            defines.toggle("USE_MORPH_TARGETS", !self.morph_attributes("position").is_empty());
            defines.toggle("USE_MORPH_NORMALS", !self.morph_attributes("normal").is_empty());
            defines.set_count("MORPH_TARGETS_COUNT", morph_count);
            defines.toggle("MORPH_TARGETS_RELATIVE", self.morph_targets_relative);
        }

        *self.cached_shader_defines.borrow_mut() = Some((self.layout_version.version(), defines.clone()));
        defines
    }

    // ------------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn new_box(width: f32, height: f32, depth: f32) -> Self {
        primitives::create_box(width, height, depth)
    }

    #[must_use]
    pub fn new_plane(width: f32, height: f32) -> Self {
        primitives::create_plane(primitives::PlaneOptions {
            width,
            height,
            ..Default::default()
        })
    }
}
