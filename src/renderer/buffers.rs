//! Attribute Buffer Uploads
//!
//! Maps CPU attribute channels to backend buffers. Channels are keyed by their
//! `buffer_id`, so interleaved siblings and geometry clones share one GPU
//! buffer. A buffer is deleted when the last geometry using it is disposed.
//!
//! Uploads are incremental: a changed attribute with recorded dirty
//! sub-ranges only uploads those ranges, unless its data was replaced since
//! the last upload; a resized one is reallocated.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::assets::GeometryHandle;
use crate::renderer::backend::{Backend, BufferId, BufferKind};
use crate::resources::{Attribute, Geometry};

#[derive(Debug, Clone, Copy)]
struct GpuBuffer {
    id: BufferId,
    version: u64,
    size: usize,
    users: u32,
}

#[derive(Debug, Default)]
struct GeometryRecord {
    data_version: Option<u64>,
    buffers: SmallVec<[u64; 8]>,
}

/// Outcome of preparing one geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub created: u32,
    pub reallocated: u32,
    pub bytes: u64,
}

impl UploadStats {
    /// True if any buffer id changed, which invalidates attribute bindings.
    #[must_use]
    pub fn buffers_changed(&self) -> bool {
        self.created > 0 || self.reallocated > 0
    }
}

#[derive(Debug, Default)]
pub struct BufferManager {
    buffers: FxHashMap<u64, GpuBuffer>,
    geometries: FxHashMap<GeometryHandle, GeometryRecord>,
}

impl BufferManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings the backend buffers of `geometry` up to date.
    pub fn prepare(
        &mut self,
        backend: &mut dyn Backend,
        handle: GeometryHandle,
        geometry: &mut Geometry,
    ) -> UploadStats {
        let record = self.geometries.entry(handle).or_default();
        if record.data_version == Some(geometry.data_version()) {
            return UploadStats::default();
        }

        let mut stats = UploadStats::default();
        let mut seen: SmallVec<[u64; 8]> = SmallVec::new();
        let is_index = |attr: &Attribute, geometry: &Geometry| {
            geometry
                .index_attribute()
                .is_some_and(|i| i.buffer_id() == attr.buffer_id())
        };

        for attr in geometry.buffer_attributes() {
            let key = attr.buffer_id();
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);

            let kind = if is_index(attr, geometry) {
                BufferKind::Index
            } else {
                BufferKind::Vertex
            };
            let newly_used = !record.buffers.contains(&key);
            Self::sync_buffer(&mut self.buffers, backend, attr, kind, newly_used, &mut stats);
        }

        // channels that were replaced or deleted since the last prepare
        let stale: SmallVec<[u64; 8]> = record
            .buffers
            .iter()
            .copied()
            .filter(|k| !seen.contains(k))
            .collect();
        for key in stale {
            Self::release_buffer(&mut self.buffers, backend, key);
        }

        record.buffers = seen;
        record.data_version = Some(geometry.data_version());
        geometry.clear_update_ranges();

        if stats.buffers_changed() {
            log::trace!(
                "Geometry {} buffers: {} created, {} reallocated, {} bytes",
                geometry.id(),
                stats.created,
                stats.reallocated,
                stats.bytes
            );
        }
        stats
    }

    fn sync_buffer(
        buffers: &mut FxHashMap<u64, GpuBuffer>,
        backend: &mut dyn Backend,
        attr: &Attribute,
        kind: BufferKind,
        newly_used: bool,
        stats: &mut UploadStats,
    ) {
        let data = attr.data();
        match buffers.get_mut(&attr.buffer_id()) {
            None => {
                let id = backend.create_buffer(kind, data, attr.usage);
                buffers.insert(
                    attr.buffer_id(),
                    GpuBuffer {
                        id,
                        version: attr.version(),
                        size: data.len(),
                        users: 1,
                    },
                );
                stats.created += 1;
                stats.bytes += data.len() as u64;
            }
            Some(gpu) => {
                if newly_used {
                    gpu.users += 1;
                }
                if gpu.version == attr.version() {
                    return;
                }

                if gpu.size != data.len() {
                    backend.delete_buffer(gpu.id);
                    gpu.id = backend.create_buffer(kind, data, attr.usage);
                    gpu.size = data.len();
                    stats.reallocated += 1;
                    stats.bytes += data.len() as u64;
                } else if attr.needs_full_upload() || attr.update_ranges().is_empty() {
                    backend.update_buffer(gpu.id, 0, data);
                    stats.bytes += data.len() as u64;
                } else {
                    for range in attr.update_ranges() {
                        let bytes = &data[range.start as usize..range.end as usize];
                        backend.update_buffer(gpu.id, range.start, bytes);
                        stats.bytes += bytes.len() as u64;
                    }
                }
                gpu.version = attr.version();
            }
        }
    }

    fn release_buffer(buffers: &mut FxHashMap<u64, GpuBuffer>, backend: &mut dyn Backend, key: u64) -> Option<BufferId> {
        let gpu = buffers.get_mut(&key)?;
        gpu.users = gpu.users.saturating_sub(1);
        if gpu.users > 0 {
            return None;
        }
        let id = gpu.id;
        backend.delete_buffer(id);
        buffers.remove(&key);
        Some(id)
    }

    /// Backend buffer currently holding `attr`.
    #[must_use]
    pub fn buffer_for(&self, attr: &Attribute) -> Option<BufferId> {
        self.buffers.get(&attr.buffer_id()).map(|b| b.id)
    }

    /// Releases the buffers of a disposed geometry. Returns the deleted backend ids.
    pub fn dispose(&mut self, backend: &mut dyn Backend, handle: GeometryHandle) -> Vec<BufferId> {
        let Some(record) = self.geometries.remove(&handle) else {
            return Vec::new();
        };
        record
            .buffers
            .into_iter()
            .filter_map(|key| Self::release_buffer(&mut self.buffers, backend, key))
            .collect()
    }

    pub fn dispose_all(&mut self, backend: &mut dyn Backend) {
        for (_, gpu) in self.buffers.drain() {
            backend.delete_buffer(gpu.id);
        }
        self.geometries.clear();
    }

    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}
