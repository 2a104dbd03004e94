use std::collections::BTreeMap;

use serde::Serialize;

use crate::scene::Scene;

/// Rough per-node cost in memory (name, matrix, handles, child vec).
const NODE_MEMORY_BYTES: u64 = 128;
/// Rough per-node cost in a serialized scene document.
const NODE_FILE_BYTES: u64 = 96;
/// Encoded images are assumed to shrink to a quarter of their raw size.
const TEXTURE_FILE_RATIO: u64 = 4;

/// Derived snapshot of a scene. Never the source of truth.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_nodes: usize,
    pub total_instances: usize,
    pub total_polygons: usize,
    pub total_vertices: usize,
    pub total_materials: usize,
    pub total_textures: usize,
    pub estimated_memory_bytes: u64,
    pub estimated_file_size_bytes: u64,
    pub node_types: BTreeMap<String, usize>,
}

impl Statistics {
    pub fn compute(scene: &Scene) -> Self {
        let mut stats = Statistics::default();

        scene.root().walk(0, &mut |node, _| {
            stats.total_nodes += 1;
            if node.is_instance() {
                stats.total_instances += 1;
            }
            *stats
                .node_types
                .entry(node.kind().label().to_string())
                .or_insert(0) += 1;
        });

        let mut geometry_bytes = 0u64;
        for mesh in scene.meshes() {
            stats.total_polygons += mesh.polygon_count();
            stats.total_vertices += mesh.vertex_count();
            geometry_bytes += mesh.memory_bytes() as u64;
        }

        let mut texture_bytes = 0u64;
        stats.total_materials = scene.materials().len();
        for material in scene.materials() {
            stats.total_textures += material.textures.len();
            texture_bytes += material.texture_memory_bytes();
        }

        let nodes = stats.total_nodes as u64;
        stats.estimated_memory_bytes = geometry_bytes + texture_bytes + nodes * NODE_MEMORY_BYTES;
        stats.estimated_file_size_bytes =
            geometry_bytes + texture_bytes / TEXTURE_FILE_RATIO + nodes * NODE_FILE_BYTES;
        stats
    }
}
