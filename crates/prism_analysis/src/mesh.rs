use prism_core::{Handle, Mesh, Result, Scene};
use rayon::prelude::*;

use crate::Analyzer;

/// Boxes with a smaller volume are treated as flat.
const MIN_VOLUME: f32 = 1e-12;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MeshIssues: u8 {
        const NONE               = 0;
        const EMPTY              = 1 << 0;
        const UNMAPPED           = 1 << 1;
        const TRUNCATED_INDICES  = 1 << 2;
        const INDEX_OUT_OF_RANGE = 1 << 3;
        const DEGENERATE_BOUNDS  = 1 << 4;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshMetrics {
    pub id: Handle<Mesh>,
    pub name: String,
    pub polygon_count: usize,
    pub vertex_count: usize,
    /// Vertices per unit of bounding-box volume; 0 for empty or flat meshes.
    pub vertex_density: f32,
    /// Fraction of vertices with a matching UV entry.
    pub uv_coverage: f32,
    pub issues: MeshIssues,
}

impl MeshMetrics {
    pub fn measure(mesh: &Mesh) -> Self {
        let polygon_count = mesh.polygon_count();
        let vertex_count = mesh.vertex_count();
        let volume = mesh.bounds.volume();

        let mut issues = MeshIssues::NONE;
        if polygon_count == 0 {
            issues |= MeshIssues::EMPTY;
        }
        if !mesh.is_fully_mapped() {
            issues |= MeshIssues::UNMAPPED;
        }
        if mesh.indices.len() % 3 != 0 {
            issues |= MeshIssues::TRUNCATED_INDICES;
        }
        if mesh.has_out_of_range_indices() {
            issues |= MeshIssues::INDEX_OUT_OF_RANGE;
        }
        if volume <= MIN_VOLUME {
            issues |= MeshIssues::DEGENERATE_BOUNDS;
        }

        let vertex_density = if polygon_count == 0 || volume <= MIN_VOLUME {
            0.0
        } else {
            vertex_count as f32 / volume
        };
        let uv_coverage = if vertex_count == 0 {
            0.0
        } else {
            mesh.uvs.len().min(vertex_count) as f32 / vertex_count as f32
        };

        Self {
            id: mesh.id,
            name: mesh.name.clone(),
            polygon_count,
            vertex_count,
            vertex_density,
            uv_coverage,
            issues,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshReport {
    pub meshes: Vec<MeshMetrics>,
    pub total_polygons: usize,
    pub total_vertices: usize,
    pub unmapped_meshes: usize,
    pub empty_meshes: usize,
    pub average_density: f32,
}

impl MeshReport {
    pub fn metrics(&self, id: &Handle<Mesh>) -> Option<&MeshMetrics> {
        self.meshes.iter().find(|m| m.id == *id)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MeshAnalyzer;

impl Analyzer for MeshAnalyzer {
    type Report = MeshReport;

    fn analyze(&self, scene: &Scene) -> Result<MeshReport> {
        scene.validate()?;

        let meshes: Vec<MeshMetrics> = scene.meshes().par_iter().map(MeshMetrics::measure).collect();

        let mut report = MeshReport::default();
        for m in &meshes {
            report.total_polygons += m.polygon_count;
            report.total_vertices += m.vertex_count;
            if m.issues.contains(MeshIssues::UNMAPPED) {
                report.unmapped_meshes += 1;
            }
            if m.issues.contains(MeshIssues::EMPTY) {
                report.empty_meshes += 1;
            }
        }
        if !meshes.is_empty() {
            report.average_density =
                meshes.iter().map(|m| m.vertex_density).sum::<f32>() / meshes.len() as f32;
        }
        report.meshes = meshes;

        log::debug!(
            "Meshes of '{}': {} polygons, {} unmapped, {} empty",
            scene.name,
            report.total_polygons,
            report.unmapped_meshes,
            report.empty_meshes
        );
        Ok(report)
    }
}
