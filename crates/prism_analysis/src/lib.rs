use prism_core::{OptimizationProfile, Result, Scene};

pub mod hierarchy;
pub mod material;
pub mod mesh;

pub use hierarchy::{HierarchyAnalyzer, HierarchyReport};
pub use material::{MaterialAnalyzer, MaterialReport, MaterialThresholds};
pub use mesh::{MeshAnalyzer, MeshIssues, MeshMetrics, MeshReport};

/// A read-only pass over a scene. Either the whole report or an error,
/// never a partially filled report.
pub trait Analyzer {
    type Report;

    fn analyze(&self, scene: &Scene) -> Result<Self::Report>;
}

#[derive(Debug, Clone)]
pub struct SceneAnalysis {
    pub hierarchy: HierarchyReport,
    pub meshes: MeshReport,
    pub materials: MaterialReport,
}

/// Runs all three analyzers with thresholds taken from `profile`.
pub fn analyze_scene(scene: &Scene, profile: &OptimizationProfile) -> Result<SceneAnalysis> {
    Ok(SceneAnalysis {
        hierarchy: HierarchyAnalyzer.analyze(scene)?,
        meshes: MeshAnalyzer.analyze(scene)?,
        materials: MaterialAnalyzer::new(MaterialThresholds::from_profile(profile)).analyze(scene)?,
    })
}
