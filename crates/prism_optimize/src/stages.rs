use std::collections::HashSet;

use prism_core::{Handle, Material, Mesh, Node, OptimizationProfile, Result, Scene, Stage};

use crate::OptimizationAction;

pub mod flattening;
pub mod instancing;
pub mod mesh_material;
pub mod transforms;

/// Records what a stage changed, in the order it happened.
pub struct ActionLog {
    stage: Stage,
    actions: Vec<OptimizationAction>,
}

impl ActionLog {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            actions: Vec::new(),
        }
    }

    pub fn record(&mut self, description: impl Into<String>) {
        let description = description.into();
        log::debug!("[{}] {}", self.stage, description);
        self.actions.push(OptimizationAction {
            stage: self.stage,
            description,
        });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn into_actions(self) -> Vec<OptimizationAction> {
        self.actions
    }
}

/// Runs one stage against `scene`, producing a new scene.
pub fn run(stage: Stage, scene: &Scene, profile: &OptimizationProfile, log: &mut ActionLog) -> Result<Scene> {
    match stage {
        Stage::Instancing => instancing::run(scene, profile, log),
        Stage::Flattening => flattening::run(scene, profile, log),
        Stage::TransformOptimization => transforms::run(scene, profile, log),
        Stage::MeshMaterial => mesh_material::run(scene, profile, log),
    }
}

/// Names other nodes point at through `instance_of`.
pub(crate) fn instance_sources(root: &Node) -> HashSet<String> {
    let mut sources = HashSet::new();
    root.walk(0, &mut |node, _| {
        if let Some(source) = &node.instance_of {
            sources.insert(source.clone());
        }
    });
    sources
}

/// Drops the `released` catalog entries that no node references any more.
/// Entries a stage never touched stay, referenced or not. Returns
/// (meshes, materials) removed.
pub(crate) fn prune_released(
    scene: &mut Scene,
    released_meshes: &HashSet<Handle<Mesh>>,
    released_materials: &HashSet<Handle<Material>>,
) -> (usize, usize) {
    let mut meshes = HashSet::new();
    let mut materials = HashSet::new();
    scene.root().walk(0, &mut |node, _| {
        meshes.extend(node.mesh);
        materials.extend(node.material);
    });

    let mesh_count = scene.meshes().len();
    let material_count = scene.materials().len();
    scene
        .meshes_mut()
        .retain(|m| !released_meshes.contains(&m.id) || meshes.contains(&m.id));
    scene
        .materials_mut()
        .retain(|m| !released_materials.contains(&m.id) || materials.contains(&m.id));
    (
        mesh_count - scene.meshes().len(),
        material_count - scene.materials().len(),
    )
}
