use std::fmt;

use prism_core::{Error, OptimizationProfile, Result, Scene, Stage, Statistics};

pub mod material;
pub mod mesh;
pub mod stages;

pub use material::{
    MaterialMerge, batch_materials, compress_textures, merge_similar_materials, optimize_shader,
};
pub use mesh::{generate_lods, merge_meshes, optimize_vertices, simplify};

use crate::stages::ActionLog;

/// One change a stage made, for the run report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimizationAction {
    pub stage: Stage,
    pub description: String,
}

impl fmt::Display for OptimizationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.description)
    }
}

/// Result of a full run.
#[derive(Clone, Debug)]
pub struct OptimizedScene {
    pub scene: Scene,
    pub actions: Vec<OptimizationAction>,
    pub completed_stages: Vec<Stage>,
    /// Recomputed after the last stage.
    pub statistics: Statistics,
}

/// A stage returned an error. `scene` is the output of the last stage that
/// succeeded (or the input, if the first stage failed).
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: Error,
    pub scene: Box<Scene>,
    pub completed_stages: Vec<Stage>,
    pub actions: Vec<OptimizationAction>,
}

/// Runs the optimization stages in their fixed order. Each stage reads the
/// previous stage's scene and produces a new one; the input is never
/// mutated.
pub struct SceneOptimizer {
    profile: OptimizationProfile,
}

impl SceneOptimizer {
    pub fn new(profile: OptimizationProfile) -> Result<Self> {
        profile.validate()?;
        Ok(Self { profile })
    }

    pub fn profile(&self) -> &OptimizationProfile {
        &self.profile
    }

    /// Runs a single stage, regardless of `skipStages`.
    pub fn run_stage(&self, stage: Stage, scene: &Scene) -> Result<(Scene, Vec<OptimizationAction>)> {
        let mut log = ActionLog::new(stage);
        let out = stages::run(stage, scene, &self.profile, &mut log)?;
        Ok((out, log.into_actions()))
    }

    pub fn optimize(&self, scene: Scene) -> std::result::Result<OptimizedScene, StageFailure> {
        let mut current = scene;
        let mut actions = Vec::new();
        let mut completed_stages = Vec::new();

        for stage in Stage::ALL {
            if !self.profile.is_stage_enabled(stage) {
                log::info!("Skipping {stage} stage for '{}'", current.name);
                continue;
            }

            log::debug!("Running {stage} stage on '{}'", current.name);
            match self.run_stage(stage, &current) {
                Ok((next, mut stage_actions)) => {
                    log::info!(
                        "{stage} stage on '{}': {} changes",
                        current.name,
                        stage_actions.len()
                    );
                    current = next;
                    actions.append(&mut stage_actions);
                    completed_stages.push(stage);
                }
                Err(source) => {
                    log::error!("{stage} stage failed on '{}': {source}", current.name);
                    current.refresh_statistics();
                    return Err(StageFailure {
                        stage,
                        source,
                        scene: Box::new(current),
                        completed_stages,
                        actions,
                    });
                }
            }
        }

        let statistics = current.refresh_statistics().clone();
        Ok(OptimizedScene {
            scene: current,
            actions,
            completed_stages,
            statistics,
        })
    }
}
