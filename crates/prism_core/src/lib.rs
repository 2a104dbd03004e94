use std::fmt;

use serde::{Deserialize, Serialize};

pub use rayon;
pub use tokio;

pub mod assets;
pub mod error;
pub mod material;
pub mod mesh;
pub mod profile;
pub mod runtime;
pub mod scene;
pub mod statistics;
pub mod transform;

pub use assets::Handle;
pub use error::{Error, Result};
pub use material::{Material, PropertyValue, Texture, TextureCompression, TextureFormat};
pub use mesh::{Aabb, Mesh};
pub use profile::{OptimizationProfile, ProfilePreset};
pub use scene::{Node, NodeKind, Scene};
pub use statistics::Statistics;

/// Passes of a scene optimization run, in execution order.
/// A stage may be skipped, never reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Instancing,
    Flattening,
    TransformOptimization,
    MeshMaterial,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Instancing,
        Stage::Flattening,
        Stage::TransformOptimization,
        Stage::MeshMaterial,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Instancing => "instancing",
            Stage::Flattening => "flattening",
            Stage::TransformOptimization => "transform optimization",
            Stage::MeshMaterial => "mesh/material optimization",
        };
        f.write_str(name)
    }
}
