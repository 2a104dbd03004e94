use std::path::Path;

use async_trait::async_trait;
use prism_core::{Error, Result, Scene};

pub mod asset_server;

pub use asset_server::AssetServer;

/// Async boundary between scene files and the optimizer.
#[async_trait]
pub trait SceneIo: Send + Sync {
    async fn import(&self, path: &Path) -> Result<Scene>;
    async fn export(&self, path: &Path, scene: &Scene) -> Result<()>;
}

/// On-disk scene formats, picked by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneFormat {
    /// Native document: `.scene` or `.json`.
    Json,
    /// Wavefront OBJ with an optional `.mtl` library.
    Obj,
}

impl SceneFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "scene" | "json" => Ok(SceneFormat::Json),
            "obj" => Ok(SceneFormat::Obj),
            _ => Err(Error::unsupported_format(extension)),
        }
    }
}
