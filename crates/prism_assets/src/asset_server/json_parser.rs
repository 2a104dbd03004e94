use std::{fs::File, io::BufWriter, path::Path};

use prism_core::{Aabb, Error, Result, Scene};

pub fn parse_scene(path: &Path) -> Result<Scene> {
    let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::not_found(path),
        _ => Error::Io(e),
    })?;
    let mut scene: Scene =
        serde_json::from_str(&contents).map_err(|e| Error::parse(path, e.to_string()))?;

    // Hand-written documents may leave bounds out.
    for mesh in scene.meshes_mut() {
        if mesh.bounds == Aabb::default() && !mesh.vertices.is_empty() {
            mesh.recompute_bounds();
        }
    }

    scene
        .validate()
        .map_err(|e| Error::parse(path, e.to_string()))?;
    Ok(scene)
}

pub fn write_scene(path: &Path, scene: &Scene) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, scene).map_err(|e| Error::Io(e.into()))?;
    Ok(())
}
