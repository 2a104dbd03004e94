use std::path::{Path, PathBuf};

use async_trait::async_trait;
use prism_core::{Error, Result, Scene};

use crate::{SceneFormat, SceneIo};

mod image_probe;
mod json_parser;
mod obj_parser;

/// Reads and writes scene files. Parsing runs on tokio's blocking pool so
/// callers on the async side never stall the reactor.
#[derive(Clone, Debug, Default)]
pub struct AssetServer;

impl AssetServer {
    pub fn new() -> Self {
        Self
    }

    pub fn load_scene(&self, path: &Path) -> Result<Scene> {
        if !path.is_file() {
            return Err(Error::not_found(path));
        }
        let mut scene = match SceneFormat::from_path(path)? {
            SceneFormat::Json => json_parser::parse_scene(path)?,
            SceneFormat::Obj => obj_parser::parse_obj(path)?,
        };

        let base = path.parent().unwrap_or(Path::new("."));
        image_probe::probe_textures(&mut scene, base);

        log::info!(
            "Loaded '{}' from {}: {} nodes, {} meshes, {} materials",
            scene.name,
            path.display(),
            scene.node_count(),
            scene.meshes().len(),
            scene.materials().len()
        );
        Ok(scene)
    }

    /// Validates `scene`, creates missing parent directories and writes it
    /// in the format named by the extension.
    pub fn save_scene(&self, path: &Path, scene: &Scene) -> Result<()> {
        scene.validate()?;
        let format = SceneFormat::from_path(path)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        match format {
            SceneFormat::Json => json_parser::write_scene(path, scene)?,
            SceneFormat::Obj => obj_parser::write_obj(path, scene)?,
        }
        log::info!("Saved '{}' to {}", scene.name, path.display());
        Ok(())
    }
}

#[async_trait]
impl SceneIo for AssetServer {
    async fn import(&self, path: &Path) -> Result<Scene> {
        let server = self.clone();
        let path: PathBuf = path.to_owned();
        tokio::task::spawn_blocking(move || server.load_scene(&path))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    async fn export(&self, path: &Path, scene: &Scene) -> Result<()> {
        let server = self.clone();
        let path: PathBuf = path.to_owned();
        let scene = scene.clone();
        tokio::task::spawn_blocking(move || server.save_scene(&path, &scene))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec2, Vec3};
    use prism_core::{Material, Mesh, Node, PropertyValue, material::BASE_COLOR};
    use tempfile::tempdir;

    fn sample() -> Scene {
        let mut scene = Scene::new("sample");
        let paint = scene.add_material(
            Material::new("paint", "pbr").with_property(BASE_COLOR, PropertyValue::Color([0.2, 0.4, 0.6, 1.0])),
        );
        let quad = scene.add_mesh(Mesh::new(
            "quad",
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y],
            vec![0, 1, 2, 0, 2, 3],
        ));
        scene.root_mut().children.push(
            Node::new("floor")
                .with_mesh(quad)
                .with_material(paint)
                .with_child(Node::new("marker")),
        );
        scene.root_mut().children.push(
            Node::new("wall")
                .with_transform(Mat4::from_translation(Vec3::Z * 3.0))
                .with_mesh(quad)
                .with_material(paint),
        );
        scene
    }

    fn names(scene: &Scene) -> Vec<String> {
        let mut names = Vec::new();
        scene.root().walk(0, &mut |node, _| names.push(node.name.clone()));
        names
    }

    #[test]
    fn json_round_trip_keeps_structure_and_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out/sample.scene");
        let server = AssetServer::new();
        let scene = sample();

        server.save_scene(&path, &scene).unwrap();
        let loaded = server.load_scene(&path).unwrap();

        assert_eq!(loaded.node_count(), scene.node_count());
        assert_eq!(names(&loaded), names(&scene));
        assert_eq!(loaded.meshes()[0].id, scene.meshes()[0].id);
        assert_eq!(loaded.materials()[0].id, scene.materials()[0].id);
        assert_eq!(loaded, scene);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = AssetServer::new()
            .load_scene(&dir.path().join("absent.scene"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.scene");
        std::fs::write(&path, "{ \"name\": \"broken\", \"root\": ").unwrap();
        let err = AssetServer::new().load_scene(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scene.fbx");
        std::fs::write(&path, "binary").unwrap();
        let err = AssetServer::new().load_scene(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn obj_round_trip_keeps_geometry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.obj");
        let server = AssetServer::new();
        let scene = sample();

        server.save_scene(&path, &scene).unwrap();
        assert!(dir.path().join("sample.mtl").is_file());

        let loaded = server.load_scene(&path).unwrap();
        let polygons: usize = loaded.meshes().iter().map(Mesh::polygon_count).sum();
        assert_eq!(polygons, 4);
        assert!(loaded.find_node("floor").is_some());
        assert!(loaded.find_node("wall").is_some());

        let wall = loaded.find_node("wall").unwrap();
        let mesh = loaded.mesh(&wall.mesh.unwrap()).unwrap();
        assert!(mesh.vertices.iter().all(|v| (v.z - 3.0).abs() < 1e-5));

        let material = loaded.material(&wall.material.unwrap()).unwrap();
        assert_eq!(material.name, "paint");
        match &material.properties[BASE_COLOR] {
            PropertyValue::Color(c) => assert!((c[1] - 0.4).abs() < 1e-5),
            other => panic!("unexpected base color {other:?}"),
        }
    }

    #[tokio::test]
    async fn async_import_matches_blocking_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.json");
        let server = AssetServer::new();
        server.export(&path, &sample()).await.unwrap();

        let imported = server.import(&path).await.unwrap();
        assert_eq!(imported, server.load_scene(&path).unwrap());
    }
}
