use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use glam::{Mat4, Vec2, Vec3};
use prism_core::{
    Error, Handle, Material, Mesh, Node, PropertyValue, Result, Scene, Texture, TextureFormat,
    material::{BASE_COLOR, BASE_COLOR_TEXTURE},
};

const OBJ_SHADER: &str = "phong";
const BASE_COLOR_SLOT: &str = "base_color";
const NORMAL_SLOT: &str = "normal";

/// One node per OBJ object, all directly under the root.
pub fn parse_obj(path: &Path) -> Result<Scene> {
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        },
    )
    .map_err(|e| Error::parse(path, e.to_string()))?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scene")
        .to_owned();
    let mut scene = Scene::new(name);

    let materials = materials.unwrap_or_else(|e| {
        log::warn!("Material library for {} not loaded: {}", path.display(), e);
        Vec::new()
    });
    let material_handles: Vec<Handle<Material>> = materials
        .iter()
        .map(|m| scene.add_material(convert_material(m)))
        .collect();

    for (i, model) in models.iter().enumerate() {
        let mesh = &model.mesh;
        let vertices: Vec<Vec3> = mesh
            .positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
            .collect();
        let uvs: Vec<Vec2> = mesh
            .texcoords
            .chunks_exact(2)
            .map(|t| Vec2::new(t[0], t[1]))
            .collect();

        let node_name = if model.name.is_empty() {
            format!("object{i}")
        } else {
            model.name.clone()
        };
        let handle = scene.add_mesh(Mesh::new(node_name.clone(), vertices, uvs, mesh.indices.clone()));

        let mut node = Node::new(node_name).with_mesh(handle);
        node.material = mesh
            .material_id
            .and_then(|id| material_handles.get(id).copied());
        scene.root_mut().children.push(node);
    }

    Ok(scene)
}

fn convert_material(source: &tobj::Material) -> Material {
    let mut material = Material::new(source.name.clone(), OBJ_SHADER);
    let opacity = source.dissolve.unwrap_or(1.0);

    if let Some([r, g, b]) = source.diffuse {
        material
            .properties
            .insert(BASE_COLOR.into(), PropertyValue::Color([r, g, b, opacity]));
    }
    if let Some([r, g, b]) = source.specular {
        material
            .properties
            .insert("specular".into(), PropertyValue::Color([r, g, b, 1.0]));
    }
    if let Some(shininess) = source.shininess {
        material
            .properties
            .insert("shininess".into(), PropertyValue::Number(shininess));
    }
    if let Some(dissolve) = source.dissolve {
        material
            .properties
            .insert("opacity".into(), PropertyValue::Number(dissolve));
    }

    let maps = [
        (&source.diffuse_texture, BASE_COLOR_SLOT, BASE_COLOR_TEXTURE),
        (&source.normal_texture, NORMAL_SLOT, "normal_texture"),
    ];
    for (file, slot, property) in maps {
        let Some(file) = file else {
            continue;
        };
        let stem = Path::new(file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file);
        // Size is unknown until the image header is probed.
        let mut texture = Texture::new(stem, 0, 0, TextureFormat::Rgba8);
        texture.source = Some(file.clone());
        material.textures.insert(slot.into(), texture);
        material
            .properties
            .insert(property.into(), PropertyValue::Texture(slot.into()));
    }
    material
}

/// Writes `path` and a sibling `.mtl`. Hierarchy is not representable in
/// OBJ, so world transforms are baked into positions.
pub fn write_obj(path: &Path, scene: &Scene) -> Result<()> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::invalid_argument(format!("{} has no file name", path.display())))?;
    let library = format!("{stem}.mtl");

    let mut objects = Vec::new();
    scene.root().walk_world(Mat4::IDENTITY, &mut |node, world| {
        if let Some(mesh) = node.mesh.and_then(|h| scene.mesh(&h)) {
            let material = node.material.and_then(|h| scene.material(&h));
            objects.push((node.name.as_str(), world, mesh, material));
        }
    });

    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "# {}", scene.name)?;
    writeln!(out, "mtllib {library}")?;

    let mut position_base = 1;
    let mut uv_base = 1;
    for (name, world, mesh, material) in objects {
        writeln!(out, "o {name}")?;
        for v in &mesh.vertices {
            let p = world.transform_point3(*v);
            writeln!(out, "v {} {} {}", p.x, p.y, p.z)?;
        }
        let mapped = mesh.is_fully_mapped() && !mesh.uvs.is_empty();
        if mapped {
            for uv in &mesh.uvs {
                writeln!(out, "vt {} {}", uv.x, uv.y)?;
            }
        }
        if let Some(material) = material {
            writeln!(out, "usemtl {}", material.name)?;
        }
        for [a, b, c] in mesh.triangles() {
            if mapped {
                writeln!(
                    out,
                    "f {}/{} {}/{} {}/{}",
                    a + position_base,
                    a + uv_base,
                    b + position_base,
                    b + uv_base,
                    c + position_base,
                    c + uv_base
                )?;
            } else {
                writeln!(
                    out,
                    "f {} {} {}",
                    a + position_base,
                    b + position_base,
                    c + position_base
                )?;
            }
        }
        position_base += mesh.vertex_count() as u32;
        if mapped {
            uv_base += mesh.uvs.len() as u32;
        }
    }
    out.flush()?;

    write_mtl(&path.with_file_name(library), scene)
}

fn write_mtl(path: &Path, scene: &Scene) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for material in scene.materials() {
        writeln!(out, "newmtl {}", material.name)?;
        for (key, value) in &material.properties {
            match (key.as_str(), value) {
                (BASE_COLOR, PropertyValue::Color([r, g, b, a])) => {
                    writeln!(out, "Kd {r} {g} {b}")?;
                    if !material.properties.contains_key("opacity") {
                        writeln!(out, "d {a}")?;
                    }
                }
                ("specular", PropertyValue::Color([r, g, b, _])) => writeln!(out, "Ks {r} {g} {b}")?,
                ("shininess", PropertyValue::Number(n)) => writeln!(out, "Ns {n}")?,
                ("opacity", PropertyValue::Number(n)) => writeln!(out, "d {n}")?,
                (BASE_COLOR_TEXTURE, PropertyValue::Texture(slot)) => {
                    if let Some(texture) = material.textures.get(slot) {
                        writeln!(out, "map_Kd {}", texture_file(texture))?;
                    }
                }
                ("normal_texture", PropertyValue::Texture(slot)) => {
                    if let Some(texture) = material.textures.get(slot) {
                        writeln!(out, "norm {}", texture_file(texture))?;
                    }
                }
                _ => log::trace!("'{}' property '{}' has no MTL equivalent", material.name, key),
            }
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn texture_file(texture: &Texture) -> &str {
    texture.source.as_deref().unwrap_or(&texture.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mtl_properties_are_imported() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("box.mtl"),
            "newmtl crate\nKd 0.5 0.25 1\nNs 32\nd 0.8\nmap_Kd textures/crate.png\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("box.obj"),
            "mtllib box.mtl\no box\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nusemtl crate\nf 1 2 3 4\n",
        )
        .unwrap();

        let scene = parse_obj(&dir.path().join("box.obj")).unwrap();
        assert_eq!(scene.name, "box");
        assert_eq!(scene.root().children.len(), 1);
        assert_eq!(scene.meshes()[0].polygon_count(), 2);

        let material = &scene.materials()[0];
        assert_eq!(material.properties[BASE_COLOR], PropertyValue::Color([0.5, 0.25, 1.0, 0.8]));
        assert_eq!(material.properties["shininess"], PropertyValue::Number(32.0));
        assert_eq!(
            material.properties[BASE_COLOR_TEXTURE],
            PropertyValue::Texture(BASE_COLOR_SLOT.into())
        );
        let texture = &material.textures[BASE_COLOR_SLOT];
        assert_eq!(texture.name, "crate");
        assert_eq!(texture.source.as_deref(), Some("textures/crate.png"));
        assert_eq!(scene.root().children[0].material, Some(material.id));
    }

    #[test]
    fn missing_library_still_loads_geometry() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("tri.obj"),
            "mtllib nowhere.mtl\no tri\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        )
        .unwrap();
        let scene = parse_obj(&dir.path().join("tri.obj")).unwrap();
        assert_eq!(scene.meshes().len(), 1);
        assert!(scene.materials().is_empty());
        assert!(scene.root().children[0].material.is_none());
    }
}
