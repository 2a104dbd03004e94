use std::collections::{HashMap, HashSet};

use prism_core::{Handle, Material, Mesh, Node, OptimizationProfile, Result, Scene};

use super::{ActionLog, prune_released};

/// Only nodes that land in the same bucket are compared.
#[derive(PartialEq, Eq, Hash)]
struct Bucket<'a> {
    vertices: Option<usize>,
    polygons: Option<usize>,
    shader: Option<&'a str>,
}

struct PrototypeRef {
    name: String,
    mesh: Option<Handle<Mesh>>,
    material: Option<Handle<Material>>,
}

/// Turns nodes whose mesh and material match an earlier node into instances
/// of it, then drops the meshes and materials those nodes let go of if
/// nobody else points at them.
///
/// A prototype must have a unique name, since instances refer to it by
/// name. Running the stage twice changes nothing the second time.
pub fn run(scene: &Scene, profile: &OptimizationProfile, log: &mut ActionLog) -> Result<Scene> {
    scene.validate()?;
    let threshold = profile.instance_similarity_threshold;
    let names = scene.name_index();

    let mut nodes = Vec::with_capacity(scene.node_count());
    scene.root().walk(0, &mut |node, _| nodes.push(node));

    for node in &nodes {
        if let Some(source) = &node.instance_of {
            if !names.contains_key(source.as_str()) {
                log::warn!("Node '{}' instances unknown node '{source}', leaving it alone", node.name);
            }
        }
    }

    let mut buckets: HashMap<Bucket, Vec<usize>> = HashMap::new();
    let mut prototype_of: Vec<Option<usize>> = vec![None; nodes.len()];

    for (i, node) in nodes.iter().enumerate() {
        if node.is_instance() || (node.mesh.is_none() && node.material.is_none()) {
            continue;
        }
        let mesh = node.mesh.and_then(|h| scene.mesh(&h));
        let material = node.material.and_then(|h| scene.material(&h));
        let bucket = Bucket {
            vertices: mesh.map(Mesh::vertex_count),
            polygons: mesh.map(Mesh::polygon_count),
            shader: material.map(|m| m.shader.as_str()),
        };

        let prototypes = buckets.entry(bucket).or_default();
        let matched = prototypes.iter().copied().find(|&p| {
            let similarity = signature_similarity(scene, nodes[p], node);
            similarity > 0.0 && similarity >= threshold
        });
        match matched {
            Some(p) => prototype_of[i] = Some(p),
            None if names.get(node.name.as_str()) == Some(&1) => prototypes.push(i),
            None => log::debug!("Node name '{}' is not unique, skipping it as a prototype", node.name),
        }
    }

    let plan: Vec<Option<PrototypeRef>> = prototype_of
        .iter()
        .map(|p| {
            p.map(|p| PrototypeRef {
                name: nodes[p].name.clone(),
                mesh: nodes[p].mesh,
                material: nodes[p].material,
            })
        })
        .collect();

    let mut out = scene.clone();
    if plan.iter().all(Option::is_none) {
        return Ok(out);
    }

    let mut index = 0;
    let mut released_meshes = HashSet::new();
    let mut released_materials = HashSet::new();
    out.root_mut().walk_mut(&mut |node: &mut Node| {
        if let Some(prototype) = &plan[index] {
            log.record(format!("'{}' now instances '{}'", node.name, prototype.name));
            if node.mesh != prototype.mesh {
                released_meshes.extend(node.mesh);
            }
            if node.material != prototype.material {
                released_materials.extend(node.material);
            }
            node.instance_of = Some(prototype.name.clone());
            node.mesh = prototype.mesh;
            node.material = prototype.material;
        }
        index += 1;
    });

    let (meshes, materials) = prune_released(&mut out, &released_meshes, &released_materials);
    if meshes + materials > 0 {
        log.record(format!(
            "dropped {meshes} meshes and {materials} materials now shared through instances"
        ));
    }
    Ok(out)
}

/// Worst of mesh and material similarity. A side both nodes lack counts as
/// a match; a side only one node has does not.
fn signature_similarity(scene: &Scene, a: &Node, b: &Node) -> f32 {
    let mesh = match (a.mesh, b.mesh) {
        (None, None) => 1.0,
        (Some(x), Some(y)) => match (scene.mesh(&x), scene.mesh(&y)) {
            (Some(x), Some(y)) => x.similarity(y),
            _ => 0.0,
        },
        _ => 0.0,
    };
    let material = match (a.material, b.material) {
        (None, None) => 1.0,
        (Some(x), Some(y)) => match (scene.material(&x), scene.material(&y)) {
            (Some(x), Some(y)) => x.similarity(y),
            _ => 0.0,
        },
        _ => 0.0,
    };
    mesh.min(material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};
    use prism_core::{PropertyValue, Stage};

    fn cube(name: &str, offset: f32) -> Mesh {
        let vertices = vec![
            Vec3::new(offset, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        Mesh::new(name, vertices, Vec::new(), vec![0, 1, 2, 0, 2, 3, 0, 3, 1, 1, 3, 2])
    }

    fn crates_scene() -> Scene {
        let mut scene = Scene::new("yard");
        let wood = scene.add_material(
            Material::new("wood", "pbr").with_property("roughness", PropertyValue::Number(0.7)),
        );
        let wood_copy = scene.add_material(
            Material::new("wood.001", "pbr").with_property("roughness", PropertyValue::Number(0.7)),
        );
        let a = scene.add_mesh(cube("crate", 0.0));
        let b = scene.add_mesh(cube("crate.001", 0.0));
        let c = scene.add_mesh(cube("crate.002", 0.0));
        let odd = scene.add_mesh(cube("odd", 0.5));

        let root = scene.root_mut();
        root.children.push(Node::new("crate_a").with_mesh(a).with_material(wood));
        root.children.push(
            Node::new("crate_b")
                .with_transform(Mat4::from_translation(Vec3::X * 2.0))
                .with_mesh(b)
                .with_material(wood_copy),
        );
        root.children.push(
            Node::new("shelf").with_child(Node::new("crate_c").with_mesh(c).with_material(wood)),
        );
        root.children.push(Node::new("odd").with_mesh(odd).with_material(wood));
        scene
    }

    fn run_once(scene: &Scene, threshold: f32) -> Scene {
        let profile = OptimizationProfile {
            instance_similarity_threshold: threshold,
            ..Default::default()
        };
        run(scene, &profile, &mut ActionLog::new(Stage::Instancing)).unwrap()
    }

    #[test]
    fn duplicates_become_instances() {
        let scene = crates_scene();
        let out = run_once(&scene, 0.99);

        let b = out.find_node("crate_b").unwrap();
        let c = out.find_node("crate_c").unwrap();
        assert_eq!(b.instance_of.as_deref(), Some("crate_a"));
        assert_eq!(c.instance_of.as_deref(), Some("crate_a"));
        assert_eq!(b.transform, Mat4::from_translation(Vec3::X * 2.0));
        assert!(out.find_node("odd").unwrap().instance_of.is_none());

        assert_eq!(out.meshes().len(), 2);
        assert_eq!(out.materials().len(), 1);
        assert_eq!(out.node_count(), scene.node_count());
        out.validate().unwrap();
    }

    #[test]
    fn second_run_changes_nothing() {
        let once = run_once(&crates_scene(), 0.99);
        let twice = run_once(&once, 0.99);
        assert_eq!(once, twice);
    }

    #[test]
    fn partial_match_respects_threshold() {
        // `odd` matches the crates on 3 of 4 positions.
        let scene = crates_scene();
        let loose = run_once(&scene, 0.7);
        assert_eq!(
            loose.find_node("odd").unwrap().instance_of.as_deref(),
            Some("crate_a")
        );
        let strict = run_once(&scene, 0.8);
        assert!(strict.find_node("odd").unwrap().instance_of.is_none());
    }

    #[test]
    fn shared_names_are_not_prototypes() {
        let mut scene = Scene::new("dupes");
        let mesh = scene.add_mesh(cube("m", 0.0));
        scene.root_mut().children.push(Node::new("rock").with_mesh(mesh));
        scene.root_mut().children.push(Node::new("rock").with_mesh(mesh));

        let out = run_once(&scene, 0.5);
        assert!(out.root().children.iter().all(|n| n.instance_of.is_none()));
    }

    #[test]
    fn untouched_catalog_entries_survive() {
        let mut scene = Scene::new("spares");
        let tri = scene.add_mesh(cube("tri", 0.0));
        let spare = scene.add_mesh(cube("spare", 0.5));
        let unused = scene.add_material(Material::new("unused", "unlit"));
        scene.root_mut().children.push(Node::new("a").with_mesh(tri));
        scene.root_mut().children.push(Node::new("b").with_mesh(tri));

        let out = run_once(&scene, 0.9);

        assert_eq!(out.find_node("b").unwrap().instance_of.as_deref(), Some("a"));
        assert_eq!(out.meshes().len(), 2);
        assert!(out.mesh(&spare).is_some());
        assert!(out.material(&unused).is_some());
    }
}
