use std::collections::{HashMap, HashSet};

use prism_analysis::{Analyzer, MeshAnalyzer, MeshIssues};
use prism_core::{Handle, Material, Mesh, Node, OptimizationProfile, Result, Scene};
use rayon::prelude::*;

use super::{ActionLog, instance_sources, prune_released};
use crate::{material, mesh};

/// Geometry and material pass: static sibling merging (when enabled), then
/// per-mesh welding, simplification and LODs, then per-material texture and
/// shader reduction followed by merging of similar materials.
pub fn run(scene: &Scene, profile: &OptimizationProfile, log: &mut ActionLog) -> Result<Scene> {
    scene.validate()?;
    let mut out = scene.clone();

    if profile.merge_static_meshes {
        merge_static_meshes(&mut out, log)?;
    }
    optimize_meshes(&mut out, profile, log)?;
    optimize_materials(&mut out, profile, log)?;
    Ok(out)
}

/// Handles of the meshes and materials some node points at.
fn reachable(scene: &Scene) -> (HashSet<Handle<Mesh>>, HashSet<Handle<Material>>) {
    let mut meshes = HashSet::new();
    let mut materials = HashSet::new();
    scene.root().walk(0, &mut |node, _| {
        meshes.extend(node.mesh);
        materials.extend(node.material);
    });
    (meshes, materials)
}

fn optimize_meshes(scene: &mut Scene, profile: &OptimizationProfile, log: &mut ActionLog) -> Result<()> {
    let report = MeshAnalyzer.analyze(scene)?;
    let (used, _) = reachable(scene);

    let results = scene
        .meshes()
        .par_iter()
        .map(|mesh| -> Result<(Mesh, Vec<String>)> {
            if !used.contains(&mesh.id) {
                return Ok((mesh.clone(), Vec::new()));
            }
            let issues = report
                .metrics(&mesh.id)
                .map_or(MeshIssues::NONE, |m| m.issues);
            optimize_mesh(mesh, issues, profile)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut meshes = Vec::with_capacity(results.len());
    for (mesh, notes) in results {
        for note in notes {
            log.record(note);
        }
        meshes.push(mesh);
    }
    scene.set_meshes(meshes);
    Ok(())
}

fn optimize_mesh(source: &Mesh, issues: MeshIssues, profile: &OptimizationProfile) -> Result<(Mesh, Vec<String>)> {
    let mut notes = Vec::new();
    if issues.contains(MeshIssues::INDEX_OUT_OF_RANGE) {
        log::warn!("Mesh '{}' has out-of-range indices, leaving it as is", source.name);
        return Ok((source.clone(), notes));
    }
    if issues.contains(MeshIssues::EMPTY) {
        return Ok((source.clone(), notes));
    }

    let mut current = mesh::optimize_vertices(source, profile.vertex_weld_epsilon)?;
    if current.vertex_count() < source.vertex_count() {
        notes.push(format!(
            "welded '{}' from {} to {} vertices",
            source.name,
            source.vertex_count(),
            current.vertex_count()
        ));
    }

    let target = profile.target_polygon_count as usize;
    if target > 0 && current.polygon_count() > target {
        let before = current.polygon_count();
        current = mesh::simplify(&current, target)?;
        notes.push(format!(
            "simplified '{}' from {} to {} polygons",
            source.name,
            before,
            current.polygon_count()
        ));
    }

    if profile.lod_levels > 0 {
        current.lods = mesh::generate_lods(
            &current,
            profile.lod_levels as usize,
            &profile.lod_reduction_factors,
        )?;
        let counts: Vec<String> = current.lods.iter().map(|l| l.polygon_count().to_string()).collect();
        notes.push(format!(
            "generated {} LODs for '{}' ({} polygons)",
            current.lods.len(),
            source.name,
            counts.join("/")
        ));
    }
    Ok((current, notes))
}

fn optimize_materials(scene: &mut Scene, profile: &OptimizationProfile, log: &mut ActionLog) -> Result<()> {
    let quality = profile.texture_compression_quality;
    let complexity = profile.target_shader_complexity;
    let (_, used) = reachable(scene);

    let results = scene
        .materials()
        .par_iter()
        .map(|source| -> Result<(Material, Vec<String>)> {
            let mut notes = Vec::new();
            let mut current = source.clone();
            if !used.contains(&source.id) {
                return Ok((current, notes));
            }
            if quality < 1.0 {
                current = material::compress_textures(&current, quality)?;
                let (before, after) = (source.texture_memory_bytes(), current.texture_memory_bytes());
                if after < before {
                    notes.push(format!(
                        "compressed textures of '{}' from {before} to {after} bytes",
                        source.name
                    ));
                }
            }
            if complexity < 1.0 {
                let before = current.complexity();
                current = material::optimize_shader(&current, complexity)?;
                if current.complexity() < before {
                    notes.push(format!(
                        "reduced shader of '{}' from {before} to {} properties",
                        source.name,
                        current.complexity()
                    ));
                }
            }
            Ok((current, notes))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut materials: Vec<Material> = Vec::with_capacity(results.len());
    for (material, notes) in results {
        for note in notes {
            log.record(note);
        }
        materials.push(material);
    }

    let threshold = profile.material_merge_similarity_threshold;
    let reachable_materials: Vec<Material> = materials.iter().filter(|m| used.contains(&m.id)).cloned().collect();
    if threshold > 0.0 && reachable_materials.len() > 1 {
        let merge = material::merge_similar_materials(&reachable_materials, threshold)?;
        if merge.merged_count() > 0 {
            let remap = merge.handle_remap(&reachable_materials);
            scene.root_mut().walk_mut(&mut |node: &mut Node| {
                if let Some(handle) = node.material {
                    node.material = remap.get(&handle).copied().or(Some(handle));
                }
            });
            log.record(format!(
                "merged {} similar materials into {}",
                merge.assignment.len(),
                merge.materials.len()
            ));
            let kept: HashSet<Handle<Material>> = merge.materials.iter().map(|m| m.id).collect();
            materials.retain(|m| !used.contains(&m.id) || kept.contains(&m.id));
        }
    }

    scene.set_materials(materials);
    Ok(())
}

/// Replaces sibling leaf mesh nodes that share a material with one node
/// whose mesh has each member's transform baked in.
fn merge_static_meshes(scene: &mut Scene, log: &mut ActionLog) -> Result<()> {
    let protected = instance_sources(scene.root());
    let mut root = scene.root().clone();
    let mut created = Vec::new();
    let mut released = HashSet::new();
    merge_siblings(&mut root, scene.meshes(), &protected, &mut created, &mut released, log)?;
    if created.is_empty() {
        return Ok(());
    }

    scene.set_root(root);
    scene.meshes_mut().extend(created);
    let (meshes, _) = prune_released(scene, &released, &HashSet::new());
    log::debug!("Static merging released {meshes} meshes");
    Ok(())
}

fn merge_siblings(
    node: &mut Node,
    catalog: &[Mesh],
    protected: &HashSet<String>,
    created: &mut Vec<Mesh>,
    released: &mut HashSet<Handle<Mesh>>,
    log: &mut ActionLog,
) -> Result<()> {
    for child in &mut node.children {
        merge_siblings(child, catalog, protected, created, released, log)?;
    }

    let lookup = |handle: &Handle<Mesh>| catalog.iter().find(|m| m.id == *handle);
    let mut groups: Vec<(Option<Handle<Material>>, Vec<usize>)> = Vec::new();
    for (i, child) in node.children.iter().enumerate() {
        let mergeable = child.children.is_empty()
            && !child.is_instance()
            && !protected.contains(&child.name)
            && child
                .mesh
                .and_then(|h| lookup(&h))
                .is_some_and(|m| !m.has_out_of_range_indices());
        if !mergeable {
            continue;
        }
        match groups.iter_mut().find(|(material, _)| *material == child.material) {
            Some((_, members)) => members.push(i),
            None => groups.push((child.material, vec![i])),
        }
    }

    let mut replacements: HashMap<usize, Node> = HashMap::new();
    let mut absorbed: HashSet<usize> = HashSet::new();
    for (material, members) in groups.into_iter().filter(|(_, m)| m.len() > 1) {
        let baked: Vec<Mesh> = members
            .iter()
            .filter_map(|&i| {
                let child = &node.children[i];
                child
                    .mesh
                    .and_then(|h| lookup(&h))
                    .map(|m| mesh::bake_transform(m, &child.transform))
            })
            .collect();

        let first = &node.children[members[0]];
        let mut merged = mesh::merge_meshes(&baked)?;
        merged.name = format!("{}_merged", first.name);

        let mut merged_node = Node::new(first.name.clone()).with_mesh(merged.id);
        merged_node.material = material;

        log.record(format!(
            "merged {} static meshes under '{}' into '{}'",
            members.len(),
            node.name,
            merged.name
        ));
        released.extend(members.iter().filter_map(|&i| node.children[i].mesh));
        created.push(merged);
        replacements.insert(members[0], merged_node);
        absorbed.extend(members[1..].iter().copied());
    }

    if replacements.is_empty() {
        return Ok(());
    }
    let children = std::mem::take(&mut node.children);
    node.children = children
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !absorbed.contains(i))
        .map(|(i, child)| replacements.remove(&i).unwrap_or(child))
        .collect();
    Ok(())
}
