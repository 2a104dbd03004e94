use std::collections::HashSet;

use prism_core::{Node, OptimizationProfile, Result, Scene};

use super::{ActionLog, instance_sources};

/// Folds transform-only nodes with a single child into that child.
///
/// The root, instances and nodes named as an instance source are never
/// removed. World transforms of every surviving node are unchanged.
pub fn run(scene: &Scene, _profile: &OptimizationProfile, log: &mut ActionLog) -> Result<Scene> {
    let protected = instance_sources(scene.root());
    let mut out = scene.clone();
    collapse_chains(out.root_mut(), &protected, log);
    Ok(out)
}

fn collapse_chains(node: &mut Node, protected: &HashSet<String>, log: &mut ActionLog) {
    for child in &mut node.children {
        collapse_chains(child, protected, log);
        while child.is_transform_only() && child.children.len() == 1 && !protected.contains(&child.name) {
            let Some(mut only) = child.children.pop() else {
                break;
            };
            only.transform = child.transform * only.transform;
            log.record(format!("folded '{}' into '{}'", child.name, only.name));
            *child = only;
        }
    }
}
