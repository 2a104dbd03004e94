use glam::Mat4;
use prism_core::{Node, OptimizationProfile, Result, Scene};

use super::ActionLog;

/// Caps the hierarchy at `max_hierarchy_depth` by hoisting everything below
/// the last allowed level up to it, with transforms folded so world
/// placement is unchanged. Pre-order is kept among the hoisted nodes.
pub fn run(scene: &Scene, profile: &OptimizationProfile, log: &mut ActionLog) -> Result<Scene> {
    let limit = match profile.max_hierarchy_depth {
        0 => {
            log::warn!("maxHierarchyDepth 0 would remove the root, flattening to depth 1");
            1
        }
        depth => depth as usize,
    };

    let mut out = scene.clone();
    if scene.root().max_depth() > limit {
        flatten(out.root_mut(), 0, limit, log);
    }
    Ok(out)
}

fn flatten(node: &mut Node, depth: usize, limit: usize, log: &mut ActionLog) {
    if depth + 1 < limit {
        for child in &mut node.children {
            flatten(child, depth + 1, limit, log);
        }
        return;
    }
    if node.max_depth() <= 1 {
        return;
    }

    let direct = node.children.len();
    let mut hoisted = Vec::with_capacity(node.subtree_len() - 1);
    for child in std::mem::take(&mut node.children) {
        hoist(child, Mat4::IDENTITY, &mut hoisted);
    }
    log.record(format!(
        "moved {} nodes up under '{}'",
        hoisted.len() - direct,
        node.name
    ));
    node.children = hoisted;
}

fn hoist(mut node: Node, parent: Mat4, out: &mut Vec<Node>) {
    node.transform = parent * node.transform;
    let transform = node.transform;
    let children = std::mem::take(&mut node.children);
    out.push(node);
    for child in children {
        hoist(child, transform, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use prism_core::Stage;
    use std::collections::HashMap;

    fn chain(len: usize) -> Scene {
        let mut node = Node::new(format!("n{len}")).with_transform(Mat4::from_translation(Vec3::X));
        for i in (1..len).rev() {
            node = Node::new(format!("n{i}"))
                .with_transform(Mat4::from_scale(Vec3::splat(2.0)) * Mat4::from_translation(Vec3::Y))
                .with_child(node);
        }
        let mut scene = Scene::new("chain");
        scene.root_mut().children.push(node);
        scene
    }

    fn world_transforms(scene: &Scene) -> HashMap<String, Mat4> {
        let mut worlds = HashMap::new();
        scene.root().walk_world(Mat4::IDENTITY, &mut |node, world| {
            worlds.insert(node.name.clone(), world);
        });
        worlds
    }

    fn flatten_to(scene: &Scene, depth: u32) -> Scene {
        let profile = OptimizationProfile {
            max_hierarchy_depth: depth,
            ..Default::default()
        };
        run(scene, &profile, &mut ActionLog::new(Stage::Flattening)).unwrap()
    }

    #[test]
    fn depth_is_capped_and_world_transforms_kept() {
        let scene = chain(6);
        assert_eq!(scene.root().max_depth(), 6);

        let out = flatten_to(&scene, 3);
        assert_eq!(out.root().max_depth(), 3);
        assert_eq!(out.node_count(), scene.node_count());

        let before = world_transforms(&scene);
        for (name, world) in world_transforms(&out) {
            assert!(world.abs_diff_eq(before[&name], 1e-4), "{name} moved");
        }

        let n2 = out.find_node("n2").unwrap();
        let names: Vec<&str> = n2.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["n3", "n4", "n5", "n6"]);
    }

    #[test]
    fn zero_depth_flattens_under_root() {
        let out = flatten_to(&chain(4), 0);
        assert_eq!(out.root().max_depth(), 1);
        assert_eq!(out.root().children.len(), 4);
    }

    #[test]
    fn shallow_scene_is_untouched() {
        let scene = chain(2);
        let mut log = ActionLog::new(Stage::Flattening);
        let profile = OptimizationProfile::default();
        let out = run(&scene, &profile, &mut log).unwrap();
        assert_eq!(out, scene);
        assert!(log.is_empty());
    }
}
