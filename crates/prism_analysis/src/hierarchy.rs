use std::collections::BTreeMap;

use prism_core::{Result, Scene, transform};

use crate::Analyzer;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyMetrics {
    pub node_count: usize,
    /// Root is depth 0.
    pub max_depth: usize,
    /// Child count → number of nodes with that many children.
    pub branching: BTreeMap<usize, usize>,
    /// Mean child count over nodes that have children.
    pub average_branching: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformMetrics {
    pub non_identity: usize,
    /// Identity transforms carry no information.
    pub redundant: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceMetrics {
    pub total: usize,
    pub by_prototype: BTreeMap<String, usize>,
    /// Instances whose source name matches no node.
    pub unresolved: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexityMetrics {
    /// Largest number of instances sharing one prototype.
    pub max_fan_out: usize,
    /// `max_depth + log2(1 + max_fan_out)`
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyReport {
    pub hierarchy: HierarchyMetrics,
    pub transforms: TransformMetrics,
    pub instances: InstanceMetrics,
    pub complexity: ComplexityMetrics,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyAnalyzer;

impl Analyzer for HierarchyAnalyzer {
    type Report = HierarchyReport;

    fn analyze(&self, scene: &Scene) -> Result<HierarchyReport> {
        scene.validate()?;

        let names = scene.name_index();
        let mut report = HierarchyReport::default();
        let mut internal_nodes = 0usize;
        let mut child_links = 0usize;

        scene.root().walk(0, &mut |node, depth| {
            let h = &mut report.hierarchy;
            h.node_count += 1;
            h.max_depth = h.max_depth.max(depth);
            *h.branching.entry(node.children.len()).or_insert(0) += 1;
            if !node.children.is_empty() {
                internal_nodes += 1;
                child_links += node.children.len();
            }

            if transform::is_identity(&node.transform) {
                report.transforms.redundant += 1;
            } else {
                report.transforms.non_identity += 1;
            }

            if let Some(source) = &node.instance_of {
                report.instances.total += 1;
                *report
                    .instances
                    .by_prototype
                    .entry(source.clone())
                    .or_insert(0) += 1;
                if !names.contains_key(source.as_str()) {
                    report.instances.unresolved += 1;
                }
            }
        });

        if internal_nodes > 0 {
            report.hierarchy.average_branching = child_links as f32 / internal_nodes as f32;
        }

        let max_fan_out = report
            .instances
            .by_prototype
            .values()
            .copied()
            .max()
            .unwrap_or(0);
        report.complexity = ComplexityMetrics {
            max_fan_out,
            score: report.hierarchy.max_depth as f32 + (1.0 + max_fan_out as f32).log2(),
        };

        log::debug!(
            "Hierarchy of '{}': {} nodes, depth {}, {} instances",
            scene.name,
            report.hierarchy.node_count,
            report.hierarchy.max_depth,
            report.instances.total
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use prism_core::{Error, Handle, Node, transform::Transform};

    fn instance(name: &str, source: &str) -> Node {
        let mut node = Node::new(name);
        node.instance_of = Some(source.to_string());
        node
    }

    #[test]
    fn measures_depth_branching_and_instances() {
        let mut scene = Scene::new("h");
        scene.root_mut().children = vec![
            Node::new("a")
                .with_transform(Transform::from_xyz(1.0, 0.0, 0.0))
                .with_child(Node::new("b").with_child(Node::new("c"))),
            instance("i1", "a"),
            instance("i2", "a"),
            instance("ghost", "missing"),
        ];

        let report = HierarchyAnalyzer.analyze(&scene).unwrap();
        assert_eq!(report.hierarchy.node_count, 7);
        assert_eq!(report.hierarchy.max_depth, 3);
        assert_eq!(report.hierarchy.branching.get(&4), Some(&1));
        assert_eq!(report.hierarchy.branching.get(&0), Some(&4));
        assert_relative_eq!(report.hierarchy.average_branching, 2.0);

        assert_eq!(report.transforms.non_identity, 1);
        assert_eq!(report.transforms.redundant, 6);

        assert_eq!(report.instances.total, 3);
        assert_eq!(report.instances.by_prototype.get("a"), Some(&2));
        assert_eq!(report.instances.unresolved, 1);

        assert_eq!(report.complexity.max_fan_out, 2);
        assert_relative_eq!(report.complexity.score, 3.0 + 3f32.log2());
    }

    #[test]
    fn invalid_scene_is_rejected() {
        let mut scene = Scene::new("broken");
        scene.root_mut().children.push(Node::new("x").with_mesh(Handle::new()));
        assert!(matches!(
            HierarchyAnalyzer.analyze(&scene),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
