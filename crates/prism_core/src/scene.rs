use std::collections::{HashMap, HashSet};
use std::fmt;

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::{
    assets::Handle,
    error::{Error, Result},
    material::Material,
    mesh::Mesh,
    statistics::Statistics,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Group,
    Mesh,
    Instance,
    Empty,
}

impl NodeKind {
    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Group => "group",
            NodeKind::Mesh => "mesh",
            NodeKind::Instance => "instance",
            NodeKind::Empty => "empty",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One element of the scene tree. Children are owned; meshes and materials
/// are referenced by handle, prototypes by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub transform: Mat4,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<Handle<Mesh>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<Handle<Material>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    /// Name of the prototype node when this node is an instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_of: Option<String>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            mesh: None,
            material: None,
            children: Vec::new(),
            instance_of: None,
        }
    }

    pub fn with_transform(mut self, transform: impl Into<Mat4>) -> Self {
        self.transform = transform.into();
        self
    }

    pub fn with_mesh(mut self, mesh: Handle<Mesh>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_material(mut self, material: Handle<Material>) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_instance(&self) -> bool {
        self.instance_of.is_some()
    }

    /// True when the node carries nothing but a transform.
    pub fn is_transform_only(&self) -> bool {
        self.mesh.is_none() && self.material.is_none() && !self.is_instance()
    }

    pub fn kind(&self) -> NodeKind {
        if self.is_instance() {
            NodeKind::Instance
        } else if self.mesh.is_some() {
            NodeKind::Mesh
        } else if !self.children.is_empty() {
            NodeKind::Group
        } else {
            NodeKind::Empty
        }
    }

    /// Pre-order walk. `depth` of `self` is the value passed in.
    pub fn walk<'a, F>(&'a self, depth: usize, f: &mut F)
    where
        F: FnMut(&'a Node, usize),
    {
        f(self, depth);
        for child in &self.children {
            child.walk(depth + 1, f);
        }
    }

    pub fn walk_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Node),
    {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }

    /// Pre-order walk carrying the world matrix of each node.
    pub fn walk_world<'a, F>(&'a self, parent: Mat4, f: &mut F)
    where
        F: FnMut(&'a Node, Mat4),
    {
        let world = parent * self.transform;
        f(self, world);
        for child in &self.children {
            child.walk_world(world, f);
        }
    }

    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }

    pub fn max_depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.max_depth())
            .max()
            .unwrap_or(0)
    }
}

/// Root aggregate. Owns the node tree and the mesh/material catalogs and
/// caches a `Statistics` snapshot that every mutable accessor invalidates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    root: Node,
    #[serde(default)]
    meshes: Vec<Mesh>,
    #[serde(default)]
    materials: Vec<Material>,
    #[serde(skip)]
    statistics: Statistics,
    #[serde(skip)]
    statistics_current: bool,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_parts(name, Node::new("Root"), Vec::new(), Vec::new())
    }

    /// Statistics start zeroed and stale.
    pub fn from_parts(
        name: impl Into<String>,
        root: Node,
        meshes: Vec<Mesh>,
        materials: Vec<Material>,
    ) -> Self {
        Self {
            name: name.into(),
            root,
            meshes,
            materials,
            statistics: Statistics::default(),
            statistics_current: false,
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        self.statistics_current = false;
        &mut self.root
    }

    pub fn set_root(&mut self, root: Node) {
        self.statistics_current = false;
        self.root = root;
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut Vec<Mesh> {
        self.statistics_current = false;
        &mut self.meshes
    }

    pub fn set_meshes(&mut self, meshes: Vec<Mesh>) {
        self.statistics_current = false;
        self.meshes = meshes;
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut Vec<Material> {
        self.statistics_current = false;
        &mut self.materials
    }

    pub fn set_materials(&mut self, materials: Vec<Material>) {
        self.statistics_current = false;
        self.materials = materials;
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> Handle<Mesh> {
        let id = mesh.id;
        self.meshes_mut().push(mesh);
        id
    }

    pub fn add_material(&mut self, material: Material) -> Handle<Material> {
        let id = material.id;
        self.materials_mut().push(material);
        id
    }

    pub fn mesh(&self, handle: &Handle<Mesh>) -> Option<&Mesh> {
        self.meshes.iter().find(|m| m.id == *handle)
    }

    pub fn material(&self, handle: &Handle<Material>) -> Option<&Material> {
        self.materials.iter().find(|m| m.id == *handle)
    }

    pub fn node_count(&self) -> usize {
        self.root.subtree_len()
    }

    /// Node name → number of nodes carrying it. Built once per pass; instance
    /// links resolve only through names that occur exactly once.
    pub fn name_index(&self) -> HashMap<&str, usize> {
        let mut index = HashMap::new();
        self.root.walk(0, &mut |node, _| {
            *index.entry(node.name.as_str()).or_insert(0) += 1;
        });
        index
    }

    pub fn find_node(&self, name: &str) -> Option<&Node> {
        let mut found = None;
        self.root.walk(0, &mut |node, _| {
            if found.is_none() && node.name == name {
                found = Some(node);
            }
        });
        found
    }

    /// Last computed snapshot. Zeroed until the first refresh.
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn statistics_are_current(&self) -> bool {
        self.statistics_current
    }

    pub fn refresh_statistics(&mut self) -> &Statistics {
        if !self.statistics_current {
            self.statistics = Statistics::compute(self);
            self.statistics_current = true;
        }
        &self.statistics
    }

    /// Catalog handles are unique and every node reference resolves.
    /// Unresolved instance links are not an error here.
    pub fn validate(&self) -> Result<()> {
        let mut mesh_ids = HashSet::new();
        for mesh in &self.meshes {
            if !mesh_ids.insert(mesh.id) {
                return Err(Error::invalid_argument(format!(
                    "scene '{}' lists mesh '{}' twice",
                    self.name, mesh.name
                )));
            }
        }
        let mut material_ids = HashSet::new();
        for material in &self.materials {
            if !material_ids.insert(material.id) {
                return Err(Error::invalid_argument(format!(
                    "scene '{}' lists material '{}' twice",
                    self.name, material.name
                )));
            }
        }

        let mut dangling = None;
        self.root.walk(0, &mut |node, _| {
            if dangling.is_some() {
                return;
            }
            if node.mesh.is_some_and(|m| !mesh_ids.contains(&m)) {
                dangling = Some(format!("node '{}' references a missing mesh", node.name));
            } else if node.material.is_some_and(|m| !material_ids.contains(&m)) {
                dangling = Some(format!("node '{}' references a missing material", node.name));
            }
        });

        match dangling {
            Some(message) => Err(Error::invalid_argument(message)),
            None => Ok(()),
        }
    }
}

impl PartialEq for Scene {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.root == other.root
            && self.meshes == other.meshes
            && self.materials == other.materials
    }
}
