use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use glam::{Mat4, Vec2, Vec3};
use prism_core::{
    Aabb, Error, Handle, Mesh, Result,
    profile::validate_lod_factors,
};
use rayon::prelude::*;

/// Reduces `mesh` to at most `target_polygons` triangles.
///
/// Shortest edges collapse first, each to its midpoint, so the surface moves
/// by at most half the length of the longest collapsed edge. Ties break on
/// vertex indices, which makes the result a pure function of the input.
/// UVs survive only on fully mapped meshes. The output keeps the input's
/// handle and name and carries no LODs.
pub fn simplify(mesh: &Mesh, target_polygons: usize) -> Result<Mesh> {
    if mesh.has_out_of_range_indices() {
        return Err(Error::optimization_failure(format!(
            "mesh '{}' has indices past its {} vertices",
            mesh.name,
            mesh.vertex_count()
        )));
    }

    let current = mesh.polygon_count();
    if current <= target_polygons {
        let mut out = mesh.clone();
        out.indices.truncate(current * 3);
        out.lods.clear();
        return Ok(out);
    }
    if target_polygons == 0 {
        return Err(Error::optimization_failure(format!(
            "mesh '{}' cannot reach 0 polygons without being discarded",
            mesh.name
        )));
    }

    let mut collapse = EdgeCollapse::new(mesh);
    collapse.run(target_polygons);
    let out = collapse.into_mesh(mesh);

    log::trace!(
        "Simplified '{}' from {} to {} polygons",
        mesh.name,
        current,
        out.polygon_count()
    );
    Ok(out)
}

/// One simplified copy per factor, most detailed first, named
/// `{mesh}_LOD{n}`. Levels are independent and built in parallel.
pub fn generate_lods(mesh: &Mesh, level_count: usize, reduction_factors: &[f32]) -> Result<Vec<Mesh>> {
    validate_lod_factors(level_count, reduction_factors)?;

    let original = mesh.polygon_count() as f32;
    reduction_factors
        .par_iter()
        .enumerate()
        .map(|(level, factor)| -> Result<Mesh> {
            let target = ((original * factor).round() as usize).max(1);
            let mut lod = simplify(mesh, target)?;
            lod.id = Handle::new();
            lod.name = format!("{}_LOD{}", mesh.name, level + 1);
            Ok(lod)
        })
        .collect()
}

/// Welds vertices whose position and UV fall in the same `epsilon` cell and
/// drops vertices no triangle uses. Triangle count is unchanged; vertices
/// are renumbered in first-use order.
pub fn optimize_vertices(mesh: &Mesh, epsilon: f32) -> Result<Mesh> {
    if !(epsilon.is_finite() && epsilon > 0.0) {
        return Err(Error::invalid_configuration(format!(
            "vertex weld epsilon must be positive, got {epsilon}"
        )));
    }
    if mesh.has_out_of_range_indices() {
        return Err(Error::optimization_failure(format!(
            "mesh '{}' has indices past its {} vertices",
            mesh.name,
            mesh.vertex_count()
        )));
    }

    let quantize = |v: f32| (v / epsilon).round() as i64;
    let mut welded: HashMap<([i64; 3], Option<[i64; 2]>), u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut uvs: Vec<Option<Vec2>> = Vec::new();
    let mut indices = Vec::with_capacity(mesh.polygon_count() * 3);

    for index in mesh.triangles().flatten() {
        let position = mesh.vertices[index as usize];
        let uv = mesh.uvs.get(index as usize).copied();
        let key = (
            [quantize(position.x), quantize(position.y), quantize(position.z)],
            uv.map(|uv| [quantize(uv.x), quantize(uv.y)]),
        );
        let new_index = *welded.entry(key).or_insert_with(|| {
            vertices.push(position);
            uvs.push(uv);
            (vertices.len() - 1) as u32
        });
        indices.push(new_index);
    }

    // A partial mapping cannot be expressed after renumbering.
    let uvs: Vec<Vec2> = uvs.into_iter().collect::<Option<Vec<_>>>().unwrap_or_default();

    let bounds = Aabb::from_points(&vertices);
    Ok(Mesh {
        id: mesh.id,
        name: mesh.name.clone(),
        vertices,
        uvs,
        indices,
        bounds,
        lods: mesh.lods.clone(),
    })
}

/// Concatenates meshes, offsetting indices so every triangle stays valid.
/// Only whole triangles are carried; UV lists are appended as they are.
/// Bounds are the union of the input bounds.
pub fn merge_meshes(meshes: &[Mesh]) -> Result<Mesh> {
    let Some(first) = meshes.first() else {
        return Err(Error::invalid_argument("cannot merge an empty mesh list"));
    };
    if let Some(bad) = meshes.iter().find(|m| m.has_out_of_range_indices()) {
        return Err(Error::optimization_failure(format!(
            "mesh '{}' has indices past its vertices and cannot be merged",
            bad.name
        )));
    }

    let mut vertices = Vec::with_capacity(meshes.iter().map(Mesh::vertex_count).sum());
    let mut uvs = Vec::new();
    let mut indices = Vec::new();
    let mut bounds = first.bounds;

    for mesh in meshes {
        let offset = vertices.len() as u32;
        indices.extend(mesh.triangles().flatten().map(|i| i + offset));
        vertices.extend_from_slice(&mesh.vertices);
        uvs.extend_from_slice(&mesh.uvs);
        bounds = bounds.union(&mesh.bounds);
    }

    Ok(Mesh {
        id: Handle::new(),
        name: format!("{}_merged", first.name),
        vertices,
        uvs,
        indices,
        bounds,
        lods: Vec::new(),
    })
}

/// Applies `matrix` to every position. LODs are dropped.
pub fn bake_transform(mesh: &Mesh, matrix: &Mat4) -> Mesh {
    let vertices: Vec<Vec3> = mesh.vertices.iter().map(|v| matrix.transform_point3(*v)).collect();
    let bounds = Aabb::from_points(&vertices);
    Mesh {
        vertices,
        bounds,
        lods: Vec::new(),
        ..mesh.clone()
    }
}

/// Heap entry for a candidate edge. Stale once either endpoint's version
/// moves on.
#[derive(Debug, Clone, Copy)]
struct EdgeCandidate {
    length: f32,
    a: u32,
    b: u32,
    version_a: u32,
    version_b: u32,
}

impl Ord for EdgeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.length
            .total_cmp(&other.length)
            .then(self.a.cmp(&other.a))
            .then(self.b.cmp(&other.b))
            .then(self.version_a.cmp(&other.version_a))
            .then(self.version_b.cmp(&other.version_b))
    }
}

impl PartialOrd for EdgeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for EdgeCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EdgeCandidate {}

struct EdgeCollapse {
    positions: Vec<Vec3>,
    uvs: Option<Vec<Vec2>>,
    triangles: Vec<[u32; 3]>,
    triangle_alive: Vec<bool>,
    vertex_alive: Vec<bool>,
    versions: Vec<u32>,
    adjacency: Vec<Vec<usize>>,
    heap: BinaryHeap<Reverse<EdgeCandidate>>,
    live_triangles: usize,
}

impl EdgeCollapse {
    fn new(mesh: &Mesh) -> Self {
        let vertex_count = mesh.vertex_count();
        let triangles: Vec<[u32; 3]> = mesh.triangles().collect();
        let triangle_alive: Vec<bool> = triangles
            .iter()
            .map(|[a, b, c]| a != b && b != c && a != c)
            .collect();

        let mut adjacency = vec![Vec::new(); vertex_count];
        for (t, tri) in triangles.iter().enumerate() {
            if triangle_alive[t] {
                for &v in tri {
                    adjacency[v as usize].push(t);
                }
            }
        }

        let mut collapse = Self {
            positions: mesh.vertices.clone(),
            uvs: mesh.is_fully_mapped().then(|| mesh.uvs.clone()),
            live_triangles: triangle_alive.iter().filter(|alive| **alive).count(),
            triangles,
            triangle_alive,
            vertex_alive: vec![true; vertex_count],
            versions: vec![0; vertex_count],
            adjacency,
            heap: BinaryHeap::new(),
        };

        for t in 0..collapse.triangles.len() {
            if collapse.triangle_alive[t] {
                let [a, b, c] = collapse.triangles[t];
                collapse.push_edge(a, b);
                collapse.push_edge(b, c);
                collapse.push_edge(c, a);
            }
        }
        collapse
    }

    fn push_edge(&mut self, a: u32, b: u32) {
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        let length = self.positions[a as usize].distance(self.positions[b as usize]);
        self.heap.push(Reverse(EdgeCandidate {
            length,
            a,
            b,
            version_a: self.versions[a as usize],
            version_b: self.versions[b as usize],
        }));
    }

    fn is_current(&self, edge: &EdgeCandidate) -> bool {
        let (a, b) = (edge.a as usize, edge.b as usize);
        self.vertex_alive[a]
            && self.vertex_alive[b]
            && self.versions[a] == edge.version_a
            && self.versions[b] == edge.version_b
    }

    fn run(&mut self, target: usize) {
        while self.live_triangles > target {
            let Some(Reverse(edge)) = self.heap.pop() else {
                break;
            };
            if self.is_current(&edge) {
                self.collapse(edge.a, edge.b);
            }
        }
    }

    /// Folds `victim` into `keep` at the edge midpoint.
    fn collapse(&mut self, keep: u32, victim: u32) {
        let (k, v) = (keep as usize, victim as usize);
        self.positions[k] = self.positions[k].lerp(self.positions[v], 0.5);
        if let Some(uvs) = &mut self.uvs {
            uvs[k] = uvs[k].lerp(uvs[v], 0.5);
        }
        self.vertex_alive[v] = false;

        for t in std::mem::take(&mut self.adjacency[v]) {
            if !self.triangle_alive[t] {
                continue;
            }
            let tri = &mut self.triangles[t];
            for corner in tri.iter_mut() {
                if *corner == victim {
                    *corner = keep;
                }
            }
            let [a, b, c] = *tri;
            if a == b || b == c || a == c {
                self.triangle_alive[t] = false;
                self.live_triangles -= 1;
            } else {
                self.adjacency[k].push(t);
            }
        }

        self.versions[k] += 1;
        let alive = &self.triangle_alive;
        self.adjacency[k].retain(|t| alive[*t]);
        self.adjacency[k].sort_unstable();
        self.adjacency[k].dedup();

        for i in 0..self.adjacency[k].len() {
            let t = self.adjacency[k][i];
            let tri = self.triangles[t];
            for other in tri {
                if other != keep {
                    self.push_edge(keep, other);
                }
            }
        }
    }

    fn into_mesh(self, source: &Mesh) -> Mesh {
        let mut remap: HashMap<u32, u32> = HashMap::new();
        let mut vertices = Vec::new();
        let mut uvs = Vec::new();
        let mut indices = Vec::with_capacity(self.live_triangles * 3);

        for (t, tri) in self.triangles.iter().enumerate() {
            if !self.triangle_alive[t] {
                continue;
            }
            for &old in tri {
                let new_index = *remap.entry(old).or_insert_with(|| {
                    vertices.push(self.positions[old as usize]);
                    if let Some(source_uvs) = &self.uvs {
                        uvs.push(source_uvs[old as usize]);
                    }
                    (vertices.len() - 1) as u32
                });
                indices.push(new_index);
            }
        }

        let bounds = Aabb::from_points(&vertices);
        Mesh {
            id: source.id,
            name: source.name.clone(),
            vertices,
            uvs,
            indices,
            bounds,
            lods: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// `n` x `n` quads on the XY plane, two triangles each.
    fn grid(n: u32) -> Mesh {
        let mut vertices = Vec::new();
        let mut uvs = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push(Vec3::new(x as f32, y as f32, 0.0));
                uvs.push(Vec2::new(x as f32 / n as f32, y as f32 / n as f32));
            }
        }
        let mut indices = Vec::new();
        let row = n + 1;
        for y in 0..n {
            for x in 0..n {
                let i = y * row + x;
                indices.extend_from_slice(&[i, i + 1, i + row + 1, i, i + row + 1, i + row]);
            }
        }
        Mesh::new("grid", vertices, uvs, indices)
    }

    #[test]
    fn simplify_reaches_target_and_is_deterministic() {
        let mesh = grid(8);
        assert_eq!(mesh.polygon_count(), 128);

        let a = simplify(&mesh, 40).unwrap();
        let b = simplify(&mesh, 40).unwrap();
        assert!(a.polygon_count() <= 40);
        assert!(a.polygon_count() > 0);
        assert_eq!(a.vertices, b.vertices);
        assert_eq!(a.indices, b.indices);
        assert!(!a.has_out_of_range_indices());
        assert!(a.is_fully_mapped());
        assert_eq!(a.id, mesh.id);
    }

    #[test]
    fn simplify_stays_within_original_bounds() {
        let mesh = grid(6);
        let out = simplify(&mesh, 10).unwrap();
        let (min, max) = (mesh.bounds.min(), mesh.bounds.max());
        for v in &out.vertices {
            assert!(v.cmpge(min - Vec3::splat(1e-5)).all());
            assert!(v.cmple(max + Vec3::splat(1e-5)).all());
        }
    }

    #[test]
    fn simplify_below_target_returns_copy() {
        let mesh = grid(2);
        let out = simplify(&mesh, 100).unwrap();
        assert_eq!(out.indices, mesh.indices);
    }

    #[test]
    fn simplify_to_zero_fails() {
        assert!(matches!(
            simplify(&grid(2), 0),
            Err(Error::OptimizationFailure { .. })
        ));
    }

    #[test]
    fn lods_follow_factors() {
        let mesh = grid(10);
        let lods = generate_lods(&mesh, 3, &[0.5, 0.25, 0.1]).unwrap();
        assert_eq!(lods.len(), 3);
        assert!(lods[0].polygon_count() <= 100);
        assert!(lods[1].polygon_count() <= 50);
        assert!(lods[2].polygon_count() <= 20);
        assert_eq!(lods[2].name, "grid_LOD3");
        assert_ne!(lods[0].id, mesh.id);
    }

    #[test]
    fn lod_factors_must_decrease() {
        let mesh = grid(2);
        for factors in [&[0.5, 0.5][..], &[0.25, 0.5], &[1.5, 0.5], &[0.5, 0.0]] {
            assert!(matches!(
                generate_lods(&mesh, 2, factors),
                Err(Error::InvalidConfiguration { .. })
            ));
        }
        assert!(matches!(
            generate_lods(&mesh, 3, &[0.5, 0.25]),
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn optimize_vertices_welds_and_drops_unused() {
        // Two triangles sharing an edge, stored with duplicated corners
        // plus one vertex nothing references.
        let mesh = Mesh::new(
            "split",
            vec![
                Vec3::ZERO,
                Vec3::X,
                Vec3::Y,
                Vec3::X,
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::Y,
                Vec3::splat(9.0),
            ],
            Vec::new(),
            vec![0, 1, 2, 3, 4, 5, 0],
        );

        let out = optimize_vertices(&mesh, 1e-5).unwrap();
        assert_eq!(out.polygon_count(), mesh.polygon_count());
        assert_eq!(out.vertex_count(), 4);
        assert_eq!(out.indices, vec![0, 1, 2, 1, 3, 2]);
        assert_relative_eq!(out.bounds.size.x, 1.0);
    }

    #[test]
    fn optimize_vertices_keeps_uv_seams() {
        let mesh = Mesh::new(
            "seam",
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ZERO],
            vec![Vec2::ZERO, Vec2::X, Vec2::Y, Vec2::ONE],
            vec![0, 1, 2, 3, 1, 2],
        );
        let out = optimize_vertices(&mesh, 1e-5).unwrap();
        assert_eq!(out.vertex_count(), 4);
        assert!(out.is_fully_mapped());
    }

    #[test]
    fn merge_offsets_indices_and_unions_bounds() {
        let a = Mesh::new("a", vec![Vec3::ZERO, Vec3::X, Vec3::Y], Vec::new(), vec![0, 1, 2]);
        let b = Mesh::new(
            "b",
            vec![Vec3::splat(2.0), Vec3::splat(3.0), Vec3::new(2.0, 3.0, 2.0)],
            Vec::new(),
            vec![0, 1, 2, 1],
        );

        let merged = merge_meshes(&[a, b]).unwrap();
        assert_eq!(merged.vertex_count(), 6);
        assert_eq!(merged.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(merged.bounds.min(), Vec3::ZERO);
        assert_eq!(merged.bounds.max(), Vec3::splat(3.0));

        assert!(matches!(merge_meshes(&[]), Err(Error::InvalidArgument { .. })));
    }
}
