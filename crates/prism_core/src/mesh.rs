use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::assets::Handle;

/// Positions closer than this are the same vertex for similarity purposes.
pub const POSITION_EPSILON: f32 = 1e-4;

/// Axis-aligned box stored as center + size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb {
    pub center: Vec3,
    pub size: Vec3,
}

impl Aabb {
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            size: max - min,
        }
    }

    /// Tight box around `points`, or the zero box when empty.
    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Vec3>,
    {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        let (min, max) = iter.fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
        Self::from_min_max(min, max)
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.size * 0.5
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.size * 0.5
    }

    pub fn volume(&self) -> f32 {
        self.size.x.abs() * self.size.y.abs() * self.size.z.abs()
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::from_min_max(self.min().min(other.min()), self.max().max(other.max()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub id: Handle<Mesh>,
    pub name: String,
    pub vertices: Vec<Vec3>,
    /// May be shorter or longer than `vertices`; see `is_fully_mapped`.
    #[serde(default)]
    pub uvs: Vec<Vec2>,
    /// Flat triangle list. A trailing partial triangle is ignored everywhere.
    pub indices: Vec<u32>,
    #[serde(default)]
    pub bounds: Aabb,
    /// Generated levels of detail, most detailed first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lods: Vec<Mesh>,
}

impl Mesh {
    /// Builds a mesh with a fresh handle and bounds computed from `vertices`.
    pub fn new(name: impl Into<String>, vertices: Vec<Vec3>, uvs: Vec<Vec2>, indices: Vec<u32>) -> Self {
        let bounds = Aabb::from_points(&vertices);
        Self {
            id: Handle::new(),
            name: name.into(),
            vertices,
            uvs,
            indices,
            bounds,
            lods: Vec::new(),
        }
    }

    pub fn polygon_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Whole triangles only; never yields the remainder of a truncated list.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    pub fn is_fully_mapped(&self) -> bool {
        self.uvs.len() == self.vertices.len()
    }

    pub fn has_out_of_range_indices(&self) -> bool {
        let count = self.vertices.len();
        self.triangles().flatten().any(|i| i as usize >= count)
    }

    pub fn recompute_bounds(&mut self) {
        self.bounds = Aabb::from_points(&self.vertices);
    }

    /// Bytes for positions, UVs and indices, including LODs.
    pub fn memory_bytes(&self) -> usize {
        let own = self.vertices.len() * std::mem::size_of::<Vec3>()
            + self.uvs.len() * std::mem::size_of::<Vec2>()
            + self.indices.len() * std::mem::size_of::<u32>();
        own + self.lods.iter().map(Mesh::memory_bytes).sum::<usize>()
    }

    /// 0 unless the topology is identical, otherwise the fraction of
    /// positions that match within `POSITION_EPSILON`.
    pub fn similarity(&self, other: &Mesh) -> f32 {
        if self.polygon_count() != other.polygon_count()
            || self.vertices.len() != other.vertices.len()
            || self.indices != other.indices
        {
            return 0.0;
        }
        if self.vertices.is_empty() {
            return 1.0;
        }

        let matching = self
            .vertices
            .iter()
            .zip(&other.vertices)
            .filter(|(a, b)| a.abs_diff_eq(**b, POSITION_EPSILON))
            .count();
        matching as f32 / self.vertices.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Mesh {
        Mesh::new(
            "quad",
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn polygon_count_ignores_remainder() {
        let mut mesh = quad();
        assert_eq!(mesh.polygon_count(), 2);

        mesh.indices.truncate(5);
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.triangles().count(), 1);
    }

    #[test]
    fn bounds_cover_vertices() {
        let mesh = quad();
        assert_eq!(mesh.bounds.center, Vec3::new(0.5, 0.5, 0.0));
        assert_eq!(mesh.bounds.size, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(mesh.bounds.volume(), 0.0);
    }

    #[test]
    fn union_of_boxes() {
        let a = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::from_min_max(Vec3::splat(2.0), Vec3::splat(3.0));
        let u = a.union(&b);
        assert_eq!(u.min(), Vec3::ZERO);
        assert_eq!(u.max(), Vec3::splat(3.0));
    }

    #[test]
    fn similarity_requires_same_topology() {
        let a = quad();
        let mut b = quad();
        assert_eq!(a.similarity(&b), 1.0);

        b.vertices[0] = Vec3::splat(5.0);
        assert_eq!(a.similarity(&b), 0.75);

        b.indices.swap(0, 1);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn out_of_range_indices_are_detected() {
        let mut mesh = quad();
        assert!(!mesh.has_out_of_range_indices());
        mesh.indices[2] = 40;
        assert!(mesh.has_out_of_range_indices());
    }
}
