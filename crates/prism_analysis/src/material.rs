use std::collections::HashSet;

use prism_core::{Handle, Material, OptimizationProfile, Result, Scene};

use crate::Analyzer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialThresholds {
    /// Textures with at least this many texels are high resolution.
    pub high_resolution_texels: u64,
    /// Materials with more texture slots than this are flagged.
    pub high_texture_count: usize,
}

impl Default for MaterialThresholds {
    fn default() -> Self {
        Self {
            high_resolution_texels: 1024 * 1024,
            high_texture_count: 4,
        }
    }
}

impl MaterialThresholds {
    pub fn from_profile(profile: &OptimizationProfile) -> Self {
        Self {
            high_resolution_texels: profile.high_resolution_texels,
            high_texture_count: profile.high_texture_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HighResolutionTexture {
    pub material: String,
    pub slot: String,
    pub width: u32,
    pub height: u32,
}

/// Materials with equal shader, properties and textures. The first member
/// is the one the others could be replaced by.
#[derive(Debug, Clone, PartialEq)]
pub struct RedundancyGroup {
    pub members: Vec<Handle<Material>>,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialReport {
    pub total_materials: usize,
    /// Distinct material names.
    pub unique_materials: usize,
    pub total_textures: usize,
    pub texture_memory_bytes: u64,
    pub average_texture_memory_bytes: u64,
    pub high_resolution_textures: Vec<HighResolutionTexture>,
    pub high_texture_count_materials: Vec<String>,
    pub redundancy_groups: Vec<RedundancyGroup>,
    /// Materials that could be removed by collapsing redundancy groups.
    pub reduction_opportunities: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialAnalyzer {
    thresholds: MaterialThresholds,
}

impl MaterialAnalyzer {
    pub fn new(thresholds: MaterialThresholds) -> Self {
        Self { thresholds }
    }
}

impl Analyzer for MaterialAnalyzer {
    type Report = MaterialReport;

    fn analyze(&self, scene: &Scene) -> Result<MaterialReport> {
        scene.validate()?;

        let materials = scene.materials();
        if materials.is_empty() {
            log::debug!("Scene '{}' has no materials", scene.name);
            return Ok(MaterialReport::default());
        }

        let mut report = MaterialReport {
            total_materials: materials.len(),
            unique_materials: materials
                .iter()
                .map(|m| m.name.as_str())
                .collect::<HashSet<_>>()
                .len(),
            ..Default::default()
        };

        for material in materials {
            report.total_textures += material.textures.len();
            report.texture_memory_bytes += material.texture_memory_bytes();

            for (slot, texture) in &material.textures {
                if texture.texel_count() >= self.thresholds.high_resolution_texels {
                    report.high_resolution_textures.push(HighResolutionTexture {
                        material: material.name.clone(),
                        slot: slot.clone(),
                        width: texture.width,
                        height: texture.height,
                    });
                }
            }
            if material.textures.len() > self.thresholds.high_texture_count {
                report.high_texture_count_materials.push(material.name.clone());
            }
        }

        if report.total_textures > 0 {
            report.average_texture_memory_bytes =
                report.texture_memory_bytes / report.total_textures as u64;
        }

        report.redundancy_groups = redundancy_groups(materials);
        report.reduction_opportunities = report
            .redundancy_groups
            .iter()
            .map(|g| g.members.len() - 1)
            .sum();

        log::debug!(
            "Materials of '{}': {} total, {} redundant, {} bytes of textures",
            scene.name,
            report.total_materials,
            report.reduction_opportunities,
            report.texture_memory_bytes
        );
        Ok(report)
    }
}

/// Groups equivalent materials in first-occurrence order; singletons are
/// left out.
pub fn redundancy_groups(materials: &[Material]) -> Vec<RedundancyGroup> {
    let mut groups: Vec<Vec<&Material>> = Vec::new();
    for material in materials {
        match groups.iter_mut().find(|g| g[0].is_equivalent(material)) {
            Some(group) => group.push(material),
            None => groups.push(vec![material]),
        }
    }

    groups
        .into_iter()
        .filter(|g| g.len() > 1)
        .map(|g| RedundancyGroup {
            members: g.iter().map(|m| m.id).collect(),
            names: g.iter().map(|m| m.name.clone()).collect(),
        })
        .collect()
}
