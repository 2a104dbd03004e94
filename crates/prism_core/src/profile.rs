use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    Stage,
    error::{Error, Result},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfilePreset {
    Desktop,
    Mobile,
    Archive,
}

/// Settings for one optimization run. Field names on disk follow the
/// camelCase option names (`instanceSimilarityThreshold`, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizationProfile {
    pub instance_similarity_threshold: f32,
    pub max_hierarchy_depth: u32,
    pub lod_levels: u32,
    pub lod_reduction_factors: Vec<f32>,
    /// 0 leaves polygon counts alone.
    pub target_polygon_count: u32,
    pub texture_compression_quality: f32,
    pub target_shader_complexity: f32,
    pub material_merge_similarity_threshold: f32,
    pub skip_stages: Vec<Stage>,
    pub merge_static_meshes: bool,
    pub vertex_weld_epsilon: f32,
    pub high_resolution_texels: u64,
    pub high_texture_count: usize,
}

impl Default for OptimizationProfile {
    fn default() -> Self {
        Self::preset(ProfilePreset::Desktop)
    }
}

impl OptimizationProfile {
    pub fn preset(preset: ProfilePreset) -> Self {
        let base = Self {
            instance_similarity_threshold: 0.99,
            max_hierarchy_depth: 8,
            lod_levels: 3,
            lod_reduction_factors: vec![0.5, 0.25, 0.125],
            target_polygon_count: 0,
            texture_compression_quality: 0.9,
            target_shader_complexity: 1.0,
            material_merge_similarity_threshold: 0.95,
            skip_stages: Vec::new(),
            merge_static_meshes: false,
            vertex_weld_epsilon: 1e-5,
            high_resolution_texels: 1024 * 1024,
            high_texture_count: 4,
        };

        match preset {
            ProfilePreset::Desktop => base,
            ProfilePreset::Mobile => Self {
                instance_similarity_threshold: 0.95,
                max_hierarchy_depth: 4,
                lod_reduction_factors: vec![0.5, 0.25, 0.1],
                target_polygon_count: 5_000,
                texture_compression_quality: 0.5,
                target_shader_complexity: 0.6,
                material_merge_similarity_threshold: 0.85,
                merge_static_meshes: true,
                high_resolution_texels: 512 * 512,
                ..base
            },
            ProfilePreset::Archive => Self {
                instance_similarity_threshold: 1.0,
                max_hierarchy_depth: 16,
                lod_levels: 0,
                lod_reduction_factors: Vec::new(),
                texture_compression_quality: 1.0,
                material_merge_similarity_threshold: 1.0,
                ..base
            },
        }
    }

    pub fn is_stage_enabled(&self, stage: Stage) -> bool {
        !self.skip_stages.contains(&stage)
    }

    /// Checks every documented bound; the error names the offending option.
    pub fn validate(&self) -> Result<()> {
        unit_interval("instanceSimilarityThreshold", self.instance_similarity_threshold)?;
        unit_interval("textureCompressionQuality", self.texture_compression_quality)?;
        unit_interval("targetShaderComplexity", self.target_shader_complexity)?;
        unit_interval(
            "materialMergeSimilarityThreshold",
            self.material_merge_similarity_threshold,
        )?;
        validate_lod_factors(self.lod_levels as usize, &self.lod_reduction_factors)?;

        if !(self.vertex_weld_epsilon.is_finite() && self.vertex_weld_epsilon > 0.0) {
            return Err(Error::invalid_configuration(format!(
                "vertexWeldEpsilon must be a positive number, got {}",
                self.vertex_weld_epsilon
            )));
        }
        if self.high_texture_count == 0 {
            return Err(Error::invalid_configuration("highTextureCount must be at least 1"));
        }
        Ok(())
    }

    /// Reads a JSON profile and validates it.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::not_found(path),
            _ => Error::Io(e),
        })?;
        let profile: Self =
            serde_json::from_str(&contents).map_err(|e| Error::parse(path, e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::invalid_argument(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// LOD factors: one per level, each in (0, 1], strictly decreasing.
pub fn validate_lod_factors(levels: usize, factors: &[f32]) -> Result<()> {
    if factors.len() != levels {
        return Err(Error::invalid_configuration(format!(
            "lodReductionFactors has {} entries but lodLevels is {}",
            factors.len(),
            levels
        )));
    }
    for (i, factor) in factors.iter().enumerate() {
        if !(factor.is_finite() && *factor > 0.0 && *factor <= 1.0) {
            return Err(Error::invalid_configuration(format!(
                "lodReductionFactors[{i}] = {factor} is outside (0, 1]"
            )));
        }
    }
    if let Some(pair) = factors.windows(2).find(|w| w[1] >= w[0]) {
        return Err(Error::invalid_configuration(format!(
            "lodReductionFactors must be strictly decreasing ({} then {})",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

fn unit_interval(option: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::invalid_configuration(format!(
            "{option} must be within [0, 1], got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for preset in [ProfilePreset::Desktop, ProfilePreset::Mobile, ProfilePreset::Archive] {
            OptimizationProfile::preset(preset).validate().unwrap();
        }
    }

    #[test]
    fn rejects_non_decreasing_lod_factors() {
        let profile = OptimizationProfile {
            lod_levels: 2,
            lod_reduction_factors: vec![0.5, 0.5],
            ..Default::default()
        };
        assert!(matches!(
            profile.validate(),
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let profile = OptimizationProfile {
            material_merge_similarity_threshold: 1.5,
            ..Default::default()
        };
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("materialMergeSimilarityThreshold"));
    }

    #[test]
    fn json_uses_camel_case_and_defaults() {
        let profile: OptimizationProfile =
            serde_json::from_str(r#"{ "maxHierarchyDepth": 2, "skipStages": ["flattening"] }"#)
                .unwrap();
        assert_eq!(profile.max_hierarchy_depth, 2);
        assert!(!profile.is_stage_enabled(Stage::Flattening));
        assert_eq!(profile.lod_levels, 3);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mobile.json");
        let profile = OptimizationProfile::preset(ProfilePreset::Mobile);
        profile.save_to_file(&path).unwrap();
        assert_eq!(OptimizationProfile::load_from_file(&path).unwrap(), profile);

        let missing = OptimizationProfile::load_from_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }
}
