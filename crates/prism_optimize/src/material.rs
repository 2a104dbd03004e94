use std::collections::{BTreeSet, HashMap, btree_map::Entry};

use prism_core::{
    Error, Handle, Material, PropertyValue, Result, TextureCompression, TextureFormat,
    material::RESERVED_PROPERTIES,
};

/// Properties that outlive the alphabetical tail when shaders are reduced.
const PROPERTY_PRIORITY: [&str; 5] = [
    "normal_texture",
    "roughness",
    "metallic",
    "emissive",
    "occlusion_texture",
];

/// Downscales every texture according to `quality` and records the block
/// compression a GPU upload would use. Quality 1 keeps full resolution;
/// every third of the range below it halves both dimensions once more.
pub fn compress_textures(material: &Material, quality: f32) -> Result<Material> {
    unit_interval("texture compression quality", quality)?;

    let halvings = ((1.0 - quality) * 3.0).floor() as u32;
    let compression = if quality >= 0.75 {
        TextureCompression::Bc7
    } else if quality >= 0.4 {
        TextureCompression::Bc3
    } else {
        TextureCompression::Bc1
    };

    let mut out = material.clone();
    for texture in out.textures.values_mut() {
        let before = texture.footprint_bytes();
        texture.width = shrink(texture.width, halvings);
        texture.height = shrink(texture.height, halvings);
        if quality < 0.5 && texture.format == TextureFormat::Rgba16 {
            texture.format = TextureFormat::Rgba8;
        }
        texture.compression = compression;
        log::trace!(
            "Texture '{}' on '{}': {} -> {} bytes",
            texture.name,
            material.name,
            before,
            texture.footprint_bytes()
        );
    }
    Ok(out)
}

fn shrink(dimension: u32, halvings: u32) -> u32 {
    if dimension == 0 {
        0
    } else {
        (dimension >> halvings).max(1)
    }
}

/// Keeps the `ceil(target * n)` most important properties, never fewer than
/// the reserved ones present. Texture slots referenced only by dropped
/// properties go with them.
pub fn optimize_shader(material: &Material, target_complexity: f32) -> Result<Material> {
    unit_interval("target shader complexity", target_complexity)?;

    let total = material.properties.len();
    let reserved = material
        .properties
        .keys()
        .filter(|k| RESERVED_PROPERTIES.contains(&k.as_str()))
        .count();
    let budget = ((target_complexity * total as f32).ceil() as usize).max(reserved);

    let mut ranked: Vec<&String> = material.properties.keys().collect();
    ranked.sort_by(|a, b| priority(a).cmp(&priority(b)));
    let kept: BTreeSet<&String> = ranked.into_iter().take(budget).collect();

    let mut out = material.clone();
    out.properties.retain(|k, _| kept.contains(k));

    let still_used = texture_slots(out.properties.values());
    let orphaned: BTreeSet<String> = texture_slots(material.properties.values())
        .into_iter()
        .filter(|slot| !still_used.contains(slot) && !RESERVED_PROPERTIES.contains(&slot.as_str()))
        .collect();
    out.textures.retain(|slot, _| !orphaned.contains(slot));

    if out.properties.len() < total {
        log::debug!(
            "Reduced shader of '{}' from {} to {} properties, {} texture slots dropped",
            material.name,
            total,
            out.properties.len(),
            orphaned.len()
        );
    }
    Ok(out)
}

fn texture_slots<'a>(values: impl Iterator<Item = &'a PropertyValue>) -> BTreeSet<String> {
    values
        .filter_map(|v| match v {
            PropertyValue::Texture(slot) => Some(slot.clone()),
            _ => None,
        })
        .collect()
}

fn priority(key: &str) -> (usize, &str) {
    if RESERVED_PROPERTIES.contains(&key) {
        (0, key)
    } else if let Some(rank) = PROPERTY_PRIORITY.iter().position(|p| *p == key) {
        (1 + rank, key)
    } else {
        (1 + PROPERTY_PRIORITY.len(), key)
    }
}

/// Folds `materials` into one that keeps the first material's handle and
/// shader. On key collisions the first writer wins.
pub fn batch_materials(materials: &[Material]) -> Result<Material> {
    let Some(first) = materials.first() else {
        return Err(Error::invalid_argument("cannot batch an empty material list"));
    };

    let mut out = first.clone();
    if materials.len() > 1 {
        out.name = format!("{}_batch", first.name);
    }

    for material in &materials[1..] {
        if material.shader != first.shader {
            log::warn!(
                "Batching '{}' ({}) into shader '{}'",
                material.name,
                material.shader,
                first.shader
            );
        }
        for (key, value) in &material.properties {
            match out.properties.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(value.clone());
                }
                Entry::Occupied(existing) if existing.get() != value => {
                    log::warn!("Property '{key}' of '{}' collides, keeping earlier value", material.name);
                }
                Entry::Occupied(_) => {}
            }
        }
        for (slot, texture) in &material.textures {
            match out.textures.entry(slot.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(texture.clone());
                }
                Entry::Occupied(existing) if existing.get() != texture => {
                    log::warn!("Texture slot '{slot}' of '{}' collides, keeping earlier texture", material.name);
                }
                Entry::Occupied(_) => {}
            }
        }
    }
    Ok(out)
}

/// Output of `merge_similar_materials`: one representative per group and,
/// for each input position, the index of the representative it joined.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialMerge {
    pub materials: Vec<Material>,
    pub assignment: Vec<usize>,
}

impl MaterialMerge {
    /// Maps every input handle to the handle of its representative.
    pub fn handle_remap(&self, inputs: &[Material]) -> HashMap<Handle<Material>, Handle<Material>> {
        inputs
            .iter()
            .zip(&self.assignment)
            .map(|(input, group)| (input.id, self.materials[*group].id))
            .collect()
    }

    pub fn merged_count(&self) -> usize {
        self.assignment.len() - self.materials.len()
    }
}

/// Greedy partition in input order. A material joins the first group whose
/// representative shares its shader and scores at least `threshold`;
/// otherwise it starts a group. Representatives are kept unchanged.
pub fn merge_similar_materials(materials: &[Material], threshold: f32) -> Result<MaterialMerge> {
    unit_interval("material merge similarity threshold", threshold)?;

    let mut merge = MaterialMerge {
        materials: Vec::new(),
        assignment: Vec::with_capacity(materials.len()),
    };
    for material in materials {
        let group = merge.materials.iter().position(|representative| {
            representative.shader == material.shader && representative.similarity(material) >= threshold
        });
        match group {
            Some(group) => {
                log::debug!(
                    "Merging material '{}' into '{}'",
                    material.name,
                    merge.materials[group].name
                );
                merge.assignment.push(group);
            }
            None => {
                merge.materials.push(material.clone());
                merge.assignment.push(merge.materials.len() - 1);
            }
        }
    }
    Ok(merge)
}

fn unit_interval(what: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::invalid_configuration(format!(
            "{what} must be within [0, 1], got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::Texture;
    use prism_core::material::{BASE_COLOR, BASE_COLOR_TEXTURE};

    fn textured() -> Material {
        Material::new("brick", "pbr")
            .with_property(BASE_COLOR, PropertyValue::Color([1.0, 0.5, 0.5, 1.0]))
            .with_property(BASE_COLOR_TEXTURE, PropertyValue::Texture("albedo".into()))
            .with_property("normal_texture", PropertyValue::Texture("normal".into()))
            .with_property("roughness", PropertyValue::Number(0.8))
            .with_property("sheen", PropertyValue::Number(0.1))
            .with_property("clearcoat", PropertyValue::Number(0.0))
            .with_property("detail_texture", PropertyValue::Texture("detail".into()))
            .with_texture("albedo", Texture::new("brick_albedo", 2048, 2048, TextureFormat::Rgba16))
            .with_texture("normal", Texture::new("brick_normal", 1024, 1024, TextureFormat::Rgb8))
            .with_texture("detail", Texture::new("brick_detail", 512, 512, TextureFormat::R8))
    }

    #[test]
    fn compression_never_grows_memory() {
        let material = textured();
        let mut previous = material.texture_memory_bytes();
        for quality in [1.0, 0.8, 0.6, 0.45, 0.3, 0.1, 0.0] {
            let out = compress_textures(&material, quality).unwrap();
            let bytes = out.texture_memory_bytes();
            assert!(bytes <= material.texture_memory_bytes());
            assert!(bytes <= previous, "quality {quality} grew memory");
            previous = bytes;
        }
    }

    #[test]
    fn compression_levels() {
        let material = textured();

        let full = compress_textures(&material, 1.0).unwrap();
        assert_eq!(full.textures["albedo"].width, 2048);
        assert_eq!(full.textures["albedo"].compression, TextureCompression::Bc7);

        let low = compress_textures(&material, 0.2).unwrap();
        let albedo = &low.textures["albedo"];
        assert_eq!((albedo.width, albedo.height), (512, 512));
        assert_eq!(albedo.format, TextureFormat::Rgba8);
        assert_eq!(albedo.compression, TextureCompression::Bc1);

        assert!(matches!(
            compress_textures(&material, 1.5),
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn shader_reduction_keeps_reserved() {
        let material = textured();
        let out = optimize_shader(&material, 0.0).unwrap();
        assert_eq!(out.properties.len(), 2);
        assert!(out.properties.contains_key(BASE_COLOR));
        assert!(out.properties.contains_key(BASE_COLOR_TEXTURE));
        assert!(out.textures.contains_key("albedo"));
        assert!(!out.textures.contains_key("normal"));
        assert!(!out.textures.contains_key("detail"));
    }

    #[test]
    fn shader_reduction_ranks_known_properties() {
        let material = textured();
        // ceil(0.5 * 7) = 4: reserved pair, then normal_texture and roughness.
        let out = optimize_shader(&material, 0.5).unwrap();
        let keys: Vec<&str> = out.properties.keys().map(String::as_str).collect();
        assert_eq!(keys, vec![BASE_COLOR, BASE_COLOR_TEXTURE, "normal_texture", "roughness"]);
        assert!(out.textures.contains_key("normal"));
        assert!(out.complexity() <= material.complexity());

        let unchanged = optimize_shader(&material, 1.0).unwrap();
        assert_eq!(unchanged, material);
    }

    #[test]
    fn batch_first_writer_wins() {
        let a = Material::new("a", "pbr").with_property("roughness", PropertyValue::Number(0.2));
        let b = Material::new("b", "pbr")
            .with_property("roughness", PropertyValue::Number(0.9))
            .with_property("metallic", PropertyValue::Number(1.0));

        let out = batch_materials(&[a.clone(), b]).unwrap();
        assert_eq!(out.id, a.id);
        assert_eq!(out.properties["roughness"], PropertyValue::Number(0.2));
        assert_eq!(out.properties["metallic"], PropertyValue::Number(1.0));

        assert!(matches!(batch_materials(&[]), Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn merge_partitions_inputs() {
        let red = Material::new("red", "pbr").with_property(BASE_COLOR, PropertyValue::Color([1.0, 0.0, 0.0, 1.0]));
        let red_copy = Material { name: "red_copy".into(), id: Handle::new(), ..red.clone() };
        let blue = Material::new("blue", "pbr").with_property(BASE_COLOR, PropertyValue::Color([0.0, 0.0, 1.0, 1.0]));
        let red_unlit = Material { name: "red_unlit".into(), id: Handle::new(), shader: "unlit".into(), ..red.clone() };
        let inputs = vec![red.clone(), blue.clone(), red_copy.clone(), red_unlit];

        let merge = merge_similar_materials(&inputs, 0.9).unwrap();
        assert_eq!(merge.materials.len(), 3);
        assert_eq!(merge.assignment, vec![0, 1, 0, 2]);
        assert_eq!(merge.merged_count(), 1);

        let remap = merge.handle_remap(&inputs);
        assert_eq!(remap[&red_copy.id], red.id);
        assert_eq!(remap[&blue.id], blue.id);

        // Every input lands in exactly one group.
        assert_eq!(merge.assignment.len(), inputs.len());
        assert!(merge.assignment.iter().all(|g| *g < merge.materials.len()));
    }
}
