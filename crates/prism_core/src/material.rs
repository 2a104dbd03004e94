use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::assets::Handle;

pub const BASE_COLOR: &str = "base_color";
pub const BASE_COLOR_TEXTURE: &str = "base_color_texture";

/// Properties no optimizer pass may drop.
pub const RESERVED_PROPERTIES: [&str; 2] = [BASE_COLOR, BASE_COLOR_TEXTURE];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    Rgba8,  // Standard 32-bit color (0-255)
    Rgb8,   // No alpha
    Rgba16, // 16 bits per channel
    R8,     // Grayscale masks
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u64 {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgb8 => 3,
            TextureFormat::Rgba16 => 8,
            TextureFormat::R8 => 1,
        }
    }
}

/// Block compression recorded on a texture by the material optimizer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureCompression {
    #[default]
    None,
    Bc1,
    Bc3,
    Bc7,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    #[serde(default)]
    pub mipmaps: bool,
    #[serde(default)]
    pub compression: TextureCompression,
    /// Image file this texture was read from, relative to the scene file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Texture {
    pub fn new(name: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format,
            mipmaps: false,
            compression: TextureCompression::None,
            source: None,
        }
    }

    pub fn texel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// width × height × bytes-per-pixel. Always derived, never stored.
    pub fn footprint_bytes(&self) -> u64 {
        self.texel_count() * self.format.bytes_per_pixel()
    }
}

/// Closed set of values a material property can hold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    Number(f32),
    Color([f32; 4]),
    /// Name of a texture slot on the same material.
    Texture(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: Handle<Material>,
    pub name: String,
    pub shader: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub textures: BTreeMap<String, Texture>,
}

impl Material {
    pub fn new(name: impl Into<String>, shader: impl Into<String>) -> Self {
        Self {
            id: Handle::new(),
            name: name.into(),
            shader: shader.into(),
            properties: BTreeMap::new(),
            textures: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_texture(mut self, slot: impl Into<String>, texture: Texture) -> Self {
        self.textures.insert(slot.into(), texture);
        self
    }

    pub fn texture_memory_bytes(&self) -> u64 {
        self.textures.values().map(Texture::footprint_bytes).sum()
    }

    /// Shader cost proxy used by `OptimizeShader`.
    pub fn complexity(&self) -> usize {
        self.properties.len()
    }

    /// Fraction of property and texture-slot keys whose values are equal.
    /// Different shaders never match; two empty materials match fully.
    pub fn similarity(&self, other: &Material) -> f32 {
        if self.shader != other.shader {
            return 0.0;
        }

        let property_keys: BTreeSet<&String> =
            self.properties.keys().chain(other.properties.keys()).collect();
        let slot_keys: BTreeSet<&String> =
            self.textures.keys().chain(other.textures.keys()).collect();
        let total = property_keys.len() + slot_keys.len();
        if total == 0 {
            return 1.0;
        }

        let equal_properties = property_keys
            .iter()
            .filter(|k| self.properties.get(**k) == other.properties.get(**k))
            .count();
        let equal_slots = slot_keys
            .iter()
            .filter(|k| self.textures.get(**k) == other.textures.get(**k))
            .count();

        (equal_properties + equal_slots) as f32 / total as f32
    }

    /// Same shader, properties and textures. Names and handles are ignored.
    pub fn is_equivalent(&self, other: &Material) -> bool {
        self.shader == other.shader
            && self.properties == other.properties
            && self.textures == other.textures
    }
}
