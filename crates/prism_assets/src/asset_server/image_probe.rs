use std::path::Path;

use prism_core::Scene;

/// Fills in the size of textures that only know their image file.
/// Unreadable images are logged and left at zero.
pub fn probe_textures(scene: &mut Scene, base: &Path) {
    let needs_probe = scene.materials().iter().any(|m| {
        m.textures
            .values()
            .any(|t| t.source.is_some() && (t.width == 0 || t.height == 0))
    });
    if !needs_probe {
        return;
    }

    for material in scene.materials_mut() {
        for texture in material.textures.values_mut() {
            let Some(source) = &texture.source else {
                continue;
            };
            if texture.width != 0 && texture.height != 0 {
                continue;
            }
            let path = base.join(source);
            match image::image_dimensions(&path) {
                Ok((width, height)) => {
                    log::debug!("Texture '{}' is {}x{}", texture.name, width, height);
                    texture.width = width;
                    texture.height = height;
                }
                Err(e) => log::warn!("Could not read size of {}: {}", path.display(), e),
            }
        }
    }
}
