use std::path::{Path, PathBuf};

pub mod batch_events;
pub mod control;
pub mod processor;

pub use batch_events::BatchEvent;
pub use control::{BatchControl, BatchState};
pub use processor::{BatchFailure, BatchProcessor, BatchSummary};

/// Name of the folder optimized scenes are written to, next to the input.
pub const OUTPUT_FOLDER: &str = "Optimized";

/// `dir/name.ext` becomes `dir/Optimized/name_optimized.ext`.
pub fn output_path(input: &Path) -> PathBuf {
    let dir = input.parent().unwrap_or(Path::new(""));
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();

    let mut file_name = format!("{stem}_optimized");
    if let Some(extension) = input.extension() {
        file_name.push('.');
        file_name.push_str(&extension.to_string_lossy());
    }
    dir.join(OUTPUT_FOLDER).join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_goes_to_subfolder_with_suffix() {
        assert_eq!(
            output_path(Path::new("/data/levels/castle.scene")),
            PathBuf::from("/data/levels/Optimized/castle_optimized.scene")
        );
        assert_eq!(
            output_path(Path::new("crate.obj")),
            PathBuf::from("Optimized/crate_optimized.obj")
        );
        assert_eq!(
            output_path(Path::new("dir/README")),
            PathBuf::from("dir/Optimized/README_optimized")
        );
    }
}
