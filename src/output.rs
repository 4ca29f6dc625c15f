use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_OUTPUT_FILE_NAME: &str = "entityClassnames.properties";

/// Subdirectory of the build directory that relative output files live in.
pub fn default_output_dir(build_dir: &Path) -> PathBuf {
    build_dir.join("generated-sources").join("entity-finder")
}

#[derive(Debug, Error)]
pub enum OutputFileError {
    #[error("{} exists but is not a directory", .0.display())]
    NotDirectory(PathBuf),
    #[error("directory {} exists but cannot be written to", .0.display())]
    NotWritableDirectory(PathBuf),
    #[error("{} is a regular file but cannot be written to", .0.display())]
    NotWritableFile(PathBuf),
    #[error("{} is neither a directory nor a normal file", .0.display())]
    NotNormalFile(PathBuf),
    #[error("some portion of the output directory path {} could not be created", .path.display())]
    PathCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolves where the properties file goes and makes sure its directory
/// exists and is writable. The file itself is not created.
pub fn initialize_output_file(
    output_file: Option<&Path>,
    build_dir: &Path,
) -> Result<PathBuf, OutputFileError> {
    let resolved = match output_file {
        None => {
            let dir = default_output_dir(build_dir);
            validate_output_dir(&dir)?;
            dir.join(DEFAULT_OUTPUT_FILE_NAME)
        }
        Some(file) => {
            let file = if file.is_absolute() {
                file.to_path_buf()
            } else {
                let dir = default_output_dir(build_dir);
                validate_output_dir(&dir)?;
                dir.join(file)
            };

            if file.is_dir() {
                validate_output_dir(&file)?;
                file.join(DEFAULT_OUTPUT_FILE_NAME)
            } else {
                if let Ok(metadata) = fs::metadata(&file) {
                    if !metadata.is_file() {
                        return Err(OutputFileError::NotNormalFile(file));
                    }
                    if metadata.permissions().readonly() {
                        return Err(OutputFileError::NotWritableFile(file));
                    }
                }
                if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                    validate_output_dir(parent)?;
                }
                file
            }
        }
    };
    debug!("Output file initialized to {}", resolved.display());
    Ok(resolved)
}

fn validate_output_dir(dir: &Path) -> Result<(), OutputFileError> {
    match fs::metadata(dir) {
        Ok(metadata) if !metadata.is_dir() => Err(OutputFileError::NotDirectory(dir.to_path_buf())),
        Ok(metadata) if metadata.permissions().readonly() => {
            Err(OutputFileError::NotWritableDirectory(dir.to_path_buf()))
        }
        Ok(_) => Ok(()),
        Err(_) => fs::create_dir_all(dir).map_err(|source| OutputFileError::PathCreationFailed {
            path: dir.to_path_buf(),
            source,
        }),
    }
}
