//! Disk loading for gtplanner.
//!
//! This module reads the binary repository image, reads and writes project
//! files (JSON) and loads extra machine profiles from CSV.

use csv::ReaderBuilder;
use serde::Deserialize;
use std::fs::{self, File};
use std::path::Path;

use tracing::debug;

use crate::error::ProjectError;
use crate::machines::{Coefficient, MachineProfile};
use crate::models::PageModel;
use crate::repository::Repository;

/// Loads a repository image from disk.
///
/// # Arguments
///
/// * `path` - Path to the decompressed image file
///
/// # Errors
///
/// Fails when the file cannot be read or the image is rejected, for example
/// because it was produced for a different format version.
pub fn load_image(path: &Path) -> Result<Repository, ProjectError> {
    let bytes = fs::read(path).map_err(|source| ProjectError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "read repository image");
    Ok(Repository::new(bytes)?)
}

/// Parses a project page from its JSON form.
///
/// Flow information and status are not part of the JSON and start empty.
///
/// # Example
///
/// ```
/// use gtplanner::data::project_from_json;
///
/// let page = project_from_json(r#"{"name": "Plates", "products": [{"goodsId": "i:plate", "amount": 60}]}"#).unwrap();
/// assert_eq!(page.products[0].amount, 60.0);
/// assert!(page.root_group.elements.is_empty());
/// ```
pub fn project_from_json(json: &str) -> Result<PageModel, ProjectError> {
    Ok(serde_json::from_str(json)?)
}

/// Serializes a project page to pretty-printed JSON.
pub fn project_to_json(page: &PageModel) -> Result<String, ProjectError> {
    Ok(serde_json::to_string_pretty(page)?)
}

/// Loads a project page from a JSON file.
pub fn load_project(path: &Path) -> Result<PageModel, ProjectError> {
    let json = fs::read_to_string(path).map_err(|source| ProjectError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    project_from_json(&json)
}

/// Writes a project page to a JSON file.
pub fn save_project(page: &PageModel, path: &Path) -> Result<(), ProjectError> {
    fs::write(path, project_to_json(page)?)?;
    Ok(())
}

/// One row of a machine profile CSV.
#[derive(Debug, Deserialize)]
struct MachineRow {
    name: String,
    parallels: Option<f64>,
    power: Option<f64>,
    speed: Option<f64>,
    perfect_overclocks: Option<f64>,
}

/// Loads constant machine profiles from a CSV file.
///
/// # CSV Format
///
/// Expected columns: `name, parallels, power, speed, perfect_overclocks`.
/// `name` is the crafter's display name; an empty numeric cell takes the
/// single-block default. Use `inf` for unlimited perfect overclocks.
pub fn load_machine_profiles(path: &Path) -> Result<Vec<MachineProfile>, ProjectError> {
    let file = File::open(path).map_err(|source| ProjectError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    read_machine_profiles(file)
}

/// Reads machine profiles from any CSV source.
pub fn read_machine_profiles<R: std::io::Read>(reader: R) -> Result<Vec<MachineProfile>, ProjectError> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut profiles = Vec::new();
    for result in rdr.deserialize() {
        let row: MachineRow = result?;
        profiles.push(MachineProfile {
            name: row.name,
            parallels: Coefficient::Constant(row.parallels.unwrap_or(1.0)),
            power: Coefficient::Constant(row.power.unwrap_or(1.0)),
            speed: Coefficient::Constant(row.speed.unwrap_or(1.0)),
            perfect_overclocks: Coefficient::Constant(row.perfect_overclocks.unwrap_or(0.0)),
            choices: Vec::new(),
        });
    }
    Ok(profiles)
}
