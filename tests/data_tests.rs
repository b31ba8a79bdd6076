//! Tests for project, image and machine profile loading.

use std::path::Path;

use gtplanner::data::{
    load_image, load_project, project_from_json, project_to_json, read_machine_profiles,
    save_project,
};
use gtplanner::error::{ProjectError, RepositoryError};
use gtplanner::machines::{Coefficient, VoltageTier};
use gtplanner::models::{LinkAlgorithm, PageModel, RecipeGroupModel, RecipeModel};
use gtplanner::repository::FORMAT_VERSION;
use gtplanner::test_utils::{sample_catalog, ImageBuilder};

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("gtplanner-{}-{name}", std::process::id()))
}

fn constant(coefficient: &Coefficient) -> f64 {
    match coefficient {
        Coefficient::Constant(value) => *value,
        other => panic!("expected a constant, got {other:?}"),
    }
}

#[test]
fn test_project_json_round_trip() {
    let mut page = PageModel::new("Gears");
    page.add_product("i:gear", 10.0);
    let mut node = RecipeModel::new("r:lcr", VoltageTier::EV);
    node.fixed_crafter_count = Some(2.0);
    node.choices.insert("coils".to_string(), 3.0);
    page.root_group.push_recipe(node);
    let mut group = RecipeGroupModel::new("plates");
    group.set_link("i:plate", LinkAlgorithm::Ignore);
    page.root_group.push_group(group);

    let json = project_to_json(&page).unwrap();
    let back = project_from_json(&json).unwrap();
    assert_eq!(back, page);
}

#[test]
fn test_project_json_rejects_unknown_element() {
    let json = r#"{"rootGroup": {"elements": [{"type": "machine"}]}}"#;
    assert!(matches!(project_from_json(json), Err(ProjectError::Json(_))));
}

#[test]
fn test_save_and_load_project() {
    let path = temp_path("project.json");
    let mut page = PageModel::new("Saved");
    page.add_product("i:plate", 60.0);
    save_project(&page, &path).unwrap();
    let loaded = load_project(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded.name, "Saved");
    assert_eq!(loaded.products, page.products);
}

#[test]
fn test_load_missing_project_reports_path() {
    let err = load_project(Path::new("/nonexistent/page.json")).unwrap_err();
    match err {
        ProjectError::Read { path, .. } => assert_eq!(path, Path::new("/nonexistent/page.json")),
        other => panic!("expected a read error, got {other:?}"),
    }
}

#[test]
fn test_load_image_from_file() {
    let path = temp_path("data.bin");
    std::fs::write(&path, sample_catalog().build()).unwrap();
    let repository = load_image(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(repository.version(), FORMAT_VERSION);
    assert!(repository.get_item("i:plate").is_some());
}

#[test]
fn test_load_image_rejects_other_version() {
    let path = temp_path("old.bin");
    std::fs::write(&path, ImageBuilder::new().with_version(3).build()).unwrap();
    let result = load_image(&path);
    std::fs::remove_file(&path).ok();
    assert!(matches!(
        result,
        Err(ProjectError::Repository(RepositoryError::VersionMismatch { found: 3, .. }))
    ));
}

#[test]
fn test_read_machine_profiles() {
    let csv = "name,parallels,power,speed,perfect_overclocks\n\
               Large Chemical Reactor,,,,inf\n\
               Industrial Sawmill, 4 ,0.8,2.0,\n";
    let profiles = read_machine_profiles(csv.as_bytes()).unwrap();
    assert_eq!(profiles.len(), 2);

    let lcr = &profiles[0];
    assert_eq!(lcr.name, "Large Chemical Reactor");
    assert_eq!(constant(&lcr.parallels), 1.0);
    assert_eq!(constant(&lcr.power), 1.0);
    assert!(constant(&lcr.perfect_overclocks).is_infinite());

    let saw = &profiles[1];
    assert_eq!(constant(&saw.parallels), 4.0);
    assert_eq!(constant(&saw.power), 0.8);
    assert_eq!(constant(&saw.speed), 2.0);
    assert_eq!(constant(&saw.perfect_overclocks), 0.0);
    assert!(saw.choices.is_empty());
}

#[test]
fn test_read_machine_profiles_rejects_bad_number() {
    let csv = "name,parallels,power,speed,perfect_overclocks\nBroken,many,,,\n";
    assert!(matches!(
        read_machine_profiles(csv.as_bytes()),
        Err(ProjectError::Csv(_))
    ));
}
