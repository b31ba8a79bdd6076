//! Tests for display and formatting utilities.

use gtplanner::display::{format_amount, format_time, goods_name, write_flow_csv};
use gtplanner::machines::VoltageTier;
use gtplanner::models::{PageModel, RecipeGroupModel, RecipeModel};
use gtplanner::test_utils::sample_catalog;

#[test]
fn test_format_time_seconds() {
    assert_eq!(format_time(30.0), "30s");
    assert_eq!(format_time(59.0), "59s");
}

#[test]
fn test_format_time_minutes() {
    assert_eq!(format_time(60.0), "1m 0s");
    assert_eq!(format_time(90.0), "1m 30s");
    assert_eq!(format_time(300.0), "5m 0s");
}

#[test]
fn test_format_time_hours() {
    assert_eq!(format_time(3600.0), "1h 0m 0s");
    assert_eq!(format_time(3661.0), "1h 1m 1s");
}

#[test]
fn test_format_time_zero() {
    assert_eq!(format_time(0.0), "0s");
}

#[test]
fn test_format_amount_trims_zeros() {
    assert_eq!(format_amount(0.0), "0");
    assert_eq!(format_amount(2.5), "2.5");
    assert_eq!(format_amount(1.999), "2");
    assert_eq!(format_amount(-0.001), "0");
    assert_eq!(format_amount(-12.0), "-12");
}

#[test]
fn test_format_amount_suffixes() {
    assert_eq!(format_amount(9999.0), "9999");
    assert_eq!(format_amount(10_000.0), "10.0k");
    assert_eq!(format_amount(1_000_000.0), "1.00M");
}

#[test]
fn test_goods_name_falls_back_to_id() {
    let repository = sample_catalog().build_repository();
    assert_eq!(goods_name(&repository, "i:plate"), "Iron Plate");
    assert_eq!(goods_name(&repository, "o:ingotIron"), "ingotIron");
    assert_eq!(goods_name(&repository, "r:plate"), "r:plate");
    assert_eq!(goods_name(&repository, "i:unknown"), "i:unknown");
}

#[test]
fn test_flow_csv_lists_every_node() {
    let repository = sample_catalog().build_repository();
    let mut page = PageModel::new("Plates");
    let mut plate = RecipeModel::new("r:plate", VoltageTier::LV);
    plate.flow.add_input("i:ingot", 60.0);
    plate.flow.add_output("i:plate", 60.0);
    plate.flow.add_energy(VoltageTier::LV, 150.0);
    page.root_group.push_recipe(plate);

    let mut ingots = RecipeGroupModel::new("ingots");
    let mut ingot = RecipeModel::new("r:ingot", VoltageTier::LV);
    ingot.flow.add_input("i:ore", 60.0);
    ingots.push_recipe(ingot);
    page.root_group.push_group(ingots);
    page.root_group.flow.add_input("i:ore", 60.0);

    let mut out = Vec::new();
    write_flow_csv(&repository, &page, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines[0], "node,recipe,direction,goods,name,amount");
    assert!(lines[1].starts_with("root,r:plate,input,i:ingot,Iron Ingot,60"));
    assert!(lines[2].starts_with("root,r:plate,output,i:plate,Iron Plate,60"));
    assert!(lines[3].starts_with("root,r:plate,energy,LV,LV,150"));
    assert!(lines[4].starts_with("root/ingots,r:ingot,input,i:ore,Iron Ore,60"));
    assert!(lines[5].starts_with("root,,input,i:ore,Iron Ore,60"));
    assert_eq!(lines.len(), 6);
}
