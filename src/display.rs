//! Display and formatting utilities for gtplanner.
//!
//! This module formats solved pages, search results and recipe listings for
//! the console, and writes flow reports as CSV.

use std::io::Write;

use serde::Serialize;

use crate::error::ProjectError;
use crate::models::{FlowInformation, PageModel, RecipeGroupEntry, RecipeGroupModel, RecipeModel};
use crate::repository::Repository;
use crate::schema::{Goods, Recipe, RecipeIoType, SearchableObject, TICKS_PER_SECOND};

/// Formats a duration in seconds to a human-readable string.
///
/// # Example
///
/// ```
/// use gtplanner::display::format_time;
///
/// assert_eq!(format_time(3665.0), "1h 1m 5s");
/// assert_eq!(format_time(125.0), "2m 5s");
/// assert_eq!(format_time(45.0), "45s");
/// ```
pub fn format_time(seconds: f64) -> String {
    let hours = (seconds / 3600.0).floor();
    let minutes = ((seconds % 3600.0) / 60.0).floor();
    let secs = seconds % 60.0;

    if hours > 0.0 {
        format!("{}h {}m {:.0}s", hours, minutes, secs)
    } else if minutes > 0.0 {
        format!("{}m {:.0}s", minutes, secs)
    } else {
        format!("{:.0}s", secs)
    }
}

/// Formats a per-minute amount compactly.
///
/// Small amounts keep up to two decimals, large ones get a `k` or `M` suffix.
///
/// ```
/// use gtplanner::display::format_amount;
///
/// assert_eq!(format_amount(60.0), "60");
/// assert_eq!(format_amount(1.25), "1.25");
/// assert_eq!(format_amount(0.333333), "0.33");
/// assert_eq!(format_amount(25000.0), "25.0k");
/// assert_eq!(format_amount(3_500_000.0), "3.50M");
/// ```
pub fn format_amount(amount: f64) -> String {
    let magnitude = amount.abs();
    if magnitude >= 1_000_000.0 {
        format!("{:.2}M", amount / 1_000_000.0)
    } else if magnitude >= 10_000.0 {
        format!("{:.1}k", amount / 1000.0)
    } else {
        let text = format!("{:.2}", amount);
        let text = text.trim_end_matches('0').trim_end_matches('.');
        if text == "-0" {
            "0".to_string()
        } else {
            text.to_string()
        }
    }
}

/// Display name of a goods or ore-dict id, falling back to the id itself.
pub fn goods_name(repository: &Repository, id: &str) -> String {
    match repository.get_by_id(id) {
        Some(SearchableObject::Recipe(_)) | None => id.to_string(),
        Some(object) => object.name().to_string(),
    }
}

fn print_flow(repository: &Repository, flow: &FlowInformation, indent: &str) {
    for (id, amount) in &flow.input {
        println!("{indent}  in   {:>10}/min  {}", format_amount(*amount), goods_name(repository, id));
    }
    for (id, amount) in &flow.output {
        println!("{indent}  out  {:>10}/min  {}", format_amount(*amount), goods_name(repository, id));
    }
    for (tier, eu) in &flow.energy {
        println!("{indent}  power {:>9} EU/t  {}", format_amount(*eu), tier);
    }
}

fn print_recipe(repository: &Repository, recipe: &RecipeModel, indent: &str) {
    let Some(solution) = &recipe.solution else {
        println!("{indent}- {} (unresolved)", recipe.recipe_id);
        return;
    };
    let crafter = solution
        .crafter_id
        .as_deref()
        .map(|id| goods_name(repository, id))
        .unwrap_or_else(|| "instant".to_string());
    match solution.crafter_count {
        Some(count) => println!(
            "{indent}- {} x {} {} [{}] ({}/min)",
            format_amount(count),
            recipe.voltage_tier,
            crafter,
            recipe.recipe_id,
            format_amount(solution.executions)
        ),
        None => println!(
            "{indent}- {} [{}] ({}/min)",
            crafter,
            recipe.recipe_id,
            format_amount(solution.executions)
        ),
    }
    for (ore_dict, item) in &solution.ore_dicts {
        println!("{indent}  {} -> {}", goods_name(repository, ore_dict), goods_name(repository, item));
    }
}

fn print_group(repository: &Repository, group: &RecipeGroupModel, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{indent}[{}]", if group.name.is_empty() { "group" } else { group.name.as_str() });
    for entry in &group.elements {
        match entry {
            RecipeGroupEntry::Recipe(recipe) => print_recipe(repository, recipe, &indent),
            RecipeGroupEntry::Group(child) => print_group(repository, child, depth + 1),
        }
    }
}

/// Displays a solved page to stdout.
///
/// This function prints:
/// - The page status and products
/// - The recipe tree with machine counts and executions
/// - The page's net flow and power draw
pub fn display_page(repository: &Repository, page: &PageModel) {
    println!();
    println!("+================================================================+");
    println!("|                  GTPLANNER PRODUCTION RESULTS                  |");
    println!("+================================================================+");
    println!();
    println!("  Page:    {}", page.name);
    println!("  Status:  {:?}", page.status);

    println!();
    println!("[PRODUCTS]");
    println!("----------------------------------------------------------------");
    for product in &page.products {
        println!(
            "  {:>10}/min  {}",
            format_amount(product.amount),
            goods_name(repository, &product.goods_id)
        );
    }

    println!();
    println!("[RECIPES]");
    println!("----------------------------------------------------------------");
    print_group(repository, &page.root_group, 1);

    println!();
    println!("[SUMMARY]");
    println!("----------------------------------------------------------------");
    print_flow(repository, &page.root_group.flow, "");
    println!(
        "  Total power: {} EU/t",
        format_amount(page.root_group.flow.total_energy())
    );
    println!();
}

/// Displays catalog search results.
pub fn display_search_results(results: &[Goods<'_>]) {
    if results.is_empty() {
        println!("[SEARCH] No matching goods.");
        return;
    }
    println!("{:<32} {:<28} {}", "Id", "Name", "Mod");
    println!("----------------------------------------------------------------");
    for goods in results {
        println!("{:<32} {:<28} {}", goods.id(), goods.name(), goods.mod_name());
    }
}

/// Displays a recipe with its machine parameters and slots.
pub fn display_recipe(recipe: &Recipe<'_>) {
    let recipe_type = recipe
        .recipe_type()
        .map(|t| t.name().to_string())
        .unwrap_or_else(|| "?".to_string());
    println!("{} ({})", recipe.id(), recipe_type);
    if let Some(gt) = recipe.gt_recipe() {
        println!(
            "  {} EU/t x{}A for {} (tier {})",
            gt.voltage(),
            gt.amperage(),
            format_time(f64::from(gt.duration_ticks()) / TICKS_PER_SECOND),
            gt.voltage_tier()
        );
        if gt.clean_room() {
            println!("  requires clean room");
        }
        if gt.low_gravity() {
            println!("  requires low gravity");
        }
    }
    for io in recipe.items() {
        let arrow = if io.io_type.is_input() { "<-" } else { "->" };
        let chance = if io.probability < 1.0 {
            format!(" ({:.0}%)", io.probability * 100.0)
        } else {
            String::new()
        };
        let tag = if io.io_type == RecipeIoType::OreDictInput { " (any)" } else { "" };
        println!("  {arrow} {} x {}{tag}{chance}", io.amount, io.goods.name());
    }
}

/// One row of the CSV flow report.
#[derive(Debug, Serialize)]
struct FlowRow<'a> {
    node: &'a str,
    recipe: &'a str,
    direction: &'static str,
    goods: &'a str,
    name: String,
    amount: f64,
}

fn write_flow_rows<W: Write>(
    repository: &Repository,
    writer: &mut csv::Writer<W>,
    node: &str,
    recipe: &str,
    flow: &FlowInformation,
) -> Result<(), ProjectError> {
    for (direction, side) in [("input", &flow.input), ("output", &flow.output)] {
        for (id, amount) in side {
            writer.serialize(FlowRow {
                node,
                recipe,
                direction,
                goods: id,
                name: goods_name(repository, id),
                amount: *amount,
            })?;
        }
    }
    for (tier, eu) in &flow.energy {
        writer.serialize(FlowRow {
            node,
            recipe,
            direction: "energy",
            goods: tier.name(),
            name: tier.to_string(),
            amount: *eu,
        })?;
    }
    Ok(())
}

fn write_group_rows<W: Write>(
    repository: &Repository,
    writer: &mut csv::Writer<W>,
    group: &RecipeGroupModel,
    path: &str,
) -> Result<(), ProjectError> {
    for entry in &group.elements {
        match entry {
            RecipeGroupEntry::Recipe(recipe) => {
                write_flow_rows(repository, writer, path, &recipe.recipe_id, &recipe.flow)?;
            }
            RecipeGroupEntry::Group(child) => {
                let child_path = format!("{path}/{}", child.name);
                write_group_rows(repository, writer, child, &child_path)?;
            }
        }
    }
    write_flow_rows(repository, writer, path, "", &group.flow)
}

/// Writes every node's flow of a solved page as CSV.
///
/// # CSV Format
///
/// Columns: `node, recipe, direction, goods, name, amount`. `node` is the
/// slash-separated group path; group totals have an empty `recipe`.
/// Energy rows carry the voltage tier in `goods` and EU/t in `amount`.
pub fn write_flow_csv<W: Write>(
    repository: &Repository,
    page: &PageModel,
    writer: W,
) -> Result<(), ProjectError> {
    let mut writer = csv::Writer::from_writer(writer);
    let root = if page.root_group.name.is_empty() {
        "root".to_string()
    } else {
        page.root_group.name.clone()
    };
    write_group_rows(repository, &mut writer, &page.root_group, &root)?;
    writer.flush()?;
    Ok(())
}
