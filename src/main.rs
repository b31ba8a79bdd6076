//! gtplanner - Command Line Interface
//!
//! This is the main entry point for the production planner.
//! Run with `--help` to see all available options.

use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs::File;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use gtplanner::{
    calculator::{Calculator, CalculatorConfig},
    data::{load_image, load_machine_profiles, load_project, save_project},
    display::{display_page, display_recipe, display_search_results, write_flow_csv},
    lp::SimplexSolver,
    machines::MachineRegistry,
    repository::FORMAT_VERSION,
    search::SearchQuery,
};

/// Command-line arguments for gtplanner.
#[derive(Parser, Debug)]
#[command(name = "gtplanner")]
#[command(author, version, about = "Plan GregTech production chains with linear optimization", long_about = None)]
struct Args {
    /// Path to the repository image
    #[arg(short, long, default_value = "data.bin")]
    image: PathBuf,

    /// Log debug output (RUST_LOG overrides this)
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search items and fluids by name
    Search {
        /// Free-text query; `mod:name` filters by mod
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "25")]
        limit: usize,
    },

    /// Solve a project file and print the result
    Solve {
        /// Project JSON file
        project: PathBuf,

        /// Write every node's flow to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Extra machine profiles (CSV: name, parallels, power, speed, perfect_overclocks)
        #[arg(long)]
        machines: Option<PathBuf>,

        /// Netting tolerance for linked goods
        #[arg(long, default_value = "0.01")]
        tolerance: f64,

        /// Write the project (normalized) to this file after solving
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// List recipes producing (or consuming) a good
    Recipes {
        /// Goods id, e.g. i:plate
        goods_id: String,

        /// List recipes consuming the good instead
        #[arg(long, default_value = "false")]
        consuming: bool,
    },

    /// Show image statistics
    Info,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "gtplanner=debug" } else { "gtplanner=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.image.exists() {
        eprintln!("Error: image '{}' not found. Pass --image.", args.image.display());
        std::process::exit(1);
    }
    let repository = load_image(&args.image)?;
    info!(image = %args.image.display(), "image loaded");

    match args.command {
        Command::Search { query, limit } => {
            let query = SearchQuery::parse(&query);
            display_search_results(&repository.search_catalog(&query, limit));
        }
        Command::Solve {
            project,
            csv,
            machines,
            tolerance,
            save,
        } => {
            let mut page = load_project(&project)?;
            let missing = page.missing_references(&repository);
            if !missing.is_empty() {
                println!("[WARNING] Unknown ids (skipped): {}", missing.join(", "));
            }

            let mut registry = MachineRegistry::with_defaults();
            if let Some(path) = machines {
                for profile in load_machine_profiles(&path)? {
                    registry.register(profile);
                }
            }
            let solver = SimplexSolver::default();
            let config = CalculatorConfig {
                netting_tolerance: tolerance,
                ..CalculatorConfig::default()
            };
            let report = Calculator::new(&repository, &registry, &solver)
                .with_config(config)
                .try_update(&mut page)?;
            info!(status = ?report.status, "solved");

            display_page(&repository, &page);
            if let Some(path) = csv {
                write_flow_csv(&repository, &page, File::create(&path)?)?;
                println!("Flow report written to {}", path.display());
            }
            if let Some(path) = save {
                save_project(&page, &path)?;
                println!("Project saved to {}", path.display());
            }
        }
        Command::Recipes { goods_id, consuming } => {
            let recipes = if consuming {
                repository.recipes_consuming(&goods_id)
            } else {
                repository.recipes_producing(&goods_id)
            };
            if recipes.is_empty() {
                println!("[RECIPES] None found for {goods_id}.");
            }
            for recipe in &recipes {
                display_recipe(recipe);
                println!();
            }
        }
        Command::Info => {
            println!("gtplanner - GregTech Production Planner");
            println!("================================================================");
            println!("  Image:        {}", args.image.display());
            println!("  Version:      {} (expected {})", repository.version(), FORMAT_VERSION);
            println!("  Items:        {}", repository.items().count());
            println!("  Fluids:       {}", repository.fluids().count());
            println!("  Ore dicts:    {}", repository.ore_dicts().count());
            println!("  Recipe types: {}", repository.recipe_types().count());
            println!("  Recipes:      {}", repository.recipes().count());
            println!("  Services:     {}", repository.service_objects().count());
        }
    }

    Ok(())
}
