//! # gtplanner
//!
//! A command-line tool and library for planning GregTech production chains.
//!
//! This crate provides functionality to browse a packed recipe catalog and to
//! calculate how many machines a production chain needs, based on:
//!
//! - The recipes chosen for each step and the voltage tier they run at
//! - Goods shared between steps ("links"), balanced by linear optimization
//! - Machine parallels and overclocks
//! - Fixed machine counts the player already owns
//!
//! ## Modules
//!
//! - [`repository`] - The lazily decoded binary image of items, fluids and recipes
//! - [`schema`] - Typed views over repository objects
//! - [`search`] - Bitset text search over the catalog
//! - [`models`] - Project pages, recipe groups and flow information
//! - [`links`] - Supply and demand accumulation for link constraints
//! - [`machines`] - Voltage tiers, machine profiles and the overclock law
//! - [`lp`] - The linear-programming contract and the built-in solver
//! - [`calculator`] - The production-chain calculator
//! - [`data`] - Image and project file loading
//! - [`display`] - Output formatting and display utilities
//!
//! ## Example Usage
//!
//! ```no_run
//! use gtplanner::{
//!     calculator::Calculator,
//!     data::{load_image, load_project},
//!     display::display_page,
//!     lp::SimplexSolver,
//!     machines::MachineRegistry,
//! };
//! use std::path::Path;
//!
//! let repository = load_image(Path::new("data.bin")).unwrap();
//! let mut page = load_project(Path::new("plates.json")).unwrap();
//!
//! let machines = MachineRegistry::with_defaults();
//! let solver = SimplexSolver::default();
//! Calculator::new(&repository, &machines, &solver).update(&mut page);
//!
//! display_page(&repository, &page);
//! ```

pub mod calculator;
pub mod data;
pub mod display;
pub mod error;
pub mod links;
pub mod lp;
pub mod machines;
pub mod models;
pub mod repository;
pub mod schema;
pub mod search;
pub mod wasm;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
