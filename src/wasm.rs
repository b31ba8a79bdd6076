//! WebAssembly bindings for gtplanner.
//!
//! This module provides JavaScript-accessible functions for the repository and
//! the calculator. Inputs and outputs are JSON strings. The loaded repository
//! lives in a thread-local, since a wasm instance runs on a single thread.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::calculator::{Calculator, CalculatorConfig};
use crate::error::CalculatorError;
use crate::lp::{LpModel, LpSolution, LpSolver, SimplexSolver};
use crate::machines::MachineRegistry;
use crate::models::{FlowInformation, PageModel, PageStatus, RecipeGroupEntry, RecipeGroupModel};
use crate::repository::Repository;
use crate::schema::Recipe;
use crate::search::SearchQuery;

thread_local! {
    static REPOSITORY: RefCell<Option<Repository>> = const { RefCell::new(None) };
}

fn report_error(message: &str) {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::error_1(&JsValue::from_str(message));
    #[cfg(not(target_arch = "wasm32"))]
    tracing::error!("{message}");
}

/// Result of loading an image.
#[derive(Debug, Clone, Serialize)]
pub struct JsLoadResult {
    pub success: bool,
    pub error: Option<String>,
    pub version: u32,
    pub items: usize,
    pub fluids: usize,
    pub recipes: usize,
}

/// JavaScript-friendly search input.
#[derive(Debug, Clone, Deserialize)]
pub struct JsSearchInput {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Search recipes instead of goods.
    #[serde(default)]
    pub recipes: bool,
}

fn default_limit() -> usize {
    50
}

/// JavaScript-friendly recipe lookup input.
#[derive(Debug, Clone, Deserialize)]
pub struct JsRecipeLookupInput {
    pub goods_id: String,
    /// `true` for recipes consuming the good, `false` for recipes producing it.
    #[serde(default)]
    pub consuming: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsSearchHit {
    pub id: String,
    pub name: String,
    pub mod_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsSearchResult {
    pub success: bool,
    pub error: Option<String>,
    pub hits: Vec<JsSearchHit>,
}

/// JavaScript-friendly solve input.
#[derive(Debug, Clone, Deserialize)]
pub struct JsSolveInput {
    pub project: PageModel,
    #[serde(default = "default_tolerance")]
    pub netting_tolerance: f64,
}

fn default_tolerance() -> f64 {
    CalculatorConfig::default().netting_tolerance
}

/// Solved values of one recipe node, in tree pre-order.
#[derive(Debug, Clone, Serialize)]
pub struct JsRecipeResult {
    pub recipe_id: String,
    pub executions: Option<f64>,
    pub crafter_count: Option<f64>,
    pub crafter_id: Option<String>,
    pub flow: FlowInformation,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsSolveResult {
    pub success: bool,
    pub error: Option<String>,
    pub status: PageStatus,
    pub recipes: Vec<JsRecipeResult>,
    pub groups: Vec<FlowInformation>,
}

impl JsSolveResult {
    fn failure(error: String) -> Self {
        report_error(&error);
        JsSolveResult {
            success: false,
            error: Some(error),
            status: PageStatus::NotSolved,
            recipes: vec![],
            groups: vec![],
        }
    }
}

fn collect_results(group: &RecipeGroupModel, result: &mut JsSolveResult) {
    result.groups.push(group.flow.clone());
    for entry in &group.elements {
        match entry {
            RecipeGroupEntry::Recipe(recipe) => result.recipes.push(JsRecipeResult {
                recipe_id: recipe.recipe_id.clone(),
                executions: recipe.solution.as_ref().map(|s| s.executions),
                crafter_count: recipe.solution.as_ref().and_then(|s| s.crafter_count),
                crafter_id: recipe.solution.as_ref().and_then(|s| s.crafter_id.clone()),
                flow: recipe.flow.clone(),
            }),
            RecipeGroupEntry::Group(child) => collect_results(child, result),
        }
    }
}

/// Delegates LP solving to a JavaScript function taking and returning JSON strings.
struct JsLpSolver<'f> {
    function: &'f js_sys::Function,
}

impl LpSolver for JsLpSolver<'_> {
    fn solve(&self, model: &LpModel) -> Result<LpSolution, CalculatorError> {
        let input =
            serde_json::to_string(model).map_err(|e| CalculatorError::Solver(e.to_string()))?;
        let output = self
            .function
            .call1(&JsValue::NULL, &JsValue::from_str(&input))
            .map_err(|e| CalculatorError::Solver(format!("{e:?}")))?;
        let text = output
            .as_string()
            .ok_or_else(|| CalculatorError::Solver("solver must return a JSON string".to_string()))?;
        serde_json::from_str(&text).map_err(|e| CalculatorError::Solver(e.to_string()))
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Loads a (decompressed) repository image, replacing any previous one.
#[wasm_bindgen]
pub fn load_image(bytes: &[u8]) -> String {
    match Repository::new(bytes.to_vec()) {
        Ok(repository) => {
            let result = JsLoadResult {
                success: true,
                error: None,
                version: repository.version(),
                items: repository.items().count(),
                fluids: repository.fluids().count(),
                recipes: repository.recipes().count(),
            };
            REPOSITORY.with(|cell| *cell.borrow_mut() = Some(repository));
            to_json(&result)
        }
        Err(e) => {
            let error = format!("Invalid image: {e}");
            report_error(&error);
            to_json(&JsLoadResult {
                success: false,
                error: Some(error),
                version: 0,
                items: 0,
                fluids: 0,
                recipes: 0,
            })
        }
    }
}

fn with_repository<T>(f: impl FnOnce(&Repository) -> T) -> Option<T> {
    REPOSITORY.with(|cell| cell.borrow().as_ref().map(f))
}

fn search_failure(error: String) -> String {
    report_error(&error);
    to_json(&JsSearchResult {
        success: false,
        error: Some(error),
        hits: vec![],
    })
}

fn recipe_hit(recipe: &Recipe<'_>) -> JsSearchHit {
    JsSearchHit {
        id: recipe.id().to_string(),
        name: recipe
            .recipe_type()
            .map(|t| t.name().to_string())
            .unwrap_or_default(),
        mod_name: String::new(),
    }
}

/// Searches the catalog (or recipes) of the loaded image.
#[wasm_bindgen]
pub fn search(input_json: &str) -> String {
    let input: JsSearchInput = match serde_json::from_str(input_json) {
        Ok(i) => i,
        Err(e) => return search_failure(format!("Invalid input: {e}")),
    };
    let query = SearchQuery::parse(&input.query);
    let hits = with_repository(|repository| {
        if input.recipes {
            repository
                .search_recipes(&query, input.limit)
                .iter()
                .map(recipe_hit)
                .collect::<Vec<_>>()
        } else {
            repository
                .search_catalog(&query, input.limit)
                .iter()
                .map(|goods| JsSearchHit {
                    id: goods.id().to_string(),
                    name: goods.name().to_string(),
                    mod_name: goods.mod_name().to_string(),
                })
                .collect()
        }
    });
    match hits {
        Some(hits) => to_json(&JsSearchResult {
            success: true,
            error: None,
            hits,
        }),
        None => search_failure("No image loaded.".to_string()),
    }
}

/// Lists recipes producing or consuming a good.
#[wasm_bindgen]
pub fn find_recipes(input_json: &str) -> String {
    let input: JsRecipeLookupInput = match serde_json::from_str(input_json) {
        Ok(i) => i,
        Err(e) => return search_failure(format!("Invalid input: {e}")),
    };
    let hits = with_repository(|repository| {
        let recipes = if input.consuming {
            repository.recipes_consuming(&input.goods_id)
        } else {
            repository.recipes_producing(&input.goods_id)
        };
        recipes.iter().map(recipe_hit).collect::<Vec<_>>()
    });
    match hits {
        Some(hits) => to_json(&JsSearchResult {
            success: true,
            error: None,
            hits,
        }),
        None => search_failure("No image loaded.".to_string()),
    }
}

/// Solves a project against the loaded image.
///
/// `solver` receives the LP model as a JSON string and must return the
/// solution as a JSON string. Without it the built-in simplex solver is used.
#[wasm_bindgen]
pub fn solve_project(input_json: &str, solver: Option<js_sys::Function>) -> String {
    let input: JsSolveInput = match serde_json::from_str(input_json) {
        Ok(i) => i,
        Err(e) => return to_json(&JsSolveResult::failure(format!("Invalid input: {e}"))),
    };
    let mut page = input.project;
    let config = CalculatorConfig {
        netting_tolerance: input.netting_tolerance,
        ..CalculatorConfig::default()
    };

    let outcome = with_repository(|repository| {
        let machines = MachineRegistry::with_defaults();
        let builtin = SimplexSolver::default();
        let js_solver = solver.as_ref().map(|function| JsLpSolver { function });
        let lp: &dyn LpSolver = match &js_solver {
            Some(js) => js,
            None => &builtin,
        };
        Calculator::new(repository, &machines, lp)
            .with_config(config)
            .try_update(&mut page)
    });

    let result = match outcome {
        None => JsSolveResult::failure("No image loaded.".to_string()),
        Some(Err(e)) => JsSolveResult::failure(format!("Solve failed: {e}")),
        Some(Ok(report)) => {
            let mut result = JsSolveResult {
                success: true,
                error: None,
                status: report.status,
                recipes: vec![],
                groups: vec![],
            };
            collect_results(&page.root_group, &mut result);
            result
        }
    };
    to_json(&result)
}

/// Get the version of the planner.
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
