//! Project data structures for gtplanner.
//!
//! A page holds the products the user wants and a tree of recipe groups.
//! Groups contain recipes and further groups; each group can override how
//! individual goods are linked inside it. Flow information and solve results
//! are attached to the nodes by the calculator and are never persisted.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::machines::{Choices, Overclock, VoltageTier};
use crate::repository::Repository;

/// How a group treats a good that is both produced and consumed inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkAlgorithm {
    /// Production must equal consumption.
    #[default]
    Match,
    /// Production and consumption are left independent.
    Ignore,
}

/// Outcome of the last solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PageStatus {
    #[default]
    NotSolved,
    Solved,
    Infeasible,
    Unbounded,
}

/// Material and energy flow of a node, per minute.
///
/// # Example
///
/// ```
/// use gtplanner::models::FlowInformation;
///
/// let mut flow = FlowInformation::default();
/// flow.add_input("i:iron", 10.0);
/// flow.add_output("i:iron", 7.0);
/// flow.net("i:iron", 0.01);
///
/// assert_eq!(flow.input.get("i:iron"), Some(&3.0));
/// assert!(flow.output.get("i:iron").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowInformation {
    /// Consumed goods by id
    pub input: BTreeMap<String, f64>,
    /// Produced goods by id
    pub output: BTreeMap<String, f64>,
    /// Average EU/t drawn per voltage tier
    pub energy: BTreeMap<VoltageTier, f64>,
}

impl FlowInformation {
    pub fn add_input(&mut self, goods_id: &str, amount: f64) {
        *self.input.entry(goods_id.to_string()).or_insert(0.0) += amount;
    }

    pub fn add_output(&mut self, goods_id: &str, amount: f64) {
        *self.output.entry(goods_id.to_string()).or_insert(0.0) += amount;
    }

    pub fn add_energy(&mut self, tier: VoltageTier, amount: f64) {
        *self.energy.entry(tier).or_insert(0.0) += amount;
    }

    /// Sums another flow into this one.
    pub fn merge(&mut self, other: &FlowInformation) {
        for (id, amount) in &other.input {
            self.add_input(id, *amount);
        }
        for (id, amount) in &other.output {
            self.add_output(id, *amount);
        }
        for (tier, amount) in &other.energy {
            self.add_energy(*tier, *amount);
        }
    }

    /// Collapses a good's input and output into whichever side dominates,
    /// dropping both when they cancel within `tolerance`.
    pub fn net(&mut self, goods_id: &str, tolerance: f64) {
        let input = self.input.remove(goods_id);
        let output = self.output.remove(goods_id);
        if input.is_none() && output.is_none() {
            return;
        }
        let residual = input.unwrap_or(0.0) - output.unwrap_or(0.0);
        if residual.abs() <= tolerance {
            return;
        }
        if residual > 0.0 {
            self.input.insert(goods_id.to_string(), residual);
        } else {
            self.output.insert(goods_id.to_string(), -residual);
        }
    }

    pub fn total_energy(&self) -> f64 {
        self.energy.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty() && self.energy.is_empty()
    }
}

/// A desired product of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductModel {
    pub goods_id: String,
    /// Units per minute; positive amounts are demand.
    pub amount: f64,
}

/// Per-recipe results of the last solve.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeSolution {
    /// Executions per minute
    pub executions: f64,
    /// Machines needed; `None` for instant recipes
    pub crafter_count: Option<f64>,
    /// Crafter actually used
    pub crafter_id: Option<String>,
    pub overclock: Overclock,
    /// Ore-dict inputs resolved to concrete items at link time
    pub ore_dicts: BTreeMap<String, String>,
}

/// A chosen recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeModel {
    pub recipe_id: String,
    #[serde(default)]
    pub voltage_tier: VoltageTier,
    /// Crafter override (item id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crafter: Option<String>,
    #[serde(default)]
    pub choices: Choices,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_crafter_count: Option<f64>,
    #[serde(skip)]
    pub flow: FlowInformation,
    #[serde(skip)]
    pub solution: Option<RecipeSolution>,
}

impl RecipeModel {
    pub fn new(recipe_id: &str, voltage_tier: VoltageTier) -> Self {
        RecipeModel {
            recipe_id: recipe_id.to_string(),
            voltage_tier,
            crafter: None,
            choices: Choices::new(),
            fixed_crafter_count: None,
            flow: FlowInformation::default(),
            solution: None,
        }
    }
}

/// A child of a recipe group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecipeGroupEntry {
    Recipe(RecipeModel),
    Group(RecipeGroupModel),
}

/// A scope of recipes with its own link overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeGroupModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub collapsed: bool,
    /// Per-good link override; goods not listed use [`LinkAlgorithm::Match`].
    #[serde(default)]
    pub links: BTreeMap<String, LinkAlgorithm>,
    #[serde(default)]
    pub elements: Vec<RecipeGroupEntry>,
    #[serde(skip)]
    pub flow: FlowInformation,
}

impl RecipeGroupModel {
    pub fn new(name: &str) -> Self {
        RecipeGroupModel {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn push_recipe(&mut self, recipe: RecipeModel) {
        self.elements.push(RecipeGroupEntry::Recipe(recipe));
    }

    pub fn push_group(&mut self, group: RecipeGroupModel) {
        self.elements.push(RecipeGroupEntry::Group(group));
    }

    pub fn set_link(&mut self, goods_id: &str, algorithm: LinkAlgorithm) {
        self.links.insert(goods_id.to_string(), algorithm);
    }

    pub fn link_algorithm(&self, goods_id: &str) -> LinkAlgorithm {
        self.links.get(goods_id).copied().unwrap_or_default()
    }

    /// Recipes directly inside this group.
    pub fn recipes(&self) -> impl Iterator<Item = &RecipeModel> {
        self.elements.iter().filter_map(|e| match e {
            RecipeGroupEntry::Recipe(r) => Some(r),
            RecipeGroupEntry::Group(_) => None,
        })
    }

    /// Child groups directly inside this group.
    pub fn groups(&self) -> impl Iterator<Item = &RecipeGroupModel> {
        self.elements.iter().filter_map(|e| match e {
            RecipeGroupEntry::Group(g) => Some(g),
            RecipeGroupEntry::Recipe(_) => None,
        })
    }
}

/// One production page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub products: Vec<ProductModel>,
    #[serde(default)]
    pub root_group: RecipeGroupModel,
    #[serde(skip)]
    pub status: PageStatus,
}

impl PageModel {
    pub fn new(name: &str) -> Self {
        PageModel {
            name: name.to_string(),
            root_group: RecipeGroupModel::new("root"),
            ..Default::default()
        }
    }

    pub fn add_product(&mut self, goods_id: &str, amount: f64) {
        self.products.push(ProductModel {
            goods_id: goods_id.to_string(),
            amount,
        });
    }

    /// Every id the page refers to.
    pub fn referenced_ids(&self) -> BTreeSet<String> {
        let mut collector = ReferencedIds::default();
        collector.visit_page(self);
        collector.ids
    }

    /// Referenced ids absent from the loaded data.
    pub fn missing_references(&self, repository: &Repository) -> Vec<String> {
        self.referenced_ids()
            .into_iter()
            .filter(|id| repository.get_by_id(id).is_none())
            .collect()
    }
}

/// Read-only walk over a page's nodes.
pub trait ModelVisitor {
    fn visit_page(&mut self, page: &PageModel) {
        walk_page(self, page);
    }

    fn visit_product(&mut self, _product: &ProductModel) {}

    fn visit_group(&mut self, group: &RecipeGroupModel) {
        walk_group(self, group);
    }

    fn visit_recipe(&mut self, _recipe: &RecipeModel) {}
}

pub fn walk_page<V: ModelVisitor + ?Sized>(visitor: &mut V, page: &PageModel) {
    for product in &page.products {
        visitor.visit_product(product);
    }
    visitor.visit_group(&page.root_group);
}

pub fn walk_group<V: ModelVisitor + ?Sized>(visitor: &mut V, group: &RecipeGroupModel) {
    for entry in &group.elements {
        match entry {
            RecipeGroupEntry::Recipe(recipe) => visitor.visit_recipe(recipe),
            RecipeGroupEntry::Group(child) => visitor.visit_group(child),
        }
    }
}

#[derive(Default)]
struct ReferencedIds {
    ids: BTreeSet<String>,
}

impl ModelVisitor for ReferencedIds {
    fn visit_product(&mut self, product: &ProductModel) {
        self.ids.insert(product.goods_id.clone());
    }

    fn visit_recipe(&mut self, recipe: &RecipeModel) {
        self.ids.insert(recipe.recipe_id.clone());
        if let Some(crafter) = &recipe.crafter {
            self.ids.insert(crafter.clone());
        }
    }
}
