//! The production-chain calculator.
//!
//! Every solve rebuilds everything from the page:
//!
//! 1. **Build** walks the group tree bottom-up. Each resolvable recipe gets one
//!    LP variable (executions per minute) and routes its slots into the
//!    enclosing [`LinkCollection`]. After a group's children are done, every
//!    good both produced and consumed inside it becomes an equality row.
//! 2. **Solve** minimizes the total number of executions.
//! 3. **Apply** turns the solved executions into flow, machine counts and
//!    energy per node, netting linked goods at the group that linked them.
//!
//! Results are written back to the page only after all three phases
//! succeeded, so a failed solve leaves the previous results in place.

use std::collections::BTreeMap;

use tracing::{debug, error, warn};

use crate::error::CalculatorError;
use crate::links::LinkCollection;
use crate::lp::{LpConstraint, LpModel, LpSolution, LpSolver};
use crate::machines::{MachineContext, MachineRegistry, Overclock, VoltageTier};
use crate::models::{
    FlowInformation, LinkAlgorithm, PageModel, PageStatus, RecipeGroupEntry, RecipeGroupModel,
    RecipeModel, RecipeSolution,
};
use crate::repository::Repository;
use crate::schema::{Item, Recipe, RecipeType, SearchableObject};

/// Calculator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatorConfig {
    /// Linked goods whose input and output differ by at most this much are dropped from group flow.
    pub netting_tolerance: f64,
    /// Name of the objective row in the LP model.
    pub objective: String,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        CalculatorConfig {
            netting_tolerance: 0.01,
            objective: "total".to_string(),
        }
    }
}

/// Result of one successful solve.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub status: PageStatus,
    pub model: LpModel,
    /// `None` when the model was empty and the solver was not called.
    pub solution: Option<LpSolution>,
}

/// Machine timing of a non-instant recipe.
#[derive(Debug, Clone)]
struct Timing {
    duration_minutes: f64,
    base_voltage: f64,
    crafter_id: Option<String>,
    overclock: Overclock,
}

/// Everything phase 1 learned about one resolvable recipe node.
struct RecipePlan<'a> {
    var: String,
    recipe: Recipe<'a>,
    tier: VoltageTier,
    timing: Option<Timing>,
    ore_dicts: BTreeMap<String, String>,
}

#[derive(Default)]
struct GroupPlan {
    linked: Vec<String>,
}

/// Phase 1 output; recipe leaves and groups are indexed in pre-order.
struct BuiltModel<'a> {
    model: LpModel,
    recipes: Vec<Option<RecipePlan<'a>>>,
    groups: Vec<GroupPlan>,
}

/// Phase 3 output, ready to be committed to the page.
struct Applied {
    recipes: Vec<(FlowInformation, Option<RecipeSolution>)>,
    groups: Vec<FlowInformation>,
}

/// Builds and solves pages against one repository.
pub struct Calculator<'a> {
    repository: &'a Repository,
    machines: &'a MachineRegistry,
    solver: &'a dyn LpSolver,
    config: CalculatorConfig,
}

impl<'a> Calculator<'a> {
    pub fn new(
        repository: &'a Repository,
        machines: &'a MachineRegistry,
        solver: &'a dyn LpSolver,
    ) -> Self {
        Calculator {
            repository,
            machines,
            solver,
            config: CalculatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CalculatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Re-solves the page, logging and swallowing any failure.
    ///
    /// On failure the page keeps its previous flows and status.
    pub fn update(&self, page: &mut PageModel) -> PageStatus {
        match self.try_update(page) {
            Ok(report) => report.status,
            Err(err) => {
                error!(page = %page.name, error = %err, "solve failed, keeping previous results");
                page.status
            }
        }
    }

    /// Re-solves the page and reports failures to the caller.
    pub fn try_update(&self, page: &mut PageModel) -> Result<SolveReport, CalculatorError> {
        let built = self.build(page)?;

        let solution = if built.model.variables.is_empty() {
            None
        } else {
            Some(self.solver.solve(&built.model)?)
        };
        let status = match &solution {
            None => PageStatus::NotSolved,
            Some(s) if !s.feasible => PageStatus::Infeasible,
            Some(s) if !s.bounded => PageStatus::Unbounded,
            Some(_) => PageStatus::Solved,
        };
        debug!(
            page = %page.name,
            variables = built.model.variables.len(),
            constraints = built.model.constraints.len(),
            ?status,
            "solved page"
        );

        let empty = LpSolution::default();
        let applied = self.apply(page, &built, solution.as_ref().unwrap_or(&empty))?;
        commit(page, applied);
        page.status = status;

        Ok(SolveReport {
            status,
            model: built.model,
            solution,
        })
    }

    /// Runs phase 1 only and returns the LP model it produces.
    pub fn build_model(&self, page: &PageModel) -> Result<LpModel, CalculatorError> {
        Ok(self.build(page)?.model)
    }

    // ------------------------------------------------------------------
    // Phase 1
    // ------------------------------------------------------------------

    fn build(&self, page: &PageModel) -> Result<BuiltModel<'a>, CalculatorError> {
        let mut built = BuiltModel {
            model: LpModel::new(&self.config.objective),
            recipes: Vec::new(),
            groups: Vec::new(),
        };
        let mut demand = LinkCollection::new();
        for product in &page.products {
            if self.repository.get_goods(&product.goods_id).is_none() {
                debug!(goods = %product.goods_id, "product refers to unknown goods, skipped");
                continue;
            }
            demand.add_demand(&product.goods_id, product.amount);
        }
        self.build_group(&page.root_group, Some(demand), &mut built)?;
        Ok(built)
    }

    fn build_group(
        &self,
        group: &RecipeGroupModel,
        demand: Option<LinkCollection>,
        built: &mut BuiltModel<'a>,
    ) -> Result<LinkCollection, CalculatorError> {
        let group_index = built.groups.len();
        built.groups.push(GroupPlan::default());

        let mut links = LinkCollection::new();
        for entry in &group.elements {
            match entry {
                RecipeGroupEntry::Recipe(recipe) => {
                    let leaf = built.recipes.len();
                    let plan = self.build_recipe(recipe, leaf, &mut links, &mut built.model)?;
                    built.recipes.push(plan);
                }
                RecipeGroupEntry::Group(child) => {
                    let child_links = self.build_group(child, None, built)?;
                    links.merge(child_links);
                }
            }
        }
        if let Some(demand) = demand {
            links.merge(demand);
        }

        self.link_group(group, group_index, &mut links, built);
        Ok(links)
    }

    fn build_recipe(
        &self,
        model: &RecipeModel,
        leaf: usize,
        links: &mut LinkCollection,
        lp: &mut LpModel,
    ) -> Result<Option<RecipePlan<'a>>, CalculatorError> {
        let Some(recipe) = self.repository.get_recipe(&model.recipe_id) else {
            debug!(recipe = %model.recipe_id, "unknown recipe, skipped");
            return Ok(None);
        };

        let var = format!("r{leaf}");
        let mut coefficients = BTreeMap::new();
        coefficients.insert(self.config.objective.clone(), 1.0);
        lp.variables.insert(var.clone(), coefficients);

        for io in recipe.items() {
            let amount = io.amount * io.probability;
            if !amount.is_finite() {
                return Err(CalculatorError::NonFinite {
                    recipe_id: model.recipe_id.clone(),
                });
            }
            match &io.goods {
                SearchableObject::OreDict(ore_dict) => {
                    if io.io_type.is_input() {
                        links.add_input_ore_dict(&ore_dict.id(), &var, amount, leaf);
                    }
                }
                goods => {
                    for (goods_id, flow) in expand_goods(goods, amount) {
                        if io.io_type.is_input() {
                            links.add_input(&goods_id, &var, flow);
                        } else {
                            links.add_output(&goods_id, &var, flow);
                        }
                    }
                }
            }
        }

        let timing = self.timing(&recipe, model);
        if let (Some(count), Some(timing)) = (model.fixed_crafter_count, &timing) {
            if timing.duration_minutes > 0.0 {
                let executions = count * timing.overclock.overclock_factor / timing.duration_minutes;
                if !executions.is_finite() {
                    return Err(CalculatorError::NonFinite {
                        recipe_id: model.recipe_id.clone(),
                    });
                }
                let name = format!("fixed:{var}");
                lp.constraints.insert(name.clone(), LpConstraint::equal(executions));
                if let Some(coefficients) = lp.variables.get_mut(&var) {
                    coefficients.insert(name, 1.0);
                }
            }
        }

        Ok(Some(RecipePlan {
            var,
            recipe,
            tier: model.voltage_tier,
            timing,
            ore_dicts: BTreeMap::new(),
        }))
    }

    /// Effective crafter: valid override, then the single-block for the tier,
    /// then the recipe type's default.
    fn resolve_crafter(&self, recipe_type: &RecipeType<'a>, model: &RecipeModel) -> Option<Item<'a>> {
        if let Some(crafter) = &model.crafter {
            if recipe_type.is_valid_crafter(crafter) {
                if let Some(item) = self.repository.get_item(crafter) {
                    return Some(item);
                }
            }
            warn!(recipe = %model.recipe_id, crafter = %crafter, "crafter override is not valid for this recipe type");
        }
        recipe_type
            .single_block_for_tier(model.voltage_tier.index())
            .or_else(|| recipe_type.default_crafter())
    }

    fn timing(&self, recipe: &Recipe<'a>, model: &RecipeModel) -> Option<Timing> {
        let gt = recipe.gt_recipe()?;
        let crafter = recipe
            .recipe_type()
            .and_then(|recipe_type| self.resolve_crafter(&recipe_type, model));
        let profile = match &crafter {
            Some(item) => self.machines.profile_for(&item.name()),
            None => self.machines.profile_for(""),
        };

        let base_voltage = f64::from(gt.voltage());
        let context = MachineContext {
            tier: model.voltage_tier,
            recipe_tier: gt.voltage_tier(),
            recipe_voltage: base_voltage,
        };
        let coefficients = profile.evaluate(&context, &model.choices);
        let overclock = Overclock::compute(
            model.voltage_tier,
            base_voltage,
            f64::from(gt.amperage()),
            gt.voltage_tier(),
            &coefficients,
        );
        if overclock.underpowered {
            warn!(
                recipe = %model.recipe_id,
                tier = %model.voltage_tier,
                voltage = gt.voltage(),
                "selected tier cannot power this recipe"
            );
        }

        Some(Timing {
            duration_minutes: gt.duration_minutes(),
            base_voltage,
            crafter_id: crafter.map(|item| item.id().to_string()),
            overclock,
        })
    }

    /// Resolves ore-dicts and adds the link rows of one group.
    fn link_group(
        &self,
        group: &RecipeGroupModel,
        group_index: usize,
        links: &mut LinkCollection,
        built: &mut BuiltModel<'a>,
    ) {
        for ore_dict_id in links.ore_dict_ids() {
            let Some(ore_dict) = self.repository.get_ore_dict(&ore_dict_id) else {
                continue;
            };
            let representative = ore_dict
                .items()
                .iter()
                .map(|item| item.id())
                .find(|id| links.has_output(id));
            let Some(item_id) = representative else {
                continue;
            };
            for user in links.resolve_ore_dict(&ore_dict_id, &item_id) {
                if let Some(Some(plan)) = built.recipes.get_mut(user) {
                    plan.ore_dicts.insert(ore_dict_id.clone(), item_id.to_string());
                }
            }
        }

        for goods_id in links.goods_ids() {
            if group.link_algorithm(&goods_id) == LinkAlgorithm::Ignore {
                continue;
            }
            if !(links.has_input(&goods_id) && links.has_output(&goods_id)) {
                continue;
            }
            let name = format!("link{group_index}:{goods_id}");
            built
                .model
                .constraints
                .insert(name.clone(), LpConstraint::equal(-links.constant(&goods_id)));
            if let Some(terms) = links.terms(&goods_id) {
                for (var, amount) in terms {
                    if *amount == 0.0 {
                        continue;
                    }
                    if let Some(coefficients) = built.model.variables.get_mut(var) {
                        coefficients.insert(name.clone(), *amount);
                    }
                }
            }
            built.groups[group_index].linked.push(goods_id);
        }
    }

    // ------------------------------------------------------------------
    // Phase 3
    // ------------------------------------------------------------------

    fn apply(
        &self,
        page: &PageModel,
        built: &BuiltModel<'a>,
        solution: &LpSolution,
    ) -> Result<Applied, CalculatorError> {
        let mut applied = Applied {
            recipes: Vec::with_capacity(built.recipes.len()),
            groups: Vec::with_capacity(built.groups.len()),
        };
        self.apply_group(&page.root_group, built, solution, &mut applied)?;
        Ok(applied)
    }

    fn apply_group(
        &self,
        group: &RecipeGroupModel,
        built: &BuiltModel<'a>,
        solution: &LpSolution,
        applied: &mut Applied,
    ) -> Result<FlowInformation, CalculatorError> {
        let group_index = applied.groups.len();
        applied.groups.push(FlowInformation::default());

        let mut flow = FlowInformation::default();
        for entry in &group.elements {
            match entry {
                RecipeGroupEntry::Recipe(_) => {
                    let leaf = applied.recipes.len();
                    let result = match built.recipes.get(leaf) {
                        Some(Some(plan)) => {
                            let (recipe_flow, recipe_solution) = self.apply_recipe(plan, solution)?;
                            (recipe_flow, Some(recipe_solution))
                        }
                        _ => (FlowInformation::default(), None),
                    };
                    flow.merge(&result.0);
                    applied.recipes.push(result);
                }
                RecipeGroupEntry::Group(child) => {
                    let child_flow = self.apply_group(child, built, solution, applied)?;
                    flow.merge(&child_flow);
                }
            }
        }

        if let Some(plan) = built.groups.get(group_index) {
            for goods_id in &plan.linked {
                flow.net(goods_id, self.config.netting_tolerance);
            }
        }
        applied.groups[group_index] = flow.clone();
        Ok(flow)
    }

    fn apply_recipe(
        &self,
        plan: &RecipePlan<'a>,
        solution: &LpSolution,
    ) -> Result<(FlowInformation, RecipeSolution), CalculatorError> {
        let executions = solution.value(&plan.var);
        if !executions.is_finite() {
            return Err(CalculatorError::NonFinite {
                recipe_id: plan.recipe.id().to_string(),
            });
        }

        let mut flow = FlowInformation::default();
        for io in plan.recipe.items() {
            let amount = io.amount * io.probability * executions;
            match &io.goods {
                SearchableObject::OreDict(ore_dict) => {
                    let ore_dict_id = ore_dict.id();
                    let goods_id = plan
                        .ore_dicts
                        .get(ore_dict_id.as_ref())
                        .map(String::as_str)
                        .unwrap_or(&*ore_dict_id);
                    if io.io_type.is_input() {
                        flow.add_input(goods_id, amount);
                    }
                }
                goods => {
                    for (goods_id, amount) in expand_goods(goods, amount) {
                        if io.io_type.is_input() {
                            flow.add_input(&goods_id, amount);
                        } else {
                            flow.add_output(&goods_id, amount);
                        }
                    }
                }
            }
        }

        let (crafter_count, crafter_id, overclock) = match &plan.timing {
            Some(timing) => {
                flow.add_energy(
                    plan.tier,
                    timing.duration_minutes
                        * timing.base_voltage
                        * executions
                        * timing.overclock.power_factor,
                );
                let count = executions * timing.duration_minutes / timing.overclock.overclock_factor;
                (Some(count), timing.crafter_id.clone(), timing.overclock)
            }
            None => (None, None, Overclock::none()),
        };

        Ok((
            flow,
            RecipeSolution {
                executions,
                crafter_count,
                crafter_id,
                overclock,
                ore_dicts: plan.ore_dicts.clone(),
            },
        ))
    }
}

/// Splits a slot's goods into concrete flows; a filled container becomes its
/// fluid (times capacity) plus the empty container.
fn expand_goods(goods: &SearchableObject<'_>, amount: f64) -> Vec<(String, f64)> {
    if let SearchableObject::Item(item) = goods {
        if let Some(container) = item.container() {
            if let Some(fluid) = container.fluid() {
                let mut flows = vec![(fluid.id().to_string(), amount * f64::from(container.amount()))];
                if let Some(empty) = container.empty() {
                    flows.push((empty.id().to_string(), amount));
                }
                return flows;
            }
        }
    }
    vec![(goods.id().to_string(), amount)]
}

/// Writes phase 3 results onto the page in the same pre-order they were produced.
fn commit(page: &mut PageModel, applied: Applied) {
    let mut recipes = applied.recipes.into_iter();
    let mut groups = applied.groups.into_iter();
    commit_group(&mut page.root_group, &mut recipes, &mut groups);
}

fn commit_group(
    group: &mut RecipeGroupModel,
    recipes: &mut impl Iterator<Item = (FlowInformation, Option<RecipeSolution>)>,
    groups: &mut impl Iterator<Item = FlowInformation>,
) {
    group.flow = groups.next().unwrap_or_default();
    for entry in group.elements.iter_mut() {
        match entry {
            RecipeGroupEntry::Recipe(recipe) => {
                let (flow, solution) = recipes.next().unwrap_or_default();
                recipe.flow = flow;
                recipe.solution = solution;
            }
            RecipeGroupEntry::Group(child) => commit_group(child, recipes, groups),
        }
    }
}
