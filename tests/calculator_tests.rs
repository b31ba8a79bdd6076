//! Tests for the production-chain calculator.

use gtplanner::calculator::{Calculator, CalculatorConfig};
use gtplanner::error::CalculatorError;
use gtplanner::lp::{LpConstraint, LpModel, LpSolution, LpSolver, SimplexSolver};
use gtplanner::machines::{MachineRegistry, VoltageTier};
use gtplanner::models::{LinkAlgorithm, PageModel, PageStatus, RecipeGroupEntry, RecipeGroupModel, RecipeModel};
use gtplanner::repository::Repository;
use gtplanner::test_utils::{sample_catalog, GtSpec, ImageBuilder, IoSpec};

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn solve(repository: &Repository, page: &mut PageModel) -> PageStatus {
    let machines = MachineRegistry::with_defaults();
    let solver = SimplexSolver::default();
    Calculator::new(repository, &machines, &solver).update(page)
}

fn recipe(page: &PageModel, index: usize) -> &RecipeModel {
    page.root_group
        .recipes()
        .nth(index)
        .expect("recipe node present")
}

fn plate_page(tier: VoltageTier) -> PageModel {
    let mut page = PageModel::new("plates");
    page.add_product("i:plate", 60.0);
    page.root_group.push_recipe(RecipeModel::new("r:plate", tier));
    page
}

/// A solver that returns fixed variable values.
struct FixedSolver(Vec<(&'static str, f64)>);

impl LpSolver for FixedSolver {
    fn solve(&self, _model: &LpModel) -> Result<LpSolution, CalculatorError> {
        Ok(LpSolution {
            feasible: true,
            bounded: true,
            result: 0.0,
            values: self.0.iter().map(|(var, v)| (var.to_string(), *v)).collect(),
        })
    }
}

/// A solver that always fails, for error-path tests.
struct FailingSolver;

impl LpSolver for FailingSolver {
    fn solve(&self, _model: &LpModel) -> Result<LpSolution, CalculatorError> {
        Err(CalculatorError::Solver("solver offline".to_string()))
    }
}

#[test]
fn test_demand_scales_instant_recipe() {
    let mut b = ImageBuilder::new();
    let log = b.item("i:log", "Oak Log");
    let planks = b.item("i:planks", "Oak Planks");
    let crafting = b.recipe_type("Crafting", &[], &[], 0);
    b.recipe(
        "r:planks",
        crafting,
        &[IoSpec::item_in(log, 1), IoSpec::item_out(planks, 10)],
        None,
    );
    let repository = b.build_repository();

    let mut page = PageModel::new("planks");
    page.add_product("i:planks", 60.0);
    page.root_group.push_recipe(RecipeModel::new("r:planks", VoltageTier::LV));

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    let node = recipe(&page, 0);
    let solution = node.solution.as_ref().unwrap();
    assert!(approx(solution.executions, 6.0));
    assert_eq!(solution.crafter_count, None);
    assert!(approx(page.root_group.flow.output["i:planks"], 60.0));
    assert!(approx(page.root_group.flow.input["i:log"], 6.0));
}

#[test]
fn test_timed_recipe_machine_count_and_energy() {
    let repository = sample_catalog().build_repository();
    let mut page = plate_page(VoltageTier::LV);

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    let solution = recipe(&page, 0).solution.clone().unwrap();
    assert!(approx(solution.executions, 60.0));
    // 100 ticks = 1/12 min, no overclock at LV
    assert!(approx(solution.crafter_count.unwrap(), 5.0));
    assert_eq!(solution.crafter_id.as_deref(), Some("i:bender"));
    assert!(approx(page.root_group.flow.energy[&VoltageTier::LV], 150.0));
    assert!(approx(page.root_group.flow.output["i:plate"], 60.0));
}

#[test]
fn test_higher_tier_overclocks_and_picks_tier_crafter() {
    let repository = sample_catalog().build_repository();
    let mut page = plate_page(VoltageTier::HV);

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    let solution = recipe(&page, 0).solution.clone().unwrap();
    assert_eq!(solution.overclock.normal_overclocks, 2);
    assert!(approx(solution.overclock.overclock_factor, 4.0));
    assert!(approx(solution.crafter_count.unwrap(), 1.25));
    assert_eq!(solution.crafter_id.as_deref(), Some("i:bender_hv"));
    assert!(approx(page.root_group.flow.energy[&VoltageTier::HV], 600.0));
}

#[test]
fn test_single_block_walks_down_to_lower_tier() {
    let repository = sample_catalog().build_repository();
    // No MV bender is registered, so the LV one is used.
    let mut page = plate_page(VoltageTier::MV);

    solve(&repository, &mut page);
    let solution = recipe(&page, 0).solution.clone().unwrap();
    assert_eq!(solution.crafter_id.as_deref(), Some("i:bender"));
}

#[test]
fn test_crafter_override() {
    let repository = sample_catalog().build_repository();
    let mut page = PageModel::new("plates");
    page.add_product("i:plate", 60.0);
    let mut node = RecipeModel::new("r:plate", VoltageTier::LV);
    node.crafter = Some("i:bender_hv".to_string());
    page.root_group.push_recipe(node);

    solve(&repository, &mut page);
    assert_eq!(
        recipe(&page, 0).solution.as_ref().unwrap().crafter_id.as_deref(),
        Some("i:bender_hv")
    );

    // A crafter of another recipe type is not a valid override.
    let mut page = PageModel::new("plates");
    page.add_product("i:plate", 60.0);
    let mut node = RecipeModel::new("r:plate", VoltageTier::LV);
    node.crafter = Some("i:lcr".to_string());
    page.root_group.push_recipe(node);

    solve(&repository, &mut page);
    assert_eq!(
        recipe(&page, 0).solution.as_ref().unwrap().crafter_id.as_deref(),
        Some("i:bender")
    );
}

#[test]
fn test_machine_profile_perfect_overclocks() {
    let repository = sample_catalog().build_repository();
    let mut page = PageModel::new("gears");
    page.add_product("i:gear", 15.0);
    page.root_group.push_recipe(RecipeModel::new("r:lcr", VoltageTier::HV));

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    let solution = recipe(&page, 0).solution.clone().unwrap();
    assert_eq!(solution.crafter_id.as_deref(), Some("i:lcr"));
    assert_eq!(solution.overclock.perfect_overclocks, 2);
    assert!(approx(solution.overclock.overclock_factor, 16.0));
    assert!(approx(solution.overclock.power_factor, 1.0));
    assert!(approx(solution.crafter_count.unwrap(), 0.3125));
    assert!(approx(page.root_group.flow.energy[&VoltageTier::HV], 150.0));
}

#[test]
fn test_chain_links_intermediate() {
    let repository = sample_catalog().build_repository();
    let mut page = plate_page(VoltageTier::LV);
    page.root_group.push_recipe(RecipeModel::new("r:ingot", VoltageTier::LV));

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    assert!(approx(recipe(&page, 1).solution.as_ref().unwrap().executions, 60.0));

    let flow = &page.root_group.flow;
    assert!(approx(flow.input["i:ore"], 60.0));
    assert!(approx(flow.output["i:plate"], 60.0));
    assert!(!flow.input.contains_key("i:ingot"));
    assert!(!flow.output.contains_key("i:ingot"));
}

#[test]
fn test_ignore_leaves_goods_unlinked() {
    let mut b = ImageBuilder::new();
    let ore = b.item("i:ore", "Ore");
    let dust = b.item("i:dust", "Dust");
    let crafting = b.recipe_type("Crafting", &[], &[], 0);
    b.recipe("r:a", crafting, &[IoSpec::item_in(ore, 1), IoSpec::item_out(dust, 1)], None);
    b.recipe("r:b", crafting, &[IoSpec::item_in(ore, 2), IoSpec::item_out(dust, 3)], None);
    let repository = b.build_repository();

    let mut page = PageModel::new("dust");
    page.add_product("i:dust", 30.0);
    let mut group = RecipeGroupModel::new("sub");
    group.push_recipe(RecipeModel::new("r:a", VoltageTier::LV));
    group.push_recipe(RecipeModel::new("r:b", VoltageTier::LV));
    group.set_link("i:dust", LinkAlgorithm::Ignore);
    page.root_group.push_group(group);

    let machines = MachineRegistry::with_defaults();
    let solver = SimplexSolver::default();
    let model = Calculator::new(&repository, &machines, &solver)
        .build_model(&page)
        .unwrap();
    // The sub-group adds no row for dust; only the root's product row exists.
    assert!(!model.constraints.keys().any(|name| name.starts_with("link1:")));
    assert!(model.constraints.contains_key("link0:i:dust"));
}

#[test]
fn test_ignore_at_root_drops_demand_row() {
    let repository = sample_catalog().build_repository();
    let mut page = plate_page(VoltageTier::LV);
    page.root_group.set_link("i:plate", LinkAlgorithm::Ignore);

    let machines = MachineRegistry::with_defaults();
    let solver = SimplexSolver::default();
    let calculator = Calculator::new(&repository, &machines, &solver);
    assert!(calculator.build_model(&page).unwrap().constraints.is_empty());

    assert_eq!(calculator.update(&mut page), PageStatus::Solved);
    assert!(approx(recipe(&page, 0).solution.as_ref().unwrap().executions, 0.0));
}

#[test]
fn test_nested_group_flow_is_netted() {
    let repository = sample_catalog().build_repository();
    let mut page = PageModel::new("nested");
    page.add_product("i:plate", 60.0);
    let mut group = RecipeGroupModel::new("plates");
    group.push_recipe(RecipeModel::new("r:plate", VoltageTier::LV));
    group.push_recipe(RecipeModel::new("r:ingot", VoltageTier::LV));
    page.root_group.push_group(group);

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    let RecipeGroupEntry::Group(child) = &page.root_group.elements[0] else {
        panic!("expected a group");
    };
    assert!(!child.flow.input.contains_key("i:ingot"));
    assert!(approx(child.flow.input["i:ore"], 60.0));
    assert!(approx(child.flow.output["i:plate"], 60.0));
    assert_eq!(child.flow, page.root_group.flow);
}

#[test]
fn test_ore_dict_resolves_to_produced_item() {
    let repository = sample_catalog().build_repository();
    let mut page = PageModel::new("wires");
    page.add_product("i:wire", 120.0);
    page.root_group.push_recipe(RecipeModel::new("r:wire", VoltageTier::LV));
    page.root_group.push_recipe(RecipeModel::new("r:ingot", VoltageTier::LV));

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    let wire = recipe(&page, 0).clone();
    let solution = wire.solution.unwrap();
    assert!(approx(solution.executions, 60.0));
    assert_eq!(solution.ore_dicts.get("o:ingotIron").map(String::as_str), Some("i:ingot"));
    assert!(approx(wire.flow.input["i:ingot"], 60.0));
    assert!(approx(recipe(&page, 1).solution.as_ref().unwrap().executions, 60.0));
    assert!(approx(page.root_group.flow.input["i:ore"], 60.0));
}

#[test]
fn test_unresolved_ore_dict_stays_in_flow() {
    let repository = sample_catalog().build_repository();
    let mut page = PageModel::new("wires");
    page.add_product("i:wire", 120.0);
    page.root_group.push_recipe(RecipeModel::new("r:wire", VoltageTier::LV));

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    let wire = recipe(&page, 0);
    assert!(wire.solution.as_ref().unwrap().ore_dicts.is_empty());
    assert!(approx(wire.flow.input["o:ingotIron"], 60.0));
}

#[test]
fn test_container_expands_into_fluid_and_empty() {
    let repository = sample_catalog().build_repository();
    let mut page = PageModel::new("steam");
    page.add_product("f:steam", 2000.0);
    page.root_group.push_recipe(RecipeModel::new("r:steam", VoltageTier::LV));

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    let node = recipe(&page, 0);
    assert!(approx(node.solution.as_ref().unwrap().executions, 1.0));
    assert!(approx(node.flow.input["f:water"], 1000.0));
    assert!(approx(node.flow.input["i:cell"], 1.0));
    assert!(approx(node.flow.output["f:steam"], 2000.0));
    assert!(approx(node.flow.output["i:cell"], 2.0));
    assert!(!node.flow.input.contains_key("i:water_cell"));
}

#[test]
fn test_probability_scales_output() {
    let mut b = ImageBuilder::new();
    let ore = b.item("i:ore", "Ore");
    let gem = b.item("i:gem", "Gem");
    let crafting = b.recipe_type("Crafting", &[], &[], 0);
    b.recipe(
        "r:gem",
        crafting,
        &[IoSpec::item_in(ore, 1), IoSpec::item_out(gem, 1).with_probability(0.25)],
        None,
    );
    let repository = b.build_repository();

    let mut page = PageModel::new("gems");
    page.add_product("i:gem", 10.0);
    page.root_group.push_recipe(RecipeModel::new("r:gem", VoltageTier::LV));

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    assert!(approx(recipe(&page, 0).solution.as_ref().unwrap().executions, 40.0));
}

#[test]
fn test_fixed_crafter_count() {
    let repository = sample_catalog().build_repository();
    let mut page = PageModel::new("fixed");
    let mut node = RecipeModel::new("r:plate", VoltageTier::LV);
    node.fixed_crafter_count = Some(2.0);
    page.root_group.push_recipe(node);

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    let solution = recipe(&page, 0).solution.clone().unwrap();
    assert!(approx(solution.executions, 24.0));
    assert!(approx(solution.crafter_count.unwrap(), 2.0));
}

#[test]
fn test_conflicting_constraints_are_infeasible() {
    let repository = sample_catalog().build_repository();
    let mut page = plate_page(VoltageTier::LV);
    if let Some(RecipeGroupEntry::Recipe(node)) = page.root_group.elements.first_mut() {
        node.fixed_crafter_count = Some(1.0);
    }

    assert_eq!(solve(&repository, &mut page), PageStatus::Infeasible);
    assert_eq!(page.status, PageStatus::Infeasible);
}

#[test]
fn test_unresolved_recipe_is_skipped() {
    let repository = sample_catalog().build_repository();
    let mut page = PageModel::new("partial");
    page.add_product("i:plate", 60.0);
    page.root_group.push_recipe(RecipeModel::new("r:missing", VoltageTier::LV));
    page.root_group.push_recipe(RecipeModel::new("r:plate", VoltageTier::LV));

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    assert!(recipe(&page, 0).solution.is_none());
    assert!(recipe(&page, 0).flow.is_empty());
    assert!(approx(recipe(&page, 1).solution.as_ref().unwrap().executions, 60.0));
    assert_eq!(page.root_group.recipes().count(), 2);
}

#[test]
fn test_unknown_product_is_ignored() {
    let repository = sample_catalog().build_repository();
    let mut page = plate_page(VoltageTier::LV);
    page.add_product("i:unobtainium", 5.0);

    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    assert!(approx(recipe(&page, 0).solution.as_ref().unwrap().executions, 60.0));
}

#[test]
fn test_empty_page_is_not_solved() {
    let repository = sample_catalog().build_repository();
    let mut page = PageModel::new("empty");
    page.add_product("i:plate", 60.0);

    let machines = MachineRegistry::with_defaults();
    let report = Calculator::new(&repository, &machines, &FailingSolver)
        .try_update(&mut page)
        .unwrap();
    // The failing solver is never called for an empty model.
    assert_eq!(report.status, PageStatus::NotSolved);
    assert!(report.solution.is_none());
}

#[test]
fn test_solver_failure_keeps_previous_results() {
    let repository = sample_catalog().build_repository();
    let mut page = plate_page(VoltageTier::LV);
    assert_eq!(solve(&repository, &mut page), PageStatus::Solved);
    let before = page.clone();

    let machines = MachineRegistry::with_defaults();
    let calculator = Calculator::new(&repository, &machines, &FailingSolver);
    assert!(matches!(
        calculator.try_update(&mut page),
        Err(CalculatorError::Solver(_))
    ));
    assert_eq!(calculator.update(&mut page), PageStatus::Solved);
    assert_eq!(page, before);
}

#[test]
fn test_model_shape() {
    let repository = sample_catalog().build_repository();
    let page = plate_page(VoltageTier::LV);
    let machines = MachineRegistry::with_defaults();
    let solver = SimplexSolver::default();
    let model = Calculator::new(&repository, &machines, &solver)
        .build_model(&page)
        .unwrap();

    assert_eq!(model.optimize, "total");
    assert_eq!(model.constraints["link0:i:plate"], LpConstraint::equal(-60.0));
    let r0 = &model.variables["r0"];
    assert_eq!(r0["total"], 1.0);
    assert_eq!(r0["link0:i:plate"], -1.0);
}

#[test]
fn test_custom_objective_name() {
    let repository = sample_catalog().build_repository();
    let mut page = plate_page(VoltageTier::LV);
    page.root_group.push_recipe(RecipeModel::new("r:ingot", VoltageTier::LV));

    let machines = MachineRegistry::with_defaults();
    let solver = SimplexSolver::default();
    let config = CalculatorConfig {
        objective: "machines".to_string(),
        ..CalculatorConfig::default()
    };
    let calculator = Calculator::new(&repository, &machines, &solver).with_config(config);
    let report = calculator.try_update(&mut page).unwrap();
    assert_eq!(report.model.optimize, "machines");
    assert_eq!(report.status, PageStatus::Solved);
}

#[test]
fn test_netting_tolerance_drops_small_residuals() {
    let repository = sample_catalog().build_repository();
    let machines = MachineRegistry::with_defaults();
    // The ingot step overshoots its consumer by half an ingot per minute.
    let solver = FixedSolver(vec![("r0", 60.0), ("r1", 60.5)]);
    let chain = || {
        let mut page = plate_page(VoltageTier::LV);
        page.root_group.push_recipe(RecipeModel::new("r:ingot", VoltageTier::LV));
        page
    };

    let mut page = chain();
    let calculator = Calculator::new(&repository, &machines, &solver);
    assert_eq!(calculator.update(&mut page), PageStatus::Solved);
    assert!(approx(page.root_group.flow.output["i:ingot"], 0.5));
    assert!(!page.root_group.flow.input.contains_key("i:ingot"));

    let mut page = chain();
    let config = CalculatorConfig {
        netting_tolerance: 1.0,
        ..CalculatorConfig::default()
    };
    let calculator = Calculator::new(&repository, &machines, &solver).with_config(config);
    assert_eq!(calculator.update(&mut page), PageStatus::Solved);
    assert!(!page.root_group.flow.output.contains_key("i:ingot"));
    assert!(!page.root_group.flow.input.contains_key("i:ingot"));
    assert!(approx(page.root_group.flow.output["i:plate"], 60.0));
}

#[test]
fn test_ore_dict_picks_first_produced_member_even_if_ignored() {
    let mut b = ImageBuilder::new();
    let ore = b.item("i:ore", "Ore");
    let copper = b.item("i:copper", "Copper Ingot");
    let tin = b.item("i:tin", "Tin Ingot");
    let wire = b.item("i:wire", "Wire");
    let any = b.ore_dict("o:ingotAny", "ingotAny", &[copper, tin]);
    let crafting = b.recipe_type("Crafting", &[], &[], 0);
    b.recipe("r:wire", crafting, &[IoSpec::ore_dict_in(any, 1), IoSpec::item_out(wire, 1)], None);
    b.recipe("r:copper", crafting, &[IoSpec::item_in(ore, 1), IoSpec::item_out(copper, 1)], None);
    b.recipe("r:tin", crafting, &[IoSpec::item_in(ore, 1), IoSpec::item_out(tin, 1)], None);
    let repository = b.build_repository();

    let mut page = PageModel::new("wire");
    page.add_product("i:wire", 10.0);
    page.root_group.push_recipe(RecipeModel::new("r:wire", VoltageTier::LV));
    page.root_group.push_recipe(RecipeModel::new("r:copper", VoltageTier::LV));
    page.root_group.push_recipe(RecipeModel::new("r:tin", VoltageTier::LV));
    page.root_group.set_link("i:copper", LinkAlgorithm::Ignore);

    let machines = MachineRegistry::with_defaults();
    let solver = SimplexSolver::default();
    let calculator = Calculator::new(&repository, &machines, &solver);
    let model = calculator.build_model(&page).unwrap();
    // Copper is declared first and produced here, so it wins; its link is ignored.
    assert!(model.constraints.contains_key("link0:i:wire"));
    assert!(!model.constraints.contains_key("link0:i:copper"));
    assert!(!model.constraints.contains_key("link0:i:tin"));

    assert_eq!(calculator.update(&mut page), PageStatus::Solved);
    let solution = recipe(&page, 0).solution.clone().unwrap();
    assert_eq!(solution.ore_dicts.get("o:ingotAny").map(String::as_str), Some("i:copper"));
    assert!(approx(solution.executions, 10.0));
}

#[test]
fn test_gt_spec_amperage_limits_parallels() {
    let mut b = ImageBuilder::new();
    let dust = b.item("i:dust", "Dust");
    let ingot = b.item("i:ingot", "Ingot");
    let furnace = b.item("i:furnace", "Arc Furnace");
    let arc = b.recipe_type("Arc Furnace", &[0, furnace], &[], furnace);
    let mut gt = GtSpec::new(30, 100, 1);
    gt.amperage = 4;
    b.recipe("r:arc", arc, &[IoSpec::item_in(dust, 1), IoSpec::item_out(ingot, 1)], Some(gt));
    let repository = b.build_repository();

    let mut page = PageModel::new("arc");
    page.add_product("i:ingot", 12.0);
    page.root_group.push_recipe(RecipeModel::new("r:arc", VoltageTier::HV));

    solve(&repository, &mut page);
    let overclock = recipe(&page, 0).solution.as_ref().unwrap().overclock;
    // 512 / (30 * 4) = 4 -> one overclock of headroom
    assert_eq!(overclock.max_parallels, 4.0);
    assert_eq!(overclock.normal_overclocks, 1);
}
