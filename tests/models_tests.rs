//! Tests for project data structures.

use gtplanner::machines::VoltageTier;
use gtplanner::models::{
    FlowInformation, LinkAlgorithm, ModelVisitor, PageModel, RecipeGroupEntry, RecipeGroupModel,
    RecipeModel,
};
use gtplanner::test_utils::sample_catalog;
use serde_json::json;

fn sample_page() -> PageModel {
    let mut page = PageModel::new("Plates");
    page.add_product("i:plate", 60.0);
    let mut node = RecipeModel::new("r:plate", VoltageTier::HV);
    node.crafter = Some("i:bender_hv".to_string());
    page.root_group.push_recipe(node);

    let mut group = RecipeGroupModel::new("ingots");
    group.set_link("i:ingot", LinkAlgorithm::Ignore);
    group.push_recipe(RecipeModel::new("r:ingot", VoltageTier::LV));
    page.root_group.push_group(group);
    page
}

#[test]
fn test_flow_net_keeps_dominant_side() {
    let mut flow = FlowInformation::default();
    flow.add_input("i:a", 10.0);
    flow.add_output("i:a", 7.0);
    flow.net("i:a", 0.01);
    assert_eq!(flow.input.get("i:a"), Some(&3.0));
    assert!(!flow.output.contains_key("i:a"));

    flow.add_output("i:b", 5.0);
    flow.net("i:b", 0.01);
    assert_eq!(flow.output.get("i:b"), Some(&5.0));
}

#[test]
fn test_flow_net_drops_cancelled_goods() {
    let mut flow = FlowInformation::default();
    flow.add_input("i:a", 10.0);
    flow.add_output("i:a", 10.005);
    flow.net("i:a", 0.01);
    assert!(flow.is_empty());

    // Untouched goods stay untouched.
    flow.net("i:missing", 0.01);
    assert!(flow.is_empty());
}

#[test]
fn test_flow_merge_sums() {
    let mut a = FlowInformation::default();
    a.add_input("i:a", 1.0);
    a.add_energy(VoltageTier::LV, 30.0);
    let mut b = FlowInformation::default();
    b.add_input("i:a", 2.0);
    b.add_output("i:b", 4.0);
    b.add_energy(VoltageTier::LV, 10.0);
    b.add_energy(VoltageTier::HV, 100.0);

    a.merge(&b);
    assert_eq!(a.input["i:a"], 3.0);
    assert_eq!(a.output["i:b"], 4.0);
    assert_eq!(a.energy[&VoltageTier::LV], 40.0);
    assert_eq!(a.total_energy(), 140.0);
}

#[test]
fn test_project_json_shape() {
    let value = serde_json::to_value(sample_page()).unwrap();
    assert_eq!(
        value,
        json!({
            "name": "Plates",
            "products": [{"goodsId": "i:plate", "amount": 60.0}],
            "rootGroup": {
                "name": "root",
                "collapsed": false,
                "links": {},
                "elements": [
                    {
                        "type": "recipe",
                        "recipeId": "r:plate",
                        "voltageTier": 3,
                        "crafter": "i:bender_hv",
                        "choices": {}
                    },
                    {
                        "type": "group",
                        "name": "ingots",
                        "collapsed": false,
                        "links": {"i:ingot": "Ignore"},
                        "elements": [
                            {"type": "recipe", "recipeId": "r:ingot", "voltageTier": 1, "choices": {}}
                        ]
                    }
                ]
            }
        })
    );
}

#[test]
fn test_project_json_defaults() {
    let json = r#"{
        "name": "Minimal",
        "rootGroup": {"elements": [{"type": "recipe", "recipeId": "r:plate"}]}
    }"#;
    let page: PageModel = serde_json::from_str(json).unwrap();
    assert!(page.products.is_empty());
    let recipe = page.root_group.recipes().next().unwrap();
    assert_eq!(recipe.voltage_tier, VoltageTier::LV);
    assert!(recipe.choices.is_empty());
    assert_eq!(recipe.fixed_crafter_count, None);
    assert!(recipe.solution.is_none());
}

#[test]
fn test_project_json_round_trip_drops_results() {
    let mut page = sample_page();
    page.root_group.flow.add_input("i:ore", 60.0);
    let json = serde_json::to_string(&page).unwrap();
    let back: PageModel = serde_json::from_str(&json).unwrap();
    assert!(back.root_group.flow.is_empty());
    assert_eq!(back.root_group.elements.len(), 2);
}

#[test]
fn test_link_algorithm_defaults_to_match() {
    let page = sample_page();
    assert_eq!(page.root_group.link_algorithm("i:ingot"), LinkAlgorithm::Match);
    let RecipeGroupEntry::Group(group) = &page.root_group.elements[1] else {
        panic!("expected a group");
    };
    assert_eq!(group.link_algorithm("i:ingot"), LinkAlgorithm::Ignore);
    assert_eq!(page.root_group.groups().count(), 1);
}

#[test]
fn test_referenced_and_missing_ids() {
    let mut page = sample_page();
    page.root_group.push_recipe(RecipeModel::new("r:gone", VoltageTier::LV));
    let ids = page.referenced_ids();
    assert!(ids.contains("i:plate"));
    assert!(ids.contains("i:bender_hv"));
    assert!(ids.contains("r:ingot"));

    let repository = sample_catalog().build_repository();
    assert_eq!(page.missing_references(&repository), vec!["r:gone"]);
}

#[test]
fn test_visitor_walks_nested_groups() {
    #[derive(Default)]
    struct Counter {
        groups: usize,
        recipes: usize,
        products: usize,
    }

    impl ModelVisitor for Counter {
        fn visit_product(&mut self, _product: &gtplanner::models::ProductModel) {
            self.products += 1;
        }

        fn visit_group(&mut self, group: &RecipeGroupModel) {
            self.groups += 1;
            gtplanner::models::walk_group(self, group);
        }

        fn visit_recipe(&mut self, _recipe: &RecipeModel) {
            self.recipes += 1;
        }
    }

    let mut counter = Counter::default();
    counter.visit_page(&sample_page());
    assert_eq!((counter.groups, counter.recipes, counter.products), (2, 2, 1));
}
