//! Supply/demand accumulation for link constraints.
//!
//! Every recipe variable contributes a signed amount per good: inputs add,
//! outputs subtract. A group turns each good that is both consumed and
//! produced inside it into one equality row of the LP model.

use std::collections::BTreeMap;

/// Recipe-variable name to signed amount.
pub type Terms = BTreeMap<String, f64>;

/// Per-good and per-ore-dict accumulator of recipe-variable contributions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkCollection {
    goods: BTreeMap<String, Terms>,
    ore_dicts: BTreeMap<String, Terms>,
    ore_dict_users: BTreeMap<String, Vec<usize>>,
    demand: BTreeMap<String, f64>,
}

impl LinkCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` consumed per execution of `var`.
    pub fn add_input(&mut self, goods_id: &str, var: &str, amount: f64) {
        if amount == 0.0 {
            return;
        }
        *self
            .goods
            .entry(goods_id.to_string())
            .or_default()
            .entry(var.to_string())
            .or_insert(0.0) += amount;
    }

    /// Adds `amount` produced per execution of `var`.
    pub fn add_output(&mut self, goods_id: &str, var: &str, amount: f64) {
        if amount == 0.0 {
            return;
        }
        *self
            .goods
            .entry(goods_id.to_string())
            .or_default()
            .entry(var.to_string())
            .or_insert(0.0) -= amount;
    }

    /// Adds an ore-dict input and remembers which recipe node uses it.
    pub fn add_input_ore_dict(&mut self, ore_dict_id: &str, var: &str, amount: f64, recipe: usize) {
        if amount == 0.0 {
            return;
        }
        *self
            .ore_dicts
            .entry(ore_dict_id.to_string())
            .or_default()
            .entry(var.to_string())
            .or_insert(0.0) += amount;
        let users = self.ore_dict_users.entry(ore_dict_id.to_string()).or_default();
        if !users.contains(&recipe) {
            users.push(recipe);
        }
    }

    /// Adds a fixed demand for a good; positive amounts are consumption.
    pub fn add_demand(&mut self, goods_id: &str, amount: f64) {
        if amount == 0.0 {
            return;
        }
        *self.demand.entry(goods_id.to_string()).or_insert(0.0) += amount;
    }

    /// Unions a child scope's collection into this one.
    pub fn merge(&mut self, child: LinkCollection) {
        for (goods_id, terms) in child.goods {
            let entry = self.goods.entry(goods_id).or_default();
            for (var, amount) in terms {
                *entry.entry(var).or_insert(0.0) += amount;
            }
        }
        for (ore_dict_id, terms) in child.ore_dicts {
            let entry = self.ore_dicts.entry(ore_dict_id).or_default();
            for (var, amount) in terms {
                *entry.entry(var).or_insert(0.0) += amount;
            }
        }
        for (ore_dict_id, users) in child.ore_dict_users {
            let entry = self.ore_dict_users.entry(ore_dict_id).or_default();
            for user in users {
                if !entry.contains(&user) {
                    entry.push(user);
                }
            }
        }
        for (goods_id, amount) in child.demand {
            *self.demand.entry(goods_id).or_insert(0.0) += amount;
        }
    }

    /// Good ids with any contribution, in sorted order.
    pub fn goods_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.goods.keys().cloned().collect();
        for id in self.demand.keys() {
            if !self.goods.contains_key(id) {
                ids.push(id.clone());
            }
        }
        ids.sort();
        ids
    }

    pub fn ore_dict_ids(&self) -> Vec<String> {
        self.ore_dicts.keys().cloned().collect()
    }

    pub fn terms(&self, goods_id: &str) -> Option<&Terms> {
        self.goods.get(goods_id)
    }

    pub fn ore_dict_terms(&self, ore_dict_id: &str) -> Option<&Terms> {
        self.ore_dicts.get(ore_dict_id)
    }

    pub fn ore_dict_users(&self, ore_dict_id: &str) -> &[usize] {
        self.ore_dict_users
            .get(ore_dict_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Fixed demand for a good (0 when none).
    pub fn constant(&self, goods_id: &str) -> f64 {
        self.demand.get(goods_id).copied().unwrap_or(0.0)
    }

    /// Consumed at this scope, by a recipe or a positive demand.
    pub fn has_input(&self, goods_id: &str) -> bool {
        self.constant(goods_id) > 0.0
            || self
                .goods
                .get(goods_id)
                .is_some_and(|terms| terms.values().any(|v| *v > 0.0))
    }

    /// Produced at this scope, by a recipe or a negative demand.
    pub fn has_output(&self, goods_id: &str) -> bool {
        self.constant(goods_id) < 0.0
            || self
                .goods
                .get(goods_id)
                .is_some_and(|terms| terms.values().any(|v| *v < 0.0))
    }

    /// Folds an ore-dict's inputs into a concrete item and returns the
    /// recipe nodes that referenced it.
    pub fn resolve_ore_dict(&mut self, ore_dict_id: &str, item_id: &str) -> Vec<usize> {
        if let Some(terms) = self.ore_dicts.remove(ore_dict_id) {
            for (var, amount) in terms {
                self.add_input(item_id, &var, amount);
            }
        }
        self.ore_dict_users.remove(ore_dict_id).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.goods.is_empty() && self.ore_dicts.is_empty() && self.demand.is_empty()
    }
}
