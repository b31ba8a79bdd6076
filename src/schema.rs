//! Typed views over repository objects.
//!
//! Each view is a repository reference plus the cached [`ObjectCell`] for its
//! offset. Scalar, string and slice fields are read lazily through the
//! repository, so they share its memoization. Ore-dicts and recipe types
//! resolve their member arrays when the cell is first decoded; a recipe's
//! I/O list is decoded once on first access.

use std::cell::OnceCell;
use std::rc::Rc;

use tracing::warn;

use crate::repository::{Repository, SearchableKind};
use crate::search::SearchQuery;

/// Word offsets of every object field.
pub mod layout {
    /// Searchable objects: id string (after the four signature words).
    pub const ID: u32 = 4;

    // Goods (items and fluids)
    pub const GOODS_NAME: u32 = 5;
    pub const GOODS_MOD: u32 = 6;
    pub const GOODS_INTERNAL_NAME: u32 = 7;
    pub const GOODS_NUMERIC_ID: u32 = 8;
    pub const GOODS_ICON: u32 = 9;
    pub const GOODS_TOOLTIP: u32 = 10;
    pub const GOODS_UNLOCALIZED_NAME: u32 = 11;

    pub const ITEM_STACK_SIZE: u32 = 12;
    pub const ITEM_DAMAGE: u32 = 13;
    pub const ITEM_CONTAINER: u32 = 14;
    pub const ITEM_WORDS: u32 = 15;

    pub const FLUID_IS_GAS: u32 = 12;
    pub const FLUID_TEMPERATURE: u32 = 13;
    pub const FLUID_WORDS: u32 = 14;

    pub const CONTAINER_FLUID: u32 = 0;
    pub const CONTAINER_AMOUNT: u32 = 1;
    pub const CONTAINER_EMPTY: u32 = 2;
    pub const CONTAINER_WORDS: u32 = 3;

    pub const ORE_DICT_NAME: u32 = 5;
    pub const ORE_DICT_ITEMS: u32 = 6;
    pub const ORE_DICT_WORDS: u32 = 7;

    pub const RECIPE_TYPE_NAME: u32 = 0;
    pub const RECIPE_TYPE_CATEGORY: u32 = 1;
    pub const RECIPE_TYPE_SINGLE_BLOCKS: u32 = 2;
    pub const RECIPE_TYPE_MULTI_BLOCKS: u32 = 3;
    pub const RECIPE_TYPE_DEFAULT_CRAFTER: u32 = 4;
    pub const RECIPE_TYPE_WORDS: u32 = 5;

    pub const RECIPE_TYPE: u32 = 5;
    pub const RECIPE_IO: u32 = 6;
    pub const RECIPE_GT: u32 = 7;
    pub const RECIPE_WORDS: u32 = 8;

    /// Words per flattened I/O record.
    pub const IO_RECORD_WORDS: usize = 5;

    pub const GT_VOLTAGE: u32 = 0;
    pub const GT_AMPERAGE: u32 = 1;
    pub const GT_DURATION: u32 = 2;
    pub const GT_VOLTAGE_TIER: u32 = 3;
    pub const GT_FLAGS: u32 = 4;
    pub const GT_INFO: u32 = 5;
    pub const GT_WORDS: u32 = 6;

    pub const GT_FLAG_CLEAN_ROOM: u32 = 1;
    pub const GT_FLAG_LOW_GRAVITY: u32 = 2;
}

/// Every object layout the repository decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Item,
    Fluid,
    OreDict,
    RecipeType,
    Recipe,
    GtRecipe,
    FluidContainer,
}

/// Role of an I/O slot within a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipeIoType {
    ItemInput,
    OreDictInput,
    FluidInput,
    ItemOutput,
    FluidOutput,
}

/// I/O type by its encoded index.
const IO_TYPES: [RecipeIoType; 5] = [
    RecipeIoType::ItemInput,
    RecipeIoType::OreDictInput,
    RecipeIoType::FluidInput,
    RecipeIoType::ItemOutput,
    RecipeIoType::FluidOutput,
];

impl RecipeIoType {
    pub fn from_index(index: u32) -> Option<RecipeIoType> {
        IO_TYPES.get(index as usize).copied()
    }

    pub fn index(self) -> u32 {
        IO_TYPES.iter().position(|t| *t == self).unwrap_or(0) as u32
    }

    pub fn is_input(self) -> bool {
        matches!(
            self,
            RecipeIoType::ItemInput | RecipeIoType::OreDictInput | RecipeIoType::FluidInput
        )
    }

    /// Kind of object referenced by slots of this type.
    pub fn goods_kind(self) -> SearchableKind {
        match self {
            RecipeIoType::ItemInput | RecipeIoType::ItemOutput => SearchableKind::Item,
            RecipeIoType::OreDictInput => SearchableKind::OreDict,
            RecipeIoType::FluidInput | RecipeIoType::FluidOutput => SearchableKind::Fluid,
        }
    }
}

/// A raw I/O record, as flattened in the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRecipeIo {
    pub io_type: RecipeIoType,
    pub goods_pointer: u32,
    pub slot: u32,
    pub amount: u32,
    pub probability: f32,
}

/// Decoded contents of one cached object.
pub struct ObjectCell {
    kind: ObjectKind,
    pointer: u32,
    members: Rc<[Rc<ObjectCell>]>,
    tiered: Rc<[Option<Rc<ObjectCell>>]>,
    io: OnceCell<Rc<[RawRecipeIo]>>,
}

impl std::fmt::Debug for ObjectCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCell")
            .field("kind", &self.kind)
            .field("pointer", &self.pointer)
            .finish()
    }
}

impl ObjectCell {
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn pointer(&self) -> u32 {
        self.pointer
    }
}

/// Builds the cache cell for an object, resolving eager member arrays.
pub(crate) fn decode_cell(repo: &Repository, kind: ObjectKind, pointer: u32) -> ObjectCell {
    let mut members: Vec<Rc<ObjectCell>> = Vec::new();
    let mut tiered: Vec<Option<Rc<ObjectCell>>> = Vec::new();
    match kind {
        ObjectKind::OreDict => {
            let items = repo.get_slice(repo.word(pointer + layout::ORE_DICT_ITEMS));
            members.extend(
                items
                    .iter()
                    .filter_map(|&p| repo.get_object::<Item>(p))
                    .map(|item| item.cell),
            );
        }
        ObjectKind::RecipeType => {
            let single = repo.get_slice(repo.word(pointer + layout::RECIPE_TYPE_SINGLE_BLOCKS));
            tiered.extend(
                single
                    .iter()
                    .map(|&p| repo.get_object::<Item>(p).map(|item| item.cell)),
            );
            let multi = repo.get_slice(repo.word(pointer + layout::RECIPE_TYPE_MULTI_BLOCKS));
            members.extend(
                multi
                    .iter()
                    .filter_map(|&p| repo.get_object::<Item>(p))
                    .map(|item| item.cell),
            );
        }
        _ => {}
    }
    ObjectCell {
        kind,
        pointer,
        members: Rc::from(members),
        tiered: Rc::from(tiered),
        io: OnceCell::new(),
    }
}

/// A typed projection constructed from a cached cell.
pub trait Schema<'r>: Sized {
    const KIND: ObjectKind;

    fn from_cell(repo: &'r Repository, cell: Rc<ObjectCell>) -> Self;
}

macro_rules! object_view {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name<'r> {
            repo: &'r Repository,
            cell: Rc<ObjectCell>,
        }

        impl<'r> Schema<'r> for $name<'r> {
            const KIND: ObjectKind = $kind;

            fn from_cell(repo: &'r Repository, cell: Rc<ObjectCell>) -> Self {
                $name { repo, cell }
            }
        }

        impl<'r> $name<'r> {
            /// Offset of this object in the image.
            pub fn pointer(&self) -> u32 {
                self.cell.pointer
            }

            /// The shared cache cell backing this view.
            pub fn cell(&self) -> &Rc<ObjectCell> {
                &self.cell
            }

            #[allow(dead_code)]
            fn word(&self, field: u32) -> u32 {
                self.repo.word(self.cell.pointer + field)
            }

            #[allow(dead_code)]
            fn string(&self, field: u32) -> Rc<str> {
                self.repo.get_string(self.word(field))
            }
        }

        impl std::fmt::Debug for $name<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("pointer", &self.cell.pointer)
                    .finish()
            }
        }

        impl PartialEq for $name<'_> {
            fn eq(&self, other: &Self) -> bool {
                Rc::ptr_eq(&self.cell, &other.cell)
            }
        }
    };
}

object_view!(
    /// An item (solid goods).
    Item,
    ObjectKind::Item
);
object_view!(
    /// A fluid.
    Fluid,
    ObjectKind::Fluid
);
object_view!(
    /// A named class of interchangeable items.
    OreDict,
    ObjectKind::OreDict
);
object_view!(
    /// The machine family a recipe belongs to.
    RecipeType,
    ObjectKind::RecipeType
);
object_view!(
    /// A transformation with input and output slots.
    Recipe,
    ObjectKind::Recipe
);
object_view!(
    /// Machine parameters of a timed recipe.
    GtRecipe,
    ObjectKind::GtRecipe
);
object_view!(
    /// Association between a filled container item and its fluid.
    FluidContainer,
    ObjectKind::FluidContainer
);

fn good_matches(name: &str, tooltip: &str, mod_name: &str, query: &SearchQuery) -> bool {
    query.matches_mod(mod_name) && query.matches_text(&[name, tooltip])
}

impl<'r> Item<'r> {
    pub fn id(&self) -> Rc<str> {
        self.string(layout::ID)
    }

    pub fn name(&self) -> Rc<str> {
        self.string(layout::GOODS_NAME)
    }

    pub fn mod_name(&self) -> Rc<str> {
        self.string(layout::GOODS_MOD)
    }

    pub fn internal_name(&self) -> Rc<str> {
        self.string(layout::GOODS_INTERNAL_NAME)
    }

    pub fn numeric_id(&self) -> u32 {
        self.word(layout::GOODS_NUMERIC_ID)
    }

    pub fn icon_id(&self) -> u32 {
        self.word(layout::GOODS_ICON)
    }

    /// Tooltip text; empty when the item has none.
    pub fn tooltip(&self) -> Rc<str> {
        self.string(layout::GOODS_TOOLTIP)
    }

    pub fn unlocalized_name(&self) -> Rc<str> {
        self.string(layout::GOODS_UNLOCALIZED_NAME)
    }

    pub fn stack_size(&self) -> u32 {
        self.word(layout::ITEM_STACK_SIZE)
    }

    pub fn damage(&self) -> u32 {
        self.word(layout::ITEM_DAMAGE)
    }

    /// The fluid this item holds, if it is a filled container.
    pub fn container(&self) -> Option<FluidContainer<'r>> {
        self.repo.get_object(self.word(layout::ITEM_CONTAINER))
    }

    pub fn matches_text(&self, query: &SearchQuery) -> bool {
        good_matches(&self.name(), &self.tooltip(), &self.mod_name(), query)
    }
}

impl<'r> Fluid<'r> {
    pub fn id(&self) -> Rc<str> {
        self.string(layout::ID)
    }

    pub fn name(&self) -> Rc<str> {
        self.string(layout::GOODS_NAME)
    }

    pub fn mod_name(&self) -> Rc<str> {
        self.string(layout::GOODS_MOD)
    }

    pub fn internal_name(&self) -> Rc<str> {
        self.string(layout::GOODS_INTERNAL_NAME)
    }

    pub fn numeric_id(&self) -> u32 {
        self.word(layout::GOODS_NUMERIC_ID)
    }

    pub fn icon_id(&self) -> u32 {
        self.word(layout::GOODS_ICON)
    }

    pub fn tooltip(&self) -> Rc<str> {
        self.string(layout::GOODS_TOOLTIP)
    }

    pub fn unlocalized_name(&self) -> Rc<str> {
        self.string(layout::GOODS_UNLOCALIZED_NAME)
    }

    pub fn is_gas(&self) -> bool {
        self.word(layout::FLUID_IS_GAS) != 0
    }

    pub fn temperature(&self) -> u32 {
        self.word(layout::FLUID_TEMPERATURE)
    }

    pub fn matches_text(&self, query: &SearchQuery) -> bool {
        good_matches(&self.name(), &self.tooltip(), &self.mod_name(), query)
    }
}

impl<'r> FluidContainer<'r> {
    pub fn fluid(&self) -> Option<Fluid<'r>> {
        self.repo.get_object(self.word(layout::CONTAINER_FLUID))
    }

    /// Fluid amount held by one container.
    pub fn amount(&self) -> u32 {
        self.word(layout::CONTAINER_AMOUNT)
    }

    pub fn empty(&self) -> Option<Item<'r>> {
        self.repo.get_object(self.word(layout::CONTAINER_EMPTY))
    }
}

impl<'r> OreDict<'r> {
    pub fn id(&self) -> Rc<str> {
        self.string(layout::ID)
    }

    pub fn name(&self) -> Rc<str> {
        self.string(layout::ORE_DICT_NAME)
    }

    /// Member items in declared order.
    pub fn items(&self) -> Vec<Item<'r>> {
        self.cell
            .members
            .iter()
            .map(|cell| Item::from_cell(self.repo, cell.clone()))
            .collect()
    }

    /// Matches when any member item passes both the bit and text checks.
    pub fn matches_text(&self, query: &SearchQuery) -> bool {
        self.items().iter().any(|item| {
            self.repo.object_match_query_bits(query, item.pointer()) && item.matches_text(query)
        })
    }
}

impl<'r> RecipeType<'r> {
    pub fn name(&self) -> Rc<str> {
        self.string(layout::RECIPE_TYPE_NAME)
    }

    pub fn category(&self) -> Rc<str> {
        self.string(layout::RECIPE_TYPE_CATEGORY)
    }

    /// Single-block crafters indexed by voltage tier.
    pub fn single_blocks(&self) -> Vec<Option<Item<'r>>> {
        self.cell
            .tiered
            .iter()
            .map(|cell| cell.as_ref().map(|c| Item::from_cell(self.repo, c.clone())))
            .collect()
    }

    pub fn multi_blocks(&self) -> Vec<Item<'r>> {
        self.cell
            .members
            .iter()
            .map(|cell| Item::from_cell(self.repo, cell.clone()))
            .collect()
    }

    pub fn default_crafter(&self) -> Option<Item<'r>> {
        self.repo.get_object(self.word(layout::RECIPE_TYPE_DEFAULT_CRAFTER))
    }

    /// The single-block for `tier`, walking down to tier 0 when absent.
    pub fn single_block_for_tier(&self, tier: usize) -> Option<Item<'r>> {
        let tiered = &self.cell.tiered;
        if tiered.is_empty() {
            return None;
        }
        let top = tier.min(tiered.len() - 1);
        (0..=top)
            .rev()
            .find_map(|t| tiered[t].as_ref())
            .map(|cell| Item::from_cell(self.repo, cell.clone()))
    }

    /// Returns `true` if `item_id` is one of this type's crafters.
    pub fn is_valid_crafter(&self, item_id: &str) -> bool {
        let single = self.single_blocks().into_iter().flatten();
        let default = self.default_crafter();
        single
            .chain(self.multi_blocks())
            .chain(default)
            .any(|item| item.id().as_ref() == item_id)
    }
}

/// One decoded I/O slot of a recipe.
#[derive(Debug, Clone)]
pub struct RecipeIoEntry<'r> {
    pub io_type: RecipeIoType,
    pub goods_pointer: u32,
    pub goods: SearchableObject<'r>,
    pub slot: u32,
    pub amount: f64,
    pub probability: f64,
}

impl<'r> Recipe<'r> {
    pub fn id(&self) -> Rc<str> {
        self.string(layout::ID)
    }

    pub fn recipe_type(&self) -> Option<RecipeType<'r>> {
        self.repo.get_object(self.word(layout::RECIPE_TYPE))
    }

    /// Machine parameters; `None` for instant (crafting-grid) recipes.
    pub fn gt_recipe(&self) -> Option<GtRecipe<'r>> {
        self.repo.get_object(self.word(layout::RECIPE_GT))
    }

    pub fn is_instant(&self) -> bool {
        self.word(layout::RECIPE_GT) == 0
    }

    fn raw_items(&self) -> Rc<[RawRecipeIo]> {
        self.cell
            .io
            .get_or_init(|| {
                let flat = self.repo.get_slice(self.word(layout::RECIPE_IO));
                flat.chunks_exact(layout::IO_RECORD_WORDS)
                    .filter_map(|record| {
                        let Some(io_type) = RecipeIoType::from_index(record[0]) else {
                            warn!(recipe = self.cell.pointer, io_type = record[0], "unknown io type");
                            return None;
                        };
                        Some(RawRecipeIo {
                            io_type,
                            goods_pointer: record[1],
                            slot: record[2],
                            amount: record[3],
                            probability: f32::from_bits(record[4]),
                        })
                    })
                    .collect()
            })
            .clone()
    }

    /// I/O slots with their goods resolved; slots pointing nowhere are dropped.
    pub fn items(&self) -> Vec<RecipeIoEntry<'r>> {
        self.raw_items()
            .iter()
            .filter_map(|raw| {
                let goods = self
                    .repo
                    .get_searchable(raw.io_type.goods_kind(), raw.goods_pointer)?;
                let probability = if raw.probability.is_finite() {
                    f64::from(raw.probability).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                Some(RecipeIoEntry {
                    io_type: raw.io_type,
                    goods_pointer: raw.goods_pointer,
                    goods,
                    slot: raw.slot,
                    amount: f64::from(raw.amount),
                    probability,
                })
            })
            .collect()
    }

    /// Matches when any slot's object matches.
    pub fn matches_text(&self, query: &SearchQuery) -> bool {
        self.items()
            .iter()
            .any(|io| self.repo.is_object_matching_search(query, &io.goods))
    }
}

/// Ticks per second of game time.
pub const TICKS_PER_SECOND: f64 = 20.0;

impl<'r> GtRecipe<'r> {
    /// Base voltage in EU/t.
    pub fn voltage(&self) -> u32 {
        self.word(layout::GT_VOLTAGE)
    }

    pub fn amperage(&self) -> u32 {
        self.word(layout::GT_AMPERAGE)
    }

    pub fn duration_ticks(&self) -> u32 {
        self.word(layout::GT_DURATION)
    }

    pub fn duration_minutes(&self) -> f64 {
        f64::from(self.duration_ticks()) / TICKS_PER_SECOND / 60.0
    }

    /// Minimum voltage tier able to run the recipe.
    pub fn voltage_tier(&self) -> u32 {
        self.word(layout::GT_VOLTAGE_TIER)
    }

    pub fn clean_room(&self) -> bool {
        self.word(layout::GT_FLAGS) & layout::GT_FLAG_CLEAN_ROOM != 0
    }

    pub fn low_gravity(&self) -> bool {
        self.word(layout::GT_FLAGS) & layout::GT_FLAG_LOW_GRAVITY != 0
    }

    pub fn additional_info(&self) -> Rc<str> {
        self.string(layout::GT_INFO)
    }
}

/// An item or fluid.
#[derive(Debug, Clone, PartialEq)]
pub enum Goods<'r> {
    Item(Item<'r>),
    Fluid(Fluid<'r>),
}

impl<'r> Goods<'r> {
    pub fn id(&self) -> Rc<str> {
        match self {
            Goods::Item(item) => item.id(),
            Goods::Fluid(fluid) => fluid.id(),
        }
    }

    pub fn name(&self) -> Rc<str> {
        match self {
            Goods::Item(item) => item.name(),
            Goods::Fluid(fluid) => fluid.name(),
        }
    }

    pub fn mod_name(&self) -> Rc<str> {
        match self {
            Goods::Item(item) => item.mod_name(),
            Goods::Fluid(fluid) => fluid.mod_name(),
        }
    }

    pub fn pointer(&self) -> u32 {
        match self {
            Goods::Item(item) => item.pointer(),
            Goods::Fluid(fluid) => fluid.pointer(),
        }
    }
}

/// Any object reachable by id.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchableObject<'r> {
    Item(Item<'r>),
    Fluid(Fluid<'r>),
    OreDict(OreDict<'r>),
    Recipe(Recipe<'r>),
}

impl<'r> SearchableObject<'r> {
    pub fn id(&self) -> Rc<str> {
        match self {
            SearchableObject::Item(o) => o.id(),
            SearchableObject::Fluid(o) => o.id(),
            SearchableObject::OreDict(o) => o.id(),
            SearchableObject::Recipe(o) => o.id(),
        }
    }

    pub fn pointer(&self) -> u32 {
        match self {
            SearchableObject::Item(o) => o.pointer(),
            SearchableObject::Fluid(o) => o.pointer(),
            SearchableObject::OreDict(o) => o.pointer(),
            SearchableObject::Recipe(o) => o.pointer(),
        }
    }

    pub fn kind(&self) -> SearchableKind {
        match self {
            SearchableObject::Item(_) => SearchableKind::Item,
            SearchableObject::Fluid(_) => SearchableKind::Fluid,
            SearchableObject::OreDict(_) => SearchableKind::OreDict,
            SearchableObject::Recipe(_) => SearchableKind::Recipe,
        }
    }

    /// Display name; recipes have none and show their id.
    pub fn name(&self) -> Rc<str> {
        match self {
            SearchableObject::Item(o) => o.name(),
            SearchableObject::Fluid(o) => o.name(),
            SearchableObject::OreDict(o) => o.name(),
            SearchableObject::Recipe(o) => o.id(),
        }
    }

    /// Type-specific text confirmation.
    pub fn matches_text(&self, query: &SearchQuery) -> bool {
        match self {
            SearchableObject::Item(o) => o.matches_text(query),
            SearchableObject::Fluid(o) => o.matches_text(query),
            SearchableObject::OreDict(o) => o.matches_text(query),
            SearchableObject::Recipe(o) => o.matches_text(query),
        }
    }

    pub fn as_goods(&self) -> Option<Goods<'r>> {
        match self {
            SearchableObject::Item(item) => Some(Goods::Item(item.clone())),
            SearchableObject::Fluid(fluid) => Some(Goods::Fluid(fluid.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_type_dispatch_table() {
        for (index, io_type) in IO_TYPES.iter().enumerate() {
            assert_eq!(RecipeIoType::from_index(index as u32), Some(*io_type));
            assert_eq!(io_type.index(), index as u32);
        }
        assert_eq!(RecipeIoType::from_index(5), None);
    }

    #[test]
    fn test_io_type_direction() {
        assert!(RecipeIoType::OreDictInput.is_input());
        assert!(!RecipeIoType::FluidOutput.is_input());
        assert_eq!(RecipeIoType::OreDictInput.goods_kind(), SearchableKind::OreDict);
        assert_eq!(RecipeIoType::ItemOutput.goods_kind(), SearchableKind::Item);
    }
}
