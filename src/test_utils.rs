//! Builders for small repository images used by tests.
//!
//! Enabled for this crate's unit tests and, through the `test-utils` feature,
//! for the integration tests under `tests/`.

use std::collections::HashMap;

use crate::repository::{
    Repository, FORMAT_VERSION, TABLE_FLUIDS, TABLE_ITEMS, TABLE_ORE_DICTS, TABLE_RECIPES,
    TABLE_RECIPE_TYPES, TABLE_SERVICES,
};
use crate::schema::{layout, RecipeIoType};
use crate::search::{compute_signature, Signature, SIGNATURE_WORDS};

const HEADER_WORDS: usize = 7;

/// One I/O slot of a recipe under construction.
#[derive(Debug, Clone, Copy)]
pub struct IoSpec {
    pub io_type: RecipeIoType,
    pub goods: u32,
    pub amount: u32,
    pub probability: f32,
}

impl IoSpec {
    pub fn new(io_type: RecipeIoType, goods: u32, amount: u32) -> Self {
        IoSpec {
            io_type,
            goods,
            amount,
            probability: 1.0,
        }
    }

    pub fn item_in(goods: u32, amount: u32) -> Self {
        IoSpec::new(RecipeIoType::ItemInput, goods, amount)
    }

    pub fn item_out(goods: u32, amount: u32) -> Self {
        IoSpec::new(RecipeIoType::ItemOutput, goods, amount)
    }

    pub fn fluid_in(goods: u32, amount: u32) -> Self {
        IoSpec::new(RecipeIoType::FluidInput, goods, amount)
    }

    pub fn fluid_out(goods: u32, amount: u32) -> Self {
        IoSpec::new(RecipeIoType::FluidOutput, goods, amount)
    }

    pub fn ore_dict_in(goods: u32, amount: u32) -> Self {
        IoSpec::new(RecipeIoType::OreDictInput, goods, amount)
    }

    pub fn with_probability(mut self, probability: f32) -> Self {
        self.probability = probability;
        self
    }
}

/// Machine parameters of a timed recipe.
#[derive(Debug, Clone, Default)]
pub struct GtSpec {
    pub voltage: u32,
    pub amperage: u32,
    pub duration_ticks: u32,
    pub voltage_tier: u32,
    pub clean_room: bool,
    pub low_gravity: bool,
    pub info: String,
}

impl GtSpec {
    pub fn new(voltage: u32, duration_ticks: u32, voltage_tier: u32) -> Self {
        GtSpec {
            voltage,
            amperage: 1,
            duration_ticks,
            voltage_tier,
            ..Default::default()
        }
    }
}

/// Writes objects into a word image laid out the way [`Repository`] reads it.
///
/// Every method returns the word offset of what it wrote, which is what the
/// other methods take as references.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    words: Vec<u32>,
    tables: [Vec<u32>; 6],
    signatures: HashMap<u32, Signature>,
    version: u32,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        ImageBuilder::new()
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        ImageBuilder {
            words: vec![0; HEADER_WORDS],
            tables: Default::default(),
            signatures: HashMap::new(),
            version: FORMAT_VERSION,
        }
    }

    /// Overrides the version word, for mismatch tests.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    fn alloc(&mut self, words: u32) -> u32 {
        let pointer = self.words.len() as u32;
        self.words.resize(self.words.len() + words as usize, 0);
        pointer
    }

    fn set(&mut self, pointer: u32, field: u32, value: u32) {
        self.words[(pointer + field) as usize] = value;
    }

    /// Writes a length-prefixed string; the empty string is the null pointer.
    pub fn string(&mut self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        let bytes = text.as_bytes();
        let pointer = self.alloc(1 + bytes.len().div_ceil(4) as u32);
        self.words[pointer as usize] = bytes.len() as u32;
        for (i, chunk) in bytes.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.words[pointer as usize + 1 + i] = u32::from_le_bytes(word);
        }
        pointer
    }

    /// Writes a count-prefixed word slice; an empty slice is the null pointer.
    pub fn slice(&mut self, values: &[u32]) -> u32 {
        if values.is_empty() {
            return 0;
        }
        let pointer = self.alloc(1 + values.len() as u32);
        self.words[pointer as usize] = values.len() as u32;
        self.words[pointer as usize + 1..pointer as usize + 1 + values.len()].copy_from_slice(values);
        pointer
    }

    fn write_signature(&mut self, pointer: u32, signature: Signature) {
        for i in 0..SIGNATURE_WORDS {
            self.words[pointer as usize + i] = signature.0[i];
        }
        self.signatures.insert(pointer, signature);
    }

    fn signature_of(&self, pointer: u32) -> Signature {
        self.signatures.get(&pointer).copied().unwrap_or_default()
    }

    fn goods(&mut self, words: u32, id: &str, name: &str, mod_name: &str, tooltip: &str) -> u32 {
        let pointer = self.alloc(words);
        self.write_signature(pointer, compute_signature(&[name, tooltip]));
        let fields = [
            (layout::ID, id),
            (layout::GOODS_NAME, name),
            (layout::GOODS_MOD, mod_name),
            (layout::GOODS_INTERNAL_NAME, id),
            (layout::GOODS_TOOLTIP, tooltip),
            (layout::GOODS_UNLOCALIZED_NAME, name),
        ];
        for (field, text) in fields {
            let string = self.string(text);
            self.set(pointer, field, string);
        }
        pointer
    }

    /// Adds an item with every text field given.
    pub fn add_item(&mut self, id: &str, name: &str, mod_name: &str, tooltip: &str) -> u32 {
        let pointer = self.goods(layout::ITEM_WORDS, id, name, mod_name, tooltip);
        self.set(pointer, layout::ITEM_STACK_SIZE, 64);
        self.tables[TABLE_ITEMS].push(pointer);
        pointer
    }

    /// Adds a gregtech item with no tooltip.
    pub fn item(&mut self, id: &str, name: &str) -> u32 {
        self.add_item(id, name, "gregtech", "")
    }

    pub fn add_fluid(&mut self, id: &str, name: &str, mod_name: &str, gas: bool) -> u32 {
        let pointer = self.goods(layout::FLUID_WORDS, id, name, mod_name, "");
        self.set(pointer, layout::FLUID_IS_GAS, u32::from(gas));
        self.set(pointer, layout::FLUID_TEMPERATURE, 295);
        self.tables[TABLE_FLUIDS].push(pointer);
        pointer
    }

    pub fn fluid(&mut self, id: &str, name: &str) -> u32 {
        self.add_fluid(id, name, "gregtech", false)
    }

    /// Marks `item` as a filled container holding `amount` of `fluid`.
    pub fn set_container(&mut self, item: u32, fluid: u32, amount: u32, empty: u32) -> u32 {
        let pointer = self.alloc(layout::CONTAINER_WORDS);
        self.set(pointer, layout::CONTAINER_FLUID, fluid);
        self.set(pointer, layout::CONTAINER_AMOUNT, amount);
        self.set(pointer, layout::CONTAINER_EMPTY, empty);
        self.set(item, layout::ITEM_CONTAINER, pointer);
        pointer
    }

    /// Adds an ore-dict whose signature covers all of its items.
    pub fn ore_dict(&mut self, id: &str, name: &str, items: &[u32]) -> u32 {
        let pointer = self.alloc(layout::ORE_DICT_WORDS);
        let signature = items
            .iter()
            .fold(Signature::default(), |acc, item| acc.union(&self.signature_of(*item)));
        self.write_signature(pointer, signature);
        let id = self.string(id);
        let name = self.string(name);
        let items = self.slice(items);
        self.set(pointer, layout::ID, id);
        self.set(pointer, layout::ORE_DICT_NAME, name);
        self.set(pointer, layout::ORE_DICT_ITEMS, items);
        self.tables[TABLE_ORE_DICTS].push(pointer);
        pointer
    }

    /// Adds a recipe type. `single_blocks` is indexed by tier, 0 meaning none.
    pub fn recipe_type(
        &mut self,
        name: &str,
        single_blocks: &[u32],
        multi_blocks: &[u32],
        default_crafter: u32,
    ) -> u32 {
        let pointer = self.alloc(layout::RECIPE_TYPE_WORDS);
        let name = self.string(name);
        let category = self.string("gregtech");
        let single = self.slice(single_blocks);
        let multi = self.slice(multi_blocks);
        self.set(pointer, layout::RECIPE_TYPE_NAME, name);
        self.set(pointer, layout::RECIPE_TYPE_CATEGORY, category);
        self.set(pointer, layout::RECIPE_TYPE_SINGLE_BLOCKS, single);
        self.set(pointer, layout::RECIPE_TYPE_MULTI_BLOCKS, multi);
        self.set(pointer, layout::RECIPE_TYPE_DEFAULT_CRAFTER, default_crafter);
        self.tables[TABLE_RECIPE_TYPES].push(pointer);
        pointer
    }

    /// Adds a recipe; its signature is the union of its goods' signatures.
    pub fn recipe(&mut self, id: &str, recipe_type: u32, io: &[IoSpec], gt: Option<GtSpec>) -> u32 {
        let pointer = self.alloc(layout::RECIPE_WORDS);
        let signature = io
            .iter()
            .fold(Signature::default(), |acc, slot| acc.union(&self.signature_of(slot.goods)));
        self.write_signature(pointer, signature);

        let mut flat = Vec::with_capacity(io.len() * layout::IO_RECORD_WORDS);
        for (slot, entry) in io.iter().enumerate() {
            flat.extend_from_slice(&[
                entry.io_type.index(),
                entry.goods,
                slot as u32,
                entry.amount,
                entry.probability.to_bits(),
            ]);
        }
        let id = self.string(id);
        let flat = self.slice(&flat);
        let gt = match gt {
            Some(gt) => self.gt_recipe(&gt),
            None => 0,
        };
        self.set(pointer, layout::ID, id);
        self.set(pointer, layout::RECIPE_TYPE, recipe_type);
        self.set(pointer, layout::RECIPE_IO, flat);
        self.set(pointer, layout::RECIPE_GT, gt);
        self.tables[TABLE_RECIPES].push(pointer);
        pointer
    }

    fn gt_recipe(&mut self, gt: &GtSpec) -> u32 {
        let pointer = self.alloc(layout::GT_WORDS);
        let mut flags = 0;
        if gt.clean_room {
            flags |= layout::GT_FLAG_CLEAN_ROOM;
        }
        if gt.low_gravity {
            flags |= layout::GT_FLAG_LOW_GRAVITY;
        }
        let info = self.string(&gt.info);
        self.set(pointer, layout::GT_VOLTAGE, gt.voltage);
        self.set(pointer, layout::GT_AMPERAGE, gt.amperage);
        self.set(pointer, layout::GT_DURATION, gt.duration_ticks);
        self.set(pointer, layout::GT_VOLTAGE_TIER, gt.voltage_tier);
        self.set(pointer, layout::GT_FLAGS, flags);
        self.set(pointer, layout::GT_INFO, info);
        pointer
    }

    /// Adds a pseudo-good to the service table.
    pub fn service(&mut self, id: &str, name: &str) -> u32 {
        let pointer = self.goods(layout::ITEM_WORDS, id, name, "service", "");
        self.tables[TABLE_SERVICES].push(pointer);
        pointer
    }

    /// Writes the table slices and header and returns the image bytes.
    pub fn build(mut self) -> Vec<u8> {
        let tables = std::mem::take(&mut self.tables);
        let mut header = [0u32; 6];
        for (i, table) in tables.iter().enumerate() {
            header[i] = self.slice(table);
        }
        self.words[0] = self.version;
        self.words[1..HEADER_WORDS].copy_from_slice(&header);
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// Builds the image and loads it.
    ///
    /// # Panics
    ///
    /// Panics if the repository rejects the image.
    pub fn build_repository(self) -> Repository {
        Repository::new(self.build()).expect("builder produced an invalid image")
    }
}

/// A small GregTech-flavored catalog shared by the integration tests.
///
/// Contents:
/// - `r:plate`: 1 iron ingot into 1 iron plate, 30 EU/t for 100 ticks (LV)
/// - `r:ingot`: 1 iron ore into 1 iron ingot, instant
/// - `r:wire`: 1 ingot from the `o:ingotIron` ore-dict into 2 wires, 30 EU/t, 200 ticks
/// - `r:steam`: 1 water cell into 2 steam cells, 16 EU/t, 20 ticks
/// - `r:lcr`: 2 iron plates into 1 gear in the Large Chemical Reactor, 30 EU/t, 400 ticks
pub fn sample_catalog() -> ImageBuilder {
    let mut b = ImageBuilder::new();
    let ore = b.item("i:ore", "Iron Ore");
    let ingot = b.add_item("i:ingot", "Iron Ingot", "gregtech", "A refined metal");
    let wrought = b.item("i:wrought", "Wrought Iron Ingot");
    let plate = b.item("i:plate", "Iron Plate");
    let wire = b.item("i:wire", "Iron Wire");
    let gear = b.item("i:gear", "Iron Gear");
    let cell = b.item("i:cell", "Empty Cell");
    let water_cell = b.item("i:water_cell", "Water Cell");
    let steam_cell = b.item("i:steam_cell", "Steam Cell");
    let water = b.fluid("f:water", "Water");
    let steam = b.add_fluid("f:steam", "Steam", "minecraft", true);
    b.set_container(water_cell, water, 1000, cell);
    b.set_container(steam_cell, steam, 1000, cell);
    let ingots = b.ore_dict("o:ingotIron", "ingotIron", &[wrought, ingot]);

    let bender = b.item("i:bender", "Bending Machine");
    let bender_hv = b.item("i:bender_hv", "Advanced Bending Machine");
    let lcr = b.item("i:lcr", "Large Chemical Reactor");
    let bending = b.recipe_type("Bender", &[0, bender, 0, bender_hv], &[], bender);
    let crafting = b.recipe_type("Crafting", &[], &[], 0);
    let chemistry = b.recipe_type("Chemical Reactor", &[], &[lcr], lcr);

    b.recipe(
        "r:plate",
        bending,
        &[IoSpec::item_in(ingot, 1), IoSpec::item_out(plate, 1)],
        Some(GtSpec::new(30, 100, 1)),
    );
    b.recipe(
        "r:ingot",
        crafting,
        &[IoSpec::item_in(ore, 1), IoSpec::item_out(ingot, 1)],
        None,
    );
    b.recipe(
        "r:wire",
        bending,
        &[IoSpec::ore_dict_in(ingots, 1), IoSpec::item_out(wire, 2)],
        Some(GtSpec::new(30, 200, 1)),
    );
    b.recipe(
        "r:steam",
        bending,
        &[IoSpec::item_in(water_cell, 1), IoSpec::item_out(steam_cell, 2)],
        Some(GtSpec::new(16, 20, 0)),
    );
    b.recipe(
        "r:lcr",
        chemistry,
        &[IoSpec::item_in(plate, 2), IoSpec::item_out(gear, 1)],
        Some(GtSpec::new(30, 400, 1)),
    );
    b.service("i:power", "Electricity");
    b
}
