//! The binary object repository.
//!
//! The image is a flat array of little-endian 32-bit words. Word 0 holds the
//! format version, words 1 to 6 point at the six top-level tables. Every other
//! value is reached through pointers (word indices) and decoded on first use.
//! Decoded strings, slices and objects share one cache keyed by offset: the
//! image layout guarantees that an address has exactly one interpretation, so
//! decoding the same pointer twice hands back the same cached instance.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::RepositoryError;
use crate::schema::{
    self, layout, Fluid, Goods, Item, ObjectCell, OreDict, Recipe, RecipeType, Schema,
    SearchableObject,
};
use crate::search::{SearchQuery, Signature, SIGNATURE_WORDS};

/// Format version this build understands.
pub const FORMAT_VERSION: u32 = 7;

const HEADER_WORDS: usize = 7;

pub const TABLE_ITEMS: usize = 0;
pub const TABLE_FLUIDS: usize = 1;
pub const TABLE_ORE_DICTS: usize = 2;
pub const TABLE_RECIPE_TYPES: usize = 3;
pub const TABLE_RECIPES: usize = 4;
pub const TABLE_SERVICES: usize = 5;

const TABLE_NAMES: [&str; 6] = ["items", "fluids", "oreDicts", "recipeTypes", "recipes", "services"];

/// The four kinds of object reachable by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchableKind {
    Item,
    Fluid,
    OreDict,
    Recipe,
}

/// Leading id character for each searchable kind.
const ID_PREFIXES: [(char, SearchableKind); 4] = [
    ('i', SearchableKind::Item),
    ('f', SearchableKind::Fluid),
    ('r', SearchableKind::Recipe),
    ('o', SearchableKind::OreDict),
];

/// Tables scanned to build the id index.
const INDEXED_TABLES: [(usize, SearchableKind); 4] = [
    (TABLE_ITEMS, SearchableKind::Item),
    (TABLE_FLUIDS, SearchableKind::Fluid),
    (TABLE_ORE_DICTS, SearchableKind::OreDict),
    (TABLE_RECIPES, SearchableKind::Recipe),
];

impl SearchableKind {
    /// Resolves the kind of an id from its leading character.
    pub fn from_id(id: &str) -> Option<SearchableKind> {
        let first = id.chars().next()?;
        ID_PREFIXES
            .iter()
            .find(|(prefix, _)| *prefix == first)
            .map(|(_, kind)| *kind)
    }

    /// The leading id character for this kind.
    pub fn prefix(self) -> char {
        ID_PREFIXES
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(prefix, _)| *prefix)
            .unwrap_or('?')
    }
}

/// A decoded value cell in the shared cache.
#[derive(Clone)]
pub(crate) enum Decoded {
    String(Rc<str>),
    Slice(Rc<[u32]>),
    Object(Rc<ObjectCell>),
}

/// Read-only repository over one loaded image.
pub struct Repository {
    words: Vec<u32>,
    bytes: Vec<u8>,
    tables: [u32; 6],
    cache: RefCell<HashMap<u32, Decoded>>,
    index: HashMap<SearchableKind, HashMap<Rc<str>, u32>>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("words", &self.words.len())
            .field("tables", &self.tables)
            .finish()
    }
}

impl Repository {
    /// Builds a repository from the raw (decompressed) image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::VersionMismatch`] when word 0 is not
    /// [`FORMAT_VERSION`]; no partial repository is built.
    pub fn new(bytes: Vec<u8>) -> Result<Self, RepositoryError> {
        if bytes.len() % 4 != 0 || bytes.len() < HEADER_WORDS * 4 {
            return Err(RepositoryError::Truncated { len: bytes.len() });
        }
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        if words[0] != FORMAT_VERSION {
            return Err(RepositoryError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: words[0],
            });
        }

        let mut tables = [0u32; 6];
        for (i, table) in tables.iter_mut().enumerate() {
            let offset = words[i + 1];
            if offset as usize >= words.len() {
                return Err(RepositoryError::BadTable {
                    table: TABLE_NAMES[i],
                    offset,
                });
            }
            *table = offset;
        }

        let mut repository = Repository {
            words,
            bytes,
            tables,
            cache: RefCell::new(HashMap::new()),
            index: HashMap::new(),
        };
        repository.index = repository.build_index();

        debug!(
            items = repository.table(TABLE_ITEMS).len(),
            fluids = repository.table(TABLE_FLUIDS).len(),
            ore_dicts = repository.table(TABLE_ORE_DICTS).len(),
            recipes = repository.table(TABLE_RECIPES).len(),
            "repository loaded"
        );
        Ok(repository)
    }

    fn build_index(&self) -> HashMap<SearchableKind, HashMap<Rc<str>, u32>> {
        let mut index = HashMap::new();
        for (table, kind) in INDEXED_TABLES {
            let pointers = self.table(table);
            let mut ids = HashMap::with_capacity(pointers.len());
            for &pointer in pointers.iter() {
                let id = self.get_string(self.word(pointer + layout::ID));
                ids.insert(id, pointer);
            }
            index.insert(kind, ids);
        }
        index
    }

    /// Reads a raw word; out-of-range reads yield 0 (the null pointer).
    pub fn word(&self, offset: u32) -> u32 {
        self.words.get(offset as usize).copied().unwrap_or(0)
    }

    /// Format version stored in word 0.
    pub fn version(&self) -> u32 {
        self.words[0]
    }

    /// Reads a word as an `f32` bit pattern.
    pub fn float(&self, offset: u32) -> f32 {
        f32::from_bits(self.word(offset))
    }

    /// Reads the four signature words at an object's base offset.
    pub fn signature(&self, pointer: u32) -> Signature {
        let mut signature = Signature::default();
        for i in 0..SIGNATURE_WORDS {
            signature.0[i] = self.word(pointer + i as u32);
        }
        signature
    }

    fn cached(&self, pointer: u32) -> Option<Decoded> {
        self.cache.borrow().get(&pointer).cloned()
    }

    /// Inserts a freshly decoded value unless another fill got there first,
    /// and returns whichever value ends up cached.
    fn fill(&self, pointer: u32, value: Decoded) -> Decoded {
        self.cache
            .borrow_mut()
            .entry(pointer)
            .or_insert(value)
            .clone()
    }

    /// Decodes the length-prefixed UTF-8 string at `pointer`.
    pub fn get_string(&self, pointer: u32) -> Rc<str> {
        if pointer == 0 {
            return Rc::from("");
        }
        match self.cached(pointer) {
            Some(Decoded::String(s)) => return s,
            Some(_) => {
                warn!(pointer, "string requested at an address decoded as another type");
                return self.decode_string(pointer);
            }
            None => {}
        }
        match self.fill(pointer, Decoded::String(self.decode_string(pointer))) {
            Decoded::String(s) => s,
            _ => self.decode_string(pointer),
        }
    }

    fn decode_string(&self, pointer: u32) -> Rc<str> {
        let len = self.word(pointer) as usize;
        let start = (pointer as usize + 1) * 4;
        let end = start.saturating_add(len).min(self.bytes.len());
        let start = start.min(end);
        Rc::from(String::from_utf8_lossy(&self.bytes[start..end]).as_ref())
    }

    /// Decodes the count-prefixed word slice at `pointer`.
    pub fn get_slice(&self, pointer: u32) -> Rc<[u32]> {
        if pointer == 0 {
            return Rc::from(Vec::new());
        }
        match self.cached(pointer) {
            Some(Decoded::Slice(s)) => return s,
            Some(_) => {
                warn!(pointer, "slice requested at an address decoded as another type");
                return self.decode_slice(pointer);
            }
            None => {}
        }
        match self.fill(pointer, Decoded::Slice(self.decode_slice(pointer))) {
            Decoded::Slice(s) => s,
            _ => self.decode_slice(pointer),
        }
    }

    fn decode_slice(&self, pointer: u32) -> Rc<[u32]> {
        let len = self.word(pointer) as usize;
        let start = (pointer as usize + 1).min(self.words.len());
        let end = start.saturating_add(len).min(self.words.len());
        Rc::from(&self.words[start..end])
    }

    /// Decodes the object of schema `T` at `pointer`.
    ///
    /// Returns `None` for the null pointer, or when the address was already
    /// decoded as a different kind of object.
    pub fn get_object<'r, T: Schema<'r>>(&'r self, pointer: u32) -> Option<T> {
        if pointer == 0 {
            return None;
        }
        let cell = match self.cached(pointer) {
            Some(Decoded::Object(cell)) => cell,
            Some(_) => {
                warn!(pointer, kind = ?T::KIND, "object requested at an address decoded as another type");
                return None;
            }
            None => {
                // Eager decoding may recurse into the cache, so no borrow is held here.
                let fresh = Rc::new(schema::decode_cell(self, T::KIND, pointer));
                match self.fill(pointer, Decoded::Object(fresh)) {
                    Decoded::Object(cell) => cell,
                    _ => return None,
                }
            }
        };
        if cell.kind() != T::KIND {
            warn!(pointer, cached = ?cell.kind(), requested = ?T::KIND, "object kind mismatch");
            return None;
        }
        Some(T::from_cell(self, cell))
    }

    /// Decodes a searchable object of a known kind.
    pub fn get_searchable(&self, kind: SearchableKind, pointer: u32) -> Option<SearchableObject<'_>> {
        match kind {
            SearchableKind::Item => self.get_object::<Item>(pointer).map(SearchableObject::Item),
            SearchableKind::Fluid => self.get_object::<Fluid>(pointer).map(SearchableObject::Fluid),
            SearchableKind::OreDict => self
                .get_object::<OreDict>(pointer)
                .map(SearchableObject::OreDict),
            SearchableKind::Recipe => self.get_object::<Recipe>(pointer).map(SearchableObject::Recipe),
        }
    }

    /// Resolves an id to its offset, dispatching on the leading character.
    pub fn find_pointer(&self, id: &str) -> Option<(SearchableKind, u32)> {
        let kind = SearchableKind::from_id(id)?;
        let pointer = self.index.get(&kind)?.get(id).copied()?;
        Some((kind, pointer))
    }

    /// Looks up any searchable object by id; `None` for unknown ids.
    pub fn get_by_id(&self, id: &str) -> Option<SearchableObject<'_>> {
        let (kind, pointer) = self.find_pointer(id)?;
        self.get_searchable(kind, pointer)
    }

    pub fn get_item(&self, id: &str) -> Option<Item<'_>> {
        match self.get_by_id(id)? {
            SearchableObject::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn get_fluid(&self, id: &str) -> Option<Fluid<'_>> {
        match self.get_by_id(id)? {
            SearchableObject::Fluid(fluid) => Some(fluid),
            _ => None,
        }
    }

    pub fn get_ore_dict(&self, id: &str) -> Option<OreDict<'_>> {
        match self.get_by_id(id)? {
            SearchableObject::OreDict(ore_dict) => Some(ore_dict),
            _ => None,
        }
    }

    pub fn get_recipe(&self, id: &str) -> Option<Recipe<'_>> {
        match self.get_by_id(id)? {
            SearchableObject::Recipe(recipe) => Some(recipe),
            _ => None,
        }
    }

    /// Looks up an item or fluid by id.
    pub fn get_goods(&self, id: &str) -> Option<Goods<'_>> {
        match self.get_by_id(id)? {
            SearchableObject::Item(item) => Some(Goods::Item(item)),
            SearchableObject::Fluid(fluid) => Some(Goods::Fluid(fluid)),
            _ => None,
        }
    }

    /// The element pointers of a top-level table.
    pub fn table(&self, table: usize) -> Rc<[u32]> {
        match self.tables.get(table) {
            Some(&pointer) => self.get_slice(pointer),
            None => Rc::from(Vec::new()),
        }
    }

    pub fn items(&self) -> impl Iterator<Item = Item<'_>> + '_ {
        self.objects(TABLE_ITEMS)
    }

    pub fn fluids(&self) -> impl Iterator<Item = Fluid<'_>> + '_ {
        self.objects(TABLE_FLUIDS)
    }

    pub fn ore_dicts(&self) -> impl Iterator<Item = OreDict<'_>> + '_ {
        self.objects(TABLE_ORE_DICTS)
    }

    pub fn recipe_types(&self) -> impl Iterator<Item = RecipeType<'_>> + '_ {
        self.objects(TABLE_RECIPE_TYPES)
    }

    pub fn recipes(&self) -> impl Iterator<Item = Recipe<'_>> + '_ {
        self.objects(TABLE_RECIPES)
    }

    /// Pseudo-goods stored in the service table.
    pub fn service_objects(&self) -> impl Iterator<Item = Item<'_>> + '_ {
        self.objects(TABLE_SERVICES)
    }

    fn objects<'r, T: Schema<'r> + 'r>(&'r self, table: usize) -> impl Iterator<Item = T> + 'r {
        let pointers = self.table(table);
        (0..pointers.len()).filter_map(move |i| self.get_object::<T>(pointers[i]))
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Tests that every bit of the query is set in the object's signature.
    pub fn object_match_query_bits(&self, query: &SearchQuery, pointer: u32) -> bool {
        self.signature(pointer).contains(&query.bits)
    }

    /// Bit pre-filter followed by type-specific text confirmation.
    pub fn is_object_matching_search(&self, query: &SearchQuery, object: &SearchableObject<'_>) -> bool {
        if !self.object_match_query_bits(query, object.pointer()) {
            return false;
        }
        if query.is_covered_by_bits() {
            return true;
        }
        object.matches_text(query)
    }

    /// Decodes the object only when it passes the search.
    pub fn get_object_if_matching_search(
        &self,
        query: &SearchQuery,
        kind: SearchableKind,
        pointer: u32,
    ) -> Option<SearchableObject<'_>> {
        if !self.object_match_query_bits(query, pointer) {
            return None;
        }
        let object = self.get_searchable(kind, pointer)?;
        if query.is_covered_by_bits() || object.matches_text(query) {
            Some(object)
        } else {
            None
        }
    }

    /// Searches items then fluids, in table order.
    pub fn search_catalog(&self, query: &SearchQuery, limit: usize) -> Vec<Goods<'_>> {
        let mut found = Vec::new();
        for (table, kind) in [(TABLE_ITEMS, SearchableKind::Item), (TABLE_FLUIDS, SearchableKind::Fluid)] {
            for &pointer in self.table(table).iter() {
                if found.len() >= limit {
                    return found;
                }
                match self.get_object_if_matching_search(query, kind, pointer) {
                    Some(SearchableObject::Item(item)) => found.push(Goods::Item(item)),
                    Some(SearchableObject::Fluid(fluid)) => found.push(Goods::Fluid(fluid)),
                    _ => {}
                }
            }
        }
        found
    }

    /// Searches the recipe table.
    pub fn search_recipes(&self, query: &SearchQuery, limit: usize) -> Vec<Recipe<'_>> {
        self.table(TABLE_RECIPES)
            .iter()
            .filter_map(|&pointer| {
                match self.get_object_if_matching_search(query, SearchableKind::Recipe, pointer)? {
                    SearchableObject::Recipe(recipe) => Some(recipe),
                    _ => None,
                }
            })
            .take(limit)
            .collect()
    }

    /// Recipes with an output slot producing `goods_id`.
    pub fn recipes_producing(&self, goods_id: &str) -> Vec<Recipe<'_>> {
        self.recipes()
            .filter(|recipe| {
                recipe
                    .items()
                    .iter()
                    .any(|io| !io.io_type.is_input() && io.goods.id().as_ref() == goods_id)
            })
            .collect()
    }

    /// Recipes with an input slot accepting `goods_id`, including ore-dict slots.
    pub fn recipes_consuming(&self, goods_id: &str) -> Vec<Recipe<'_>> {
        self.recipes()
            .filter(|recipe| {
                recipe.items().iter().any(|io| {
                    io.io_type.is_input()
                        && match &io.goods {
                            SearchableObject::OreDict(ore_dict) => ore_dict
                                .items()
                                .iter()
                                .any(|item| item.id().as_ref() == goods_id),
                            other => other.id().as_ref() == goods_id,
                        }
                })
            })
            .collect()
    }
}
