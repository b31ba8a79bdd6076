//! Approximate text search over the catalog.
//!
//! Every searchable object in the image carries a 128-bit signature built from
//! the words of its text. A query is compiled into a bitset with the same
//! hashing; an object can only match when its signature is a superset of the
//! query bits. Bit collisions produce false positives, which are removed by a
//! final substring check against the object's real text, so a word that occurs
//! in the text is never filtered out by the bit test.

/// Number of signature words stored at the start of each searchable object.
pub const SIGNATURE_WORDS: usize = 4;

const UNIGRAM_BITS: u32 = 36;
const NGRAM_BITS: u32 = 128 - UNIGRAM_BITS;

/// A 128-bit n-gram signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Signature(pub [u32; SIGNATURE_WORDS]);

impl Signature {
    /// Sets bit `bit` (0..128).
    pub fn set(&mut self, bit: u32) {
        self.0[(bit / 32) as usize] |= 1 << (bit % 32);
    }

    /// Returns `true` if `bit` is set.
    pub fn get(&self, bit: u32) -> bool {
        self.0[(bit / 32) as usize] & (1 << (bit % 32)) != 0
    }

    /// Returns `true` if every bit of `query` is also set in `self`.
    pub fn contains(&self, query: &Signature) -> bool {
        self.0.iter().zip(query.0.iter()).all(|(s, q)| s & q == *q)
    }

    /// Bitwise union of two signatures.
    pub fn union(mut self, other: &Signature) -> Signature {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a |= *b;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }
}

/// Maps a case-folded character onto the 36-symbol alphabet.
fn symbol(c: char) -> u32 {
    match c {
        'a'..='z' => c as u32 - 'a' as u32,
        '0'..='9' => 26 + (c as u32 - '0' as u32),
        other => other as u32 % UNIGRAM_BITS,
    }
}

fn is_exact_symbol(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

/// Positional polynomial hash of a 2- or 3-symbol run, reduced into the n-gram bits.
fn ngram_bit(run: &[char]) -> u32 {
    let hash = run
        .iter()
        .fold(0u32, |h, c| h.wrapping_mul(37).wrapping_add(symbol(*c) + 1));
    UNIGRAM_BITS + hash % NGRAM_BITS
}

fn add_word(signature: &mut Signature, word: &str) {
    let chars: Vec<char> = word.chars().collect();
    for i in 0..chars.len() {
        if is_exact_symbol(chars[i]) {
            signature.set(symbol(chars[i]));
        }
        if i + 2 <= chars.len() {
            signature.set(ngram_bit(&chars[i..i + 2]));
        }
        if i + 3 <= chars.len() {
            signature.set(ngram_bit(&chars[i..i + 3]));
        }
    }
}

/// Splits text into lowercase alphanumeric words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Builds the object-side signature for a set of texts (name, tooltip...).
pub fn compute_signature(texts: &[&str]) -> Signature {
    let mut signature = Signature::default();
    for text in texts {
        for word in tokenize(text) {
            add_word(&mut signature, &word);
        }
    }
    signature
}

/// A compiled search query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Lowercase words that must all appear in the object's text.
    pub words: Vec<String>,
    /// Lowercase mod-name filter from a `mod:` token.
    pub mod_filter: Option<String>,
    /// Union of the bits of every word.
    pub bits: Signature,
}

impl SearchQuery {
    /// Compiles free text into a query.
    ///
    /// ```
    /// use gtplanner::search::SearchQuery;
    ///
    /// let query = SearchQuery::parse("Iron plate mod:GregTech");
    /// assert_eq!(query.words, vec!["iron", "plate"]);
    /// assert_eq!(query.mod_filter.as_deref(), Some("gregtech"));
    /// ```
    pub fn parse(text: &str) -> SearchQuery {
        let mut query = SearchQuery::default();
        for token in text.split_whitespace() {
            let lower = token.to_lowercase();
            if let Some(filter) = lower.strip_prefix("mod:") {
                if !filter.is_empty() {
                    query.mod_filter = Some(filter.to_string());
                }
                continue;
            }
            for word in tokenize(&lower) {
                add_word(&mut query.bits, &word);
                query.words.push(word);
            }
        }
        query
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty() && self.mod_filter.is_none()
    }

    /// Returns `true` when a passing bit test already proves a text match.
    ///
    /// This holds only for a single one-symbol word. Unigram bits are set for
    /// ASCII letters and digits alone, so such a bit is set exactly when the
    /// character occurs.
    pub fn is_covered_by_bits(&self) -> bool {
        self.mod_filter.is_none()
            && self.words.len() == 1
            && self.words[0].chars().count() == 1
            && self.words[0].chars().all(is_exact_symbol)
    }

    /// Checks every query word against the texts, case-insensitively.
    pub fn matches_text(&self, texts: &[&str]) -> bool {
        let lowered: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
        self.words
            .iter()
            .all(|word| lowered.iter().any(|text| text.contains(word.as_str())))
    }

    /// Checks the `mod:` filter against a mod name.
    pub fn matches_mod(&self, mod_name: &str) -> bool {
        match &self.mod_filter {
            Some(filter) => mod_name.to_lowercase().contains(filter.as_str()),
            None => true,
        }
    }
}
