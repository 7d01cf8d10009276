//! Core domain types for the recipe corpus.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Open attribute mapping attached to recipes and inherited by fragments.
///
/// A `BTreeMap` keeps serialization order stable across runs.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Well-known attribute keys.
pub mod attr {
    pub const CATEGORY: &str = "category";
    pub const DIFFICULTY: &str = "difficulty";
    pub const STARS: &str = "stars";
    pub const DISH_NAME: &str = "dish_name";
    pub const SOURCE: &str = "source";
}

/// Stable identifier of a parent recipe.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParentId(String);

impl ParentId {
    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id from a corpus-relative path.
    ///
    /// The path must use `/` separators so ids agree across platforms.
    pub fn from_relative_path(relative_path: &str) -> Self {
        let hash = blake3::hash(relative_path.as_bytes());
        Self(hash.to_hex().as_str()[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier of a fragment, distinct from its parent's id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(String);

impl FragmentId {
    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Corpus-assigned id for the fragment at `index` within `parent`.
    pub fn for_parent(parent: &ParentId, index: u32) -> Self {
        Self(format!("{}-{:03}", parent.as_str(), index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dish category, derived from the corpus directory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Meat,
    Vegetable,
    Soup,
    Dessert,
    Breakfast,
    Staple,
    Aquatic,
    Condiment,
    Drink,
    Other,
}

impl Category {
    /// Every category a recipe can be filed under, except `Other`.
    pub const ALL: [Category; 9] = [
        Self::Meat,
        Self::Vegetable,
        Self::Soup,
        Self::Dessert,
        Self::Breakfast,
        Self::Staple,
        Self::Aquatic,
        Self::Condiment,
        Self::Drink,
    ];

    /// Map a corpus directory name to its category.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name {
            "meat_dish" => Some(Self::Meat),
            "vegetable_dish" => Some(Self::Vegetable),
            "soup" => Some(Self::Soup),
            "dessert" => Some(Self::Dessert),
            "breakfast" => Some(Self::Breakfast),
            "staple" => Some(Self::Staple),
            "aquatic" => Some(Self::Aquatic),
            "condiment" => Some(Self::Condiment),
            "drink" => Some(Self::Drink),
            _ => None,
        }
    }

    /// Attribute value stored on recipes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meat => "meat",
            Self::Vegetable => "vegetable",
            Self::Soup => "soup",
            Self::Dessert => "dessert",
            Self::Breakfast => "breakfast",
            Self::Staple => "staple",
            Self::Aquatic => "aquatic",
            Self::Condiment => "condiment",
            Self::Drink => "drink",
            Self::Other => "other",
        }
    }

    /// Label used by the upstream corpus.
    pub fn label_zh(&self) -> &'static str {
        match self {
            Self::Meat => "荤菜",
            Self::Vegetable => "素菜",
            Self::Soup => "汤品",
            Self::Dessert => "甜品",
            Self::Breakfast => "早餐",
            Self::Staple => "主食",
            Self::Aquatic => "水产",
            Self::Condiment => "调料",
            Self::Drink => "饮品",
            Self::Other => "其他",
        }
    }

    /// English words that name this category in a query.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Meat => &["meat", "meats"],
            Self::Vegetable => &["vegetable", "vegetables", "vegetarian", "veggie"],
            Self::Soup => &["soup", "soups"],
            Self::Dessert => &["dessert", "desserts"],
            Self::Breakfast => &["breakfast", "breakfasts"],
            Self::Staple => &["staple", "staples"],
            Self::Aquatic => &["seafood", "fish", "aquatic"],
            Self::Condiment => &["condiment", "condiments"],
            Self::Drink => &["drink", "drinks", "beverage", "beverages"],
            Self::Other => &[],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difficulty rating, derived from the star rating in the recipe text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    VeryEasy,
    Easy,
    Medium,
    Hard,
    VeryHard,
    Unknown,
}

impl Difficulty {
    /// Every rated difficulty, easiest first.
    pub const ALL: [Difficulty; 5] = [
        Self::VeryEasy,
        Self::Easy,
        Self::Medium,
        Self::Hard,
        Self::VeryHard,
    ];

    /// Map a star count (1-5) to a difficulty.
    pub fn from_stars(stars: usize) -> Self {
        match stars {
            0 => Self::Unknown,
            1 => Self::VeryEasy,
            2 => Self::Easy,
            3 => Self::Medium,
            4 => Self::Hard,
            _ => Self::VeryHard,
        }
    }

    pub fn stars(&self) -> Option<u8> {
        match self {
            Self::VeryEasy => Some(1),
            Self::Easy => Some(2),
            Self::Medium => Some(3),
            Self::Hard => Some(4),
            Self::VeryHard => Some(5),
            Self::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryEasy => "very_easy",
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::VeryHard => "very_hard",
            Self::Unknown => "unknown",
        }
    }

    pub fn label_zh(&self) -> &'static str {
        match self {
            Self::VeryEasy => "非常简单",
            Self::Easy => "简单",
            Self::Medium => "中等",
            Self::Hard => "困难",
            Self::VeryHard => "非常困难",
            Self::Unknown => "未知",
        }
    }

    /// English phrases that name this difficulty in a query.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::VeryEasy => &["very easy"],
            Self::Easy => &["easy", "simple"],
            Self::Medium => &["medium", "moderate"],
            Self::Hard => &["hard", "difficult"],
            Self::VeryHard => &["very hard", "very difficult"],
            Self::Unknown => &[],
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parent document: one complete recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Stable identifier.
    pub id: ParentId,

    /// Source path, relative to the corpus root.
    pub source: String,

    /// Dish name (file stem).
    pub name: String,

    /// Raw markdown content.
    pub content: String,

    /// Structured attributes (category, difficulty, ...).
    #[serde(default)]
    pub attributes: Attributes,

    /// Fragment ids in document order.
    #[serde(default)]
    pub fragment_ids: Vec<FragmentId>,
}

impl Recipe {
    /// Create a recipe whose id is derived from its relative source path.
    pub fn new(source: &str, name: &str, content: &str) -> Self {
        Self {
            id: ParentId::from_relative_path(source),
            source: source.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            attributes: Attributes::new(),
            fragment_ids: Vec::new(),
        }
    }

    /// Blake3 hash of the raw content, hex encoded.
    pub fn content_hash(&self) -> String {
        blake3::hash(self.content.as_bytes()).to_hex().to_string()
    }

    /// String attribute lookup.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

/// A child fragment: one structural section of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Stable identifier.
    pub id: FragmentId,

    /// Owning recipe (back-reference).
    pub parent_id: ParentId,

    /// Position within the parent (0-based).
    pub index: u32,

    /// Enclosing headings, outermost first.
    pub header_path: Vec<String>,

    /// Fragment text, heading included.
    pub content: String,

    /// Copy of the parent's attributes, for filtering.
    #[serde(default)]
    pub attributes: Attributes,
}

impl Fragment {
    /// Build a fragment of `parent` from a chunker draft.
    pub fn from_draft(parent: &Recipe, index: u32, draft: FragmentDraft) -> Self {
        Self {
            id: FragmentId::for_parent(&parent.id, index),
            parent_id: parent.id.clone(),
            index,
            header_path: draft.header_path,
            content: draft.content,
            attributes: parent.attributes.clone(),
        }
    }

    /// Header path rendered as `title > section > subsection`.
    pub fn header_label(&self) -> String {
        self.header_path.join(" > ")
    }
}

/// Raw fragment data before id assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentDraft {
    /// Enclosing headings, outermost first.
    pub header_path: Vec<String>,

    /// Fragment text.
    pub content: String,
}

/// A search channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Semantic,
    Lexical,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semantic => f.write_str("semantic"),
            Self::Lexical => f.write_str("lexical"),
        }
    }
}

/// One candidate in a channel's ranked list.
///
/// Only `rank` is used for fusion; `score` is channel-local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub fragment_id: FragmentId,

    /// 1-based rank within the channel.
    pub rank: u32,

    pub score: f32,
}

impl RankedCandidate {
    /// Assign 1-based ranks to a best-first list of `(id, score)` pairs.
    pub fn rank_list(hits: impl IntoIterator<Item = (FragmentId, f32)>) -> Vec<Self> {
        hits.into_iter()
            .enumerate()
            .map(|(i, (fragment_id, score))| Self {
                fragment_id,
                rank: i as u32 + 1,
                score,
            })
            .collect()
    }
}

/// Query intent, deciding how the answer is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Wants a short set of dish names.
    List,
    /// Wants step-by-step instructions for one dish.
    Detail,
    /// Anything else.
    General,
}

impl Intent {
    /// Parse a classifier label, tolerating case, whitespace and quoting.
    pub fn parse_label(label: &str) -> Option<Self> {
        let cleaned = label
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        match cleaned.as_str() {
            "list" => Some(Self::List),
            "detail" => Some(Self::Detail),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Detail => "detail",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics about a loaded corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    /// Number of recipes.
    pub parents: usize,

    /// Number of fragments.
    pub fragments: usize,

    /// Recipes per category.
    pub categories: BTreeMap<String, usize>,

    /// Recipes per difficulty.
    pub difficulties: BTreeMap<String, usize>,

    /// Mean fragment length in characters.
    pub avg_fragment_chars: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_id_is_stable() {
        let a = ParentId::from_relative_path("dishes/meat_dish/红烧肉.md");
        let b = ParentId::from_relative_path("dishes/meat_dish/红烧肉.md");
        let c = ParentId::from_relative_path("dishes/meat_dish/糖醋排骨.md");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn test_fragment_id_distinct_from_parent() {
        let parent = ParentId::new("abc");
        let id = FragmentId::for_parent(&parent, 2);
        assert_eq!(id.as_str(), "abc-002");
        assert_ne!(id.as_str(), parent.as_str());
    }

    #[test]
    fn test_fragment_ids_sort_in_document_order() {
        let parent = ParentId::new("p");
        let mut ids: Vec<_> = [10, 2, 1].iter().map(|i| FragmentId::for_parent(&parent, *i)).collect();
        ids.sort();
        assert_eq!(ids[0].as_str(), "p-001");
        assert_eq!(ids[2].as_str(), "p-010");
    }

    #[test]
    fn test_category_from_dir_name() {
        assert_eq!(Category::from_dir_name("vegetable_dish"), Some(Category::Vegetable));
        assert_eq!(Category::from_dir_name("template"), None);
        assert_eq!(Category::Vegetable.as_str(), "vegetable");
    }

    #[test]
    fn test_difficulty_from_stars() {
        assert_eq!(Difficulty::from_stars(0), Difficulty::Unknown);
        assert_eq!(Difficulty::from_stars(3), Difficulty::Medium);
        assert_eq!(Difficulty::from_stars(7), Difficulty::VeryHard);
        assert_eq!(Difficulty::Hard.stars(), Some(4));
    }

    #[test]
    fn test_intent_parse_label() {
        assert_eq!(Intent::parse_label("list"), Some(Intent::List));
        assert_eq!(Intent::parse_label("  'Detail'\n"), Some(Intent::Detail));
        assert_eq!(Intent::parse_label("GENERAL."), Some(Intent::General));
        assert_eq!(Intent::parse_label("recipe"), None);
        assert_eq!(Intent::parse_label(""), None);
    }

    #[test]
    fn test_rank_list_is_one_based() {
        let ranked = RankedCandidate::rank_list(vec![
            (FragmentId::new("a"), 0.9),
            (FragmentId::new("b"), 0.4),
        ]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
        assert_eq!(ranked[1].fragment_id.as_str(), "b");
    }

    #[test]
    fn test_fragment_inherits_parent_attributes() {
        let mut recipe = Recipe::new("soup/番茄蛋汤.md", "番茄蛋汤", "# 番茄蛋汤");
        recipe
            .attributes
            .insert(attr::CATEGORY.to_string(), serde_json::json!("soup"));
        let fragment = Fragment::from_draft(
            &recipe,
            0,
            FragmentDraft {
                header_path: vec!["番茄蛋汤".to_string()],
                content: "# 番茄蛋汤".to_string(),
            },
        );
        assert_eq!(fragment.parent_id, recipe.id);
        assert_eq!(fragment.attributes, recipe.attributes);
        assert_eq!(fragment.header_label(), "番茄蛋汤");
    }
}
