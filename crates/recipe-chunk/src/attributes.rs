//! Attribute enrichment for recipes loaded from the corpus tree.

use std::path::Path;

use serde_json::json;

use recipe_core::{attr, Category, Difficulty, Recipe};

/// Fill in category, dish name, difficulty, stars and source.
///
/// Category comes from the first path component naming a known category
/// directory (`meat_dish`, `vegetable_dish`, ...). Difficulty comes from the
/// longest run of `★` in the text.
pub fn enrich_attributes(recipe: &mut Recipe) {
    let path = Path::new(&recipe.source);

    let category = path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .find_map(Category::from_dir_name)
        .unwrap_or(Category::Other);

    let stars = longest_star_run(&recipe.content);
    let difficulty = Difficulty::from_stars(stars);

    let attributes = &mut recipe.attributes;
    attributes.insert(attr::CATEGORY.to_string(), json!(category.as_str()));
    attributes.insert(attr::DIFFICULTY.to_string(), json!(difficulty.as_str()));
    if let Some(stars) = difficulty.stars() {
        attributes.insert(attr::STARS.to_string(), json!(stars));
    }
    attributes.insert(attr::DISH_NAME.to_string(), json!(recipe.name));
    attributes.insert(attr::SOURCE.to_string(), json!(recipe.source));
}

fn longest_star_run(text: &str) -> usize {
    let mut best = 0;
    let mut run = 0;
    for c in text.chars() {
        if c == '★' {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}
