//! Answer composition: prompt context and intent-specific answers.

use std::sync::Arc;

use tracing::debug;

use recipe_core::{attr, Category, Difficulty, Generator, Intent, Recipe, Result};

use crate::prompts;

/// Context used when retrieval found nothing.
pub const NO_RECIPES_CONTEXT: &str = "暂无相关食谱信息。";

/// List answer when retrieval found nothing.
pub const NO_RECIPES_ANSWER: &str = "抱歉，没有找到相关的菜品信息。";

/// Default character budget for the prompt context.
pub const DEFAULT_CONTEXT_MAX_CHARS: usize = 2000;

const SEPARATOR: &str = "==================================================";

/// Format recipes as prompt context, best first.
///
/// Each recipe gets a `【食谱 i】 name | 分类 | 难度` header. Recipes are
/// added until the next one would exceed `max_chars`; the first recipe is
/// cut to fit rather than dropped.
pub fn build_context(recipes: &[Arc<Recipe>], max_chars: usize) -> String {
    if recipes.is_empty() {
        return NO_RECIPES_CONTEXT.to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut used = 0usize;

    for (i, recipe) in recipes.iter().enumerate() {
        let text = format!("{}\n{}\n", header(i + 1, recipe), recipe.content);
        let len = text.chars().count();

        if used + len > max_chars {
            if parts.is_empty() {
                parts.push(text.chars().take(max_chars).collect());
            }
            break;
        }

        used += len;
        parts.push(text);
    }

    debug!("Context holds {} of {} recipes", parts.len(), recipes.len());
    parts.join(&format!("\n{}\n", SEPARATOR))
}

fn header(position: usize, recipe: &Recipe) -> String {
    let mut header = format!("【食谱 {}】 {}", position, recipe.name);
    if let Some(category) = recipe.attribute_str(attr::CATEGORY) {
        header.push_str(&format!(" | 分类: {}", category_label(category)));
    }
    if let Some(difficulty) = recipe.attribute_str(attr::DIFFICULTY) {
        header.push_str(&format!(" | 难度: {}", difficulty_label(difficulty)));
    }
    header
}

fn category_label(value: &str) -> &str {
    Category::ALL
        .iter()
        .chain(std::iter::once(&Category::Other))
        .find(|c| c.as_str() == value)
        .map_or(value, |c| c.label_zh())
}

fn difficulty_label(value: &str) -> &str {
    Difficulty::ALL
        .iter()
        .chain(std::iter::once(&Difficulty::Unknown))
        .find(|d| d.as_str() == value)
        .map_or(value, |d| d.label_zh())
}

/// Recommend dishes by name: one, up to three enumerated, or the first
/// three plus a count of the rest.
pub fn list_answer(recipes: &[Arc<Recipe>]) -> String {
    let mut names: Vec<&str> = Vec::new();
    for recipe in recipes {
        if !names.contains(&recipe.name.as_str()) {
            names.push(&recipe.name);
        }
    }

    match names.len() {
        0 => NO_RECIPES_ANSWER.to_string(),
        1 => format!("为您推荐：{}", names[0]),
        2 | 3 => format!("为您推荐以下菜品：\n{}", enumerate(&names[..])),
        n => format!(
            "为您推荐以下菜品：\n{}\n\n还有其他 {} 道菜品可供选择。",
            enumerate(&names[..3]),
            n - 3
        ),
    }
}

fn enumerate(names: &[&str]) -> String {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}. {}", i + 1, name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turns retrieved recipes into an answer for the routed intent.
pub struct AnswerComposer {
    generator: Arc<dyn Generator>,
    context_max_chars: usize,
}

impl AnswerComposer {
    pub fn new(generator: Arc<dyn Generator>, context_max_chars: usize) -> Self {
        Self {
            generator,
            context_max_chars,
        }
    }

    /// List answers are built locally; detail and general answers go
    /// through the generator.
    pub async fn answer(&self, query: &str, intent: Intent, recipes: &[Arc<Recipe>]) -> Result<String> {
        match self.prompt(query, intent, recipes) {
            Some(prompt) => self.generator.complete(&prompt).await,
            None => Ok(list_answer(recipes)),
        }
    }

    /// Like [`answer`](Self::answer), handing text to `on_text` as the
    /// generator produces it. A list answer arrives in one piece.
    pub async fn answer_streaming(
        &self,
        query: &str,
        intent: Intent,
        recipes: &[Arc<Recipe>],
        on_text: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String> {
        match self.prompt(query, intent, recipes) {
            Some(prompt) => self.generator.complete_streaming(&prompt, on_text).await,
            None => {
                let answer = list_answer(recipes);
                on_text(&answer);
                Ok(answer)
            }
        }
    }

    /// Generator prompt for the intent; `None` for list answers.
    fn prompt(&self, query: &str, intent: Intent, recipes: &[Arc<Recipe>]) -> Option<String> {
        match intent {
            Intent::List => None,
            Intent::Detail => Some(prompts::step_by_step_answer(
                query,
                &build_context(recipes, self.context_max_chars),
            )),
            Intent::General => Some(prompts::basic_answer(
                query,
                &build_context(recipes, self.context_max_chars),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn recipe(name: &str, category: &str, difficulty: &str, content: &str) -> Arc<Recipe> {
        let mut recipe = Recipe::new(&format!("{}.md", name), name, content);
        recipe.attributes.insert(attr::CATEGORY.to_string(), category.into());
        recipe.attributes.insert(attr::DIFFICULTY.to_string(), difficulty.into());
        Arc::new(recipe)
    }

    #[test]
    fn test_context_headers() {
        let context = build_context(
            &[recipe("红烧肉", "meat", "hard", "# 红烧肉\n五花肉")],
            2000,
        );
        assert!(context.starts_with("【食谱 1】 红烧肉 | 分类: 荤菜 | 难度: 困难\n# 红烧肉"));
    }

    #[test]
    fn test_context_budget() {
        let long = "步".repeat(60);
        let recipes = vec![
            recipe("A", "meat", "easy", &long),
            recipe("B", "meat", "easy", &long),
        ];
        let context = build_context(&recipes, 100);
        assert!(context.contains("【食谱 1】 A"));
        assert!(!context.contains("【食谱 2】"));

        // A first recipe over budget is cut, not dropped
        let cut = build_context(&recipes, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.starts_with("【食谱 1】"));
    }

    #[test]
    fn test_context_without_recipes() {
        assert_eq!(build_context(&[], 2000), NO_RECIPES_CONTEXT);
    }

    #[test]
    fn test_list_answer_shapes() {
        let r = |n: &str| recipe(n, "vegetable", "easy", "");

        assert_eq!(list_answer(&[]), NO_RECIPES_ANSWER);
        assert_eq!(list_answer(&[r("拍黄瓜")]), "为您推荐：拍黄瓜");
        assert_eq!(
            list_answer(&[r("拍黄瓜"), r("清炒菠菜")]),
            "为您推荐以下菜品：\n1. 拍黄瓜\n2. 清炒菠菜"
        );
        assert_eq!(
            list_answer(&[r("a"), r("b"), r("c"), r("d"), r("e")]),
            "为您推荐以下菜品：\n1. a\n2. b\n3. c\n\n还有其他 2 道菜品可供选择。"
        );
    }

    struct Recorder {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for Recorder {
        async fn classify(&self, _query: &str) -> Result<String> {
            Ok("general".to_string())
        }

        async fn rewrite(&self, query: &str) -> Result<String> {
            Ok(query.to_string())
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("answer".to_string())
        }
    }

    #[tokio::test]
    async fn test_composer_dispatches_on_intent() {
        let recorder = Arc::new(Recorder {
            prompts: Mutex::new(Vec::new()),
        });
        let composer = AnswerComposer::new(recorder.clone(), DEFAULT_CONTEXT_MAX_CHARS);
        let recipes = vec![recipe("红烧肉", "meat", "hard", "五花肉")];

        let list = composer.answer("推荐", Intent::List, &recipes).await.unwrap();
        assert_eq!(list, "为您推荐：红烧肉");
        assert!(recorder.prompts.lock().unwrap().is_empty());

        composer.answer("怎么做", Intent::Detail, &recipes).await.unwrap();
        composer.answer("是什么", Intent::General, &recipes).await.unwrap();

        let prompts = recorder.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("分步骤"));
        assert!(prompts[1].contains("烹饪助手"));
    }

    #[tokio::test]
    async fn test_streaming_answer_reaches_sink() {
        let recorder = Arc::new(Recorder {
            prompts: Mutex::new(Vec::new()),
        });
        let composer = AnswerComposer::new(recorder.clone(), DEFAULT_CONTEXT_MAX_CHARS);
        let recipes = vec![recipe("红烧肉", "meat", "hard", "五花肉")];

        let mut seen = String::new();
        let answer = composer
            .answer_streaming("怎么做", Intent::Detail, &recipes, &mut |t: &str| seen.push_str(t))
            .await
            .unwrap();
        assert_eq!(answer, "answer");
        assert_eq!(seen, "answer");

        let mut seen = String::new();
        let list = composer
            .answer_streaming("推荐", Intent::List, &recipes, &mut |t: &str| seen.push_str(t))
            .await
            .unwrap();
        assert_eq!(seen, list);
        assert_eq!(recorder.prompts.lock().unwrap().len(), 1);
    }
}
