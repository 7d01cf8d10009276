//! Prompt templates.
//!
//! The corpus is Chinese, so the prompts are too.

/// Ask for one of `list`, `detail` or `general`.
pub fn classify(query: &str) -> String {
    format!(
        "根据用户的问题，将其分类为以下三种类型之一：

1. list - 用户想要菜品列表或推荐，只需要菜名
   例如：推荐几个素菜、有什么川菜、给我3个简单的菜
2. detail - 用户想要具体的制作方法或详细信息
   例如：宫保鸡丁怎么做、制作步骤、需要什么食材
3. general - 其他一般性问题
   例如：什么是川菜、制作技巧、营养价值

只返回分类结果：list、detail 或 general

用户问题: {query}

分类结果:"
    )
}

/// Ask for a search-friendly version of a vague query, or the query itself.
pub fn rewrite(query: &str) -> String {
    format!(
        "你是食谱搜索的查询分析助手。判断下面的查询是否需要改写以提高搜索效果。

原始查询: {query}

- 已经包含具体菜名或明确做法的查询，原样返回。
  例如：\"宫保鸡丁怎么做\"、\"红烧肉需要什么食材\"
- 过于宽泛或口语化的查询，改写为简洁的烹饪搜索词，保持原意，优先简单易做的菜。
  例如：\"做菜\" → \"简单易做的家常菜谱\"，\"川菜\" → \"经典川菜菜谱\"

只输出最终查询:"
    )
}

/// General question answered from the retrieved recipes.
pub fn basic_answer(query: &str, context: &str) -> String {
    format!(
        "你是一位专业的烹饪助手。请根据以下食谱信息回答用户的问题。

用户问题: {query}

相关食谱信息:
{context}

请提供详细、实用的回答。如果信息不足，请诚实说明。

回答:"
    )
}

/// Step-by-step cooking instructions from the retrieved recipes.
pub fn step_by_step_answer(query: &str, context: &str) -> String {
    format!(
        "你是一位专业的烹饪导师。请根据食谱信息，为用户提供详细的分步骤指导。

用户问题: {query}

相关食谱信息:
{context}

建议按以下结构组织回答，可根据实际内容调整：

## 菜品介绍
简要介绍菜品特点和难度

## 所需食材
列出主要食材和用量

## 制作步骤
分步骤说明，每步包含具体操作和大概所需时间

## 制作技巧
只在有实用技巧时包含，没有就省略

不要填充无关内容，也不要重复制作步骤中的信息。

回答:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_embed_inputs() {
        assert!(classify("推荐几个素菜").contains("用户问题: 推荐几个素菜"));
        assert!(rewrite("做菜").contains("原始查询: 做菜"));

        let prompt = step_by_step_answer("红烧肉怎么做", "【食谱 1】 红烧肉");
        assert!(prompt.contains("红烧肉怎么做"));
        assert!(prompt.contains("【食谱 1】 红烧肉"));
        assert!(basic_answer("q", "ctx").ends_with("回答:"));
    }
}
