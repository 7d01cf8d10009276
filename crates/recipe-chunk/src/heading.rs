//! Heading-aware markdown chunker.
//!
//! Splits a recipe at every tracked heading (levels 1 to 3 by default).
//! Each fragment starts at its heading and runs up to the next tracked
//! heading, so fragments are disjoint and in document order.

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

use recipe_core::{Chunker, FragmentDraft};

/// Text of the single fragment produced for an empty document.
pub const EMPTY_DOCUMENT_MARKER: &str = "[empty document]";

/// A heading located in the source text.
#[derive(Debug)]
struct Heading {
    level: usize,
    /// Byte offset of the heading's first character.
    start: usize,
    text: String,
}

/// Chunker that follows the title / section / subsection convention.
pub struct HeadingChunker {
    /// Deepest heading level that starts a new fragment.
    max_level: usize,
}

impl HeadingChunker {
    /// Track `#`, `##` and `###`.
    pub fn new() -> Self {
        Self { max_level: 3 }
    }

    /// Track headings up to `max_level` (clamped to 1..=6).
    pub fn with_max_level(max_level: usize) -> Self {
        Self {
            max_level: max_level.clamp(1, 6),
        }
    }

    /// Locate tracked headings with a markdown parser, so `#` lines inside
    /// fenced code are left alone.
    fn headings(&self, content: &str) -> Vec<Heading> {
        let mut found = Vec::new();
        let mut open: Option<Heading> = None;

        for (event, range) in Parser::new(content).into_offset_iter() {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    let level = level as usize;
                    if level <= self.max_level {
                        open = Some(Heading {
                            level,
                            start: range.start,
                            text: String::new(),
                        });
                    }
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some(heading) = open.as_mut() {
                        heading.text.push_str(&text);
                    }
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(mut heading) = open.take() {
                        heading.text = heading.text.trim().to_string();
                        found.push(heading);
                    }
                }
                _ => {}
            }
        }

        found
    }

    fn sentinel() -> FragmentDraft {
        FragmentDraft {
            header_path: Vec::new(),
            content: EMPTY_DOCUMENT_MARKER.to_string(),
        }
    }
}

impl Default for HeadingChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for HeadingChunker {
    fn chunk(&self, content: &str) -> Vec<FragmentDraft> {
        if content.trim().is_empty() {
            return vec![Self::sentinel()];
        }

        let headings = self.headings(content);
        let mut drafts = Vec::with_capacity(headings.len() + 1);

        // Text before the first heading
        let first = headings.first().map_or(content.len(), |h| h.start);
        let preamble = content[..first].trim();
        if !preamble.is_empty() {
            drafts.push(FragmentDraft {
                header_path: Vec::new(),
                content: preamble.to_string(),
            });
        }

        let mut path: Vec<(usize, String)> = Vec::new();
        for (i, heading) in headings.iter().enumerate() {
            path.retain(|(level, _)| *level < heading.level);
            path.push((heading.level, heading.text.clone()));

            let end = headings.get(i + 1).map_or(content.len(), |next| next.start);
            drafts.push(FragmentDraft {
                header_path: path.iter().map(|(_, text)| text.clone()).collect(),
                content: content[heading.start..end].trim().to_string(),
            });
        }

        if drafts.is_empty() {
            drafts.push(Self::sentinel());
        }

        drafts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPE: &str = "# 红烧肉\n\n预估烹饪难度：★★★★\n\n## 必备原料和工具\n\n- 五花肉\n- 冰糖\n\n## 操作\n\n### 简易版本\n\n焯水后炖煮。\n\n### 复杂版本\n\n先炒糖色。\n\n## 附加内容\n\n注意火候。\n";

    #[test]
    fn test_splits_on_three_levels() {
        let drafts = HeadingChunker::new().chunk(RECIPE);

        assert_eq!(drafts.len(), 6);
        assert_eq!(drafts[0].header_path, vec!["红烧肉"]);
        assert!(drafts[0].content.starts_with("# 红烧肉"));
        assert!(drafts[0].content.contains("★★★★"));
        assert_eq!(drafts[1].header_path, vec!["红烧肉", "必备原料和工具"]);
        assert_eq!(drafts[3].header_path, vec!["红烧肉", "操作", "简易版本"]);
        assert_eq!(drafts[4].header_path, vec!["红烧肉", "操作", "复杂版本"]);
        assert_eq!(drafts[5].header_path, vec!["红烧肉", "附加内容"]);
    }

    #[test]
    fn test_fragments_keep_their_heading() {
        let drafts = HeadingChunker::new().chunk(RECIPE);
        assert!(drafts[1].content.starts_with("## 必备原料和工具"));
        assert!(drafts[1].content.contains("五花肉"));
        assert!(!drafts[1].content.contains("## 操作"));
    }

    #[test]
    fn test_fragments_preserve_document_order() {
        let drafts = HeadingChunker::new().chunk(RECIPE);
        let mut cursor = 0;
        for draft in &drafts {
            let pos = RECIPE[cursor..].find(&draft.content).map(|p| p + cursor);
            assert!(pos.is_some(), "fragment out of order: {}", draft.content);
            cursor = pos.unwrap();
        }
    }

    #[test]
    fn test_title_only_document_is_single_fragment() {
        let text = "# 拍黄瓜\n\n黄瓜拍碎，加蒜和醋。\n\n#### 小贴士\n\n冷藏更好吃。";
        let drafts = HeadingChunker::new().chunk(text);

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].content, text);
    }

    #[test]
    fn test_no_headings_is_single_fragment() {
        let drafts = HeadingChunker::new().chunk("just some notes\nwithout headings");
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].header_path.is_empty());
        assert_eq!(drafts[0].content, "just some notes\nwithout headings");
    }

    #[test]
    fn test_empty_document_yields_sentinel() {
        for input in ["", "   \n\t\n"] {
            let drafts = HeadingChunker::new().chunk(input);
            assert_eq!(drafts.len(), 1);
            assert_eq!(drafts[0].content, EMPTY_DOCUMENT_MARKER);
        }
    }

    #[test]
    fn test_preamble_before_title() {
        let drafts = HeadingChunker::new().chunk("intro line\n\n# Title\n\nbody");
        assert_eq!(drafts.len(), 2);
        assert!(drafts[0].header_path.is_empty());
        assert_eq!(drafts[0].content, "intro line");
        assert_eq!(drafts[1].header_path, vec!["Title"]);
    }

    #[test]
    fn test_ignores_hashes_in_code_fences() {
        let text = "# Title\n\n```sh\n# not a heading\n```\n\n## Steps\n\nstir";
        let drafts = HeadingChunker::new().chunk(text);
        assert_eq!(drafts.len(), 2);
        assert!(drafts[0].content.contains("# not a heading"));
    }

    #[test]
    fn test_section_resets_subsection_path() {
        let text = "# T\n\n## A\n\n### A1\n\n## B\n\nb";
        let drafts = HeadingChunker::new().chunk(text);
        assert_eq!(drafts.last().unwrap().header_path, vec!["T", "B"]);
    }

    #[test]
    fn test_max_level() {
        let drafts = HeadingChunker::with_max_level(2).chunk(RECIPE);
        // The two ### subsections fold into "操作"
        assert_eq!(drafts.len(), 4);
        assert!(drafts[2].content.contains("### 复杂版本"));
    }
}
