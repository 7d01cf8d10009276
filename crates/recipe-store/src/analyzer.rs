//! Term extraction for the FTS5 keyword index.
//!
//! FTS5's `unicode61` tokenizer keeps a run of Han characters as one token,
//! which makes Chinese recipe text unsearchable by sub-phrase. Text is
//! pre-split here instead: latin words are lowercased, CJK runs become
//! unigrams plus overlapping bigrams. Index and query go through the same
//! function so they always agree.

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}')
}

fn push_cjk_run(run: &[char], terms: &mut Vec<String>) {
    for c in run {
        terms.push(c.to_string());
    }
    for pair in run.windows(2) {
        terms.push(pair.iter().collect());
    }
}

/// Split text into index terms.
fn terms(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut word = String::new();
    let mut run: Vec<char> = Vec::new();

    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                terms.push(std::mem::take(&mut word));
            }
            run.push(c);
        } else {
            if !run.is_empty() {
                push_cjk_run(&run, &mut terms);
                run.clear();
            }
            if c.is_alphanumeric() {
                word.extend(c.to_lowercase());
            } else if !word.is_empty() {
                terms.push(std::mem::take(&mut word));
            }
        }
    }

    if !word.is_empty() {
        terms.push(word);
    }
    if !run.is_empty() {
        push_cjk_run(&run, &mut terms);
    }

    terms
}

/// Space-separated terms stored in the FTS5 column.
pub fn index_terms(text: &str) -> String {
    terms(text).join(" ")
}

/// FTS5 `MATCH` expression: every distinct query term, quoted, OR-ed.
///
/// Returns `None` if the query has no searchable terms.
pub fn match_expression(query: &str) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    let quoted: Vec<String> = terms(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();

    if quoted.is_empty() {
        None
    } else {
        Some(quoted.join(" OR "))
    }
}
