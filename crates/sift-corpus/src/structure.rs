//! Regex structure extraction, used when the summarizer is absent or fails.
//!
//! Patterns are applied kind by kind, so the result is grouped by kind rather
//! than in document order.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{StructureElement, StructureKind, truncate_chars};

const MAX_LINE_CHARS: usize = 120;
const MAX_ELEMENTS: usize = 24;

static FIGURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[ \t]*((?:figure|fig\.)[ \t]*\d+[^\n]*|图[ \t]*\d+[^\n]*)$").unwrap()
});

static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[ \t]*(table[ \t]*\d+[^\n]*|表[ \t]*\d+[^\n]*)$").unwrap()
});

static FORMULA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?mi)^[ \t]*((?:equation|formula|eq\.)[ \t]*\(?\d+\)?[^\n]*|公式[ \t]*\(?\d+\)?[^\n]*)$",
    )
    .unwrap()
});

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(#{1,6}[ \t]+[^\n]+|\d+(?:\.\d+)*\.?[ \t]+[A-Z\p{Han}][^\n]{0,80}|第[一二三四五六七八九十百\d]+[章节部分][^\n]{0,60})$",
    )
    .unwrap()
});

/// Pattern-match headings and captions out of raw group text.
#[must_use]
pub fn extract_structure(text: &str) -> Vec<StructureElement> {
    let patterns: [(StructureKind, &Regex); 4] = [
        (StructureKind::Section, &SECTION_RE),
        (StructureKind::Figure, &FIGURE_RE),
        (StructureKind::Table, &TABLE_RE),
        (StructureKind::Formula, &FORMULA_RE),
    ];

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (kind, re) in patterns {
        for cap in re.captures_iter(text) {
            let Some(m) = cap.get(1) else { continue };
            let line = truncate_chars(m.as_str().trim(), MAX_LINE_CHARS);
            if line.is_empty() || !seen.insert(line.to_owned()) {
                continue;
            }
            out.push(StructureElement {
                kind,
                text: line.to_owned(),
            });
            if out.len() >= MAX_ELEMENTS {
                return out;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(els: &[StructureElement]) -> Vec<(StructureKind, &str)> {
        els.iter().map(|e| (e.kind, e.text.as_str())).collect()
    }

    #[test]
    fn finds_captions_and_headings() {
        let text = "# Overview\nSome prose here.\nFigure 1: Revenue by year\n\
                    Table 2 Quarterly losses\nEquation (3) risk model\n2.1 Methods and data\n";
        let els = extract_structure(text);
        let found = kinds(&els);
        assert!(found.contains(&(StructureKind::Section, "# Overview")));
        assert!(found.contains(&(StructureKind::Section, "2.1 Methods and data")));
        assert!(found.contains(&(StructureKind::Figure, "Figure 1: Revenue by year")));
        assert!(found.contains(&(StructureKind::Table, "Table 2 Quarterly losses")));
        assert!(found.contains(&(StructureKind::Formula, "Equation (3) risk model")));
    }

    #[test]
    fn finds_chinese_markers() {
        let text = "第三章 金融危机\n正文内容。\n图 2 雷曼兄弟股价\n表1 投资风险\n公式(1) 期望收益\n";
        let found = extract_structure(text);
        let found = kinds(&found);
        assert!(found.contains(&(StructureKind::Section, "第三章 金融危机")));
        assert!(found.contains(&(StructureKind::Figure, "图 2 雷曼兄弟股价")));
        assert!(found.contains(&(StructureKind::Table, "表1 投资风险")));
        assert!(found.contains(&(StructureKind::Formula, "公式(1) 期望收益")));
    }

    #[test]
    fn plain_prose_has_no_structure() {
        assert!(extract_structure("Just a sentence.\nAnother one, with 3 numbers.").is_empty());
    }

    #[test]
    fn duplicates_collapse() {
        let els = extract_structure("Figure 1 Map\nFigure 1 Map\n");
        assert_eq!(els.len(), 1);
    }

    #[test]
    fn long_lines_are_truncated() {
        let text = format!("Figure 9 {}", "x".repeat(500));
        let els = extract_structure(&text);
        assert_eq!(els[0].text.chars().count(), MAX_LINE_CHARS);
    }
}
