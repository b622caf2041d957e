//! Script-aware tokenizer shared by indexing and querying.
//!
//! CJK text has no word delimiters, so every run of CJK characters is emitted
//! as overlapping 2-grams and 3-grams plus each single character. Latin words
//! are lower-cased and digit runs become standalone numeric tokens. Everything
//! else separates tokens. Tokens are never de-duplicated here: repeats carry
//! the term frequency BM25 needs.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CharClass {
    Cjk,
    Word,
    Digit,
    Separator,
}

/// Whether `c` belongs to a script tokenized by character n-grams.
#[must_use]
pub fn is_cjk(c: char) -> bool {
    matches!(
        c,
        '\u{3040}'..='\u{30FF}'     // hiragana, katakana
            | '\u{3400}'..='\u{4DBF}'
            | '\u{4E00}'..='\u{9FFF}'
            | '\u{AC00}'..='\u{D7AF}' // hangul syllables
            | '\u{F900}'..='\u{FAFF}'
            | '\u{20000}'..='\u{2A6DF}'
    )
}

fn classify(c: char) -> CharClass {
    if is_cjk(c) {
        CharClass::Cjk
    } else if c.is_alphabetic() {
        CharClass::Word
    } else if c.is_numeric() {
        CharClass::Digit
    } else {
        CharClass::Separator
    }
}

fn flush(class: CharClass, run: &[char], out: &mut Vec<String>) {
    if run.is_empty() {
        return;
    }
    match class {
        CharClass::Cjk => {
            for i in 0..run.len() {
                out.push(run[i].to_string());
                if i + 1 < run.len() {
                    out.push(run[i..i + 2].iter().collect());
                }
                if i + 2 < run.len() {
                    out.push(run[i..i + 3].iter().collect());
                }
            }
        }
        CharClass::Word => out.push(run.iter().collect::<String>().to_lowercase()),
        CharClass::Digit => out.push(run.iter().collect()),
        CharClass::Separator => {}
    }
}

/// Split `text` into index terms.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut run: Vec<char> = Vec::new();
    let mut class = CharClass::Separator;

    for c in text.chars() {
        let next = classify(c);
        if next != class {
            flush(class, &run, &mut tokens);
            run.clear();
            class = next;
        }
        if next != CharClass::Separator {
            run.push(c);
        }
    }
    flush(class, &run, &mut tokens);
    tokens
}
