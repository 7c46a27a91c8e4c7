//! Reply cleanup.
//!
//! Small multilingual models occasionally drift into scripts the user never
//! wrote in (CJK, Hangul, Cyrillic). Those characters are dropped before the
//! reply is stored or shown.

fn is_foreign_script(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'   // CJK ideographs
        | '\u{3040}'..='\u{309F}' // Hiragana
        | '\u{30A0}'..='\u{30FF}' // Katakana
        | '\u{AC00}'..='\u{D7AF}' // Hangul syllables
        | '\u{0400}'..='\u{04FF}') // Cyrillic
}

/// Drop foreign-script characters and tidy the whitespace they leave behind.
///
/// Returns the cleaned text and the number of characters removed.
pub fn strip_foreign_scripts(text: &str) -> (String, usize) {
    let removed = text.chars().filter(|c| is_foreign_script(*c)).count();
    if removed == 0 {
        return (text.trim().to_string(), 0);
    }

    let filtered: String = text.chars().filter(|c| !is_foreign_script(*c)).collect();
    let lines: Vec<String> = filtered
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    // At most one blank line between paragraphs.
    let mut out = String::with_capacity(filtered.len());
    let mut blank_run = 0;
    for line in lines {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&line);
    }

    (out.trim().to_string(), removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_is_unchanged() {
        let (text, removed) = strip_foreign_scripts("  تمام! Start with HTML.\n\nThen CSS. ");
        assert_eq!(text, "تمام! Start with HTML.\n\nThen CSS.");
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_foreign_scripts_are_removed() {
        let (text, removed) = strip_foreign_scripts("ابدأ بـ Python 然而 وبعدين SQL и Git");
        assert_eq!(text, "ابدأ بـ Python وبعدين SQL Git");
        assert_eq!(removed, 3);
    }

    #[test]
    fn test_paragraphs_are_kept() {
        let (text, _) = strip_foreign_scripts("First 시간\n\n\n\nSecond");
        assert_eq!(text, "First\n\nSecond");
    }
}
