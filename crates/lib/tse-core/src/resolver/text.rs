//! Script folding for Persian/Arabic instrument text.
//!
//! Upstream listings and user queries mix Arabic and Persian code points for
//! the same letters, presentation forms copied from rendered text, locale
//! digits, diacritics, and zero-width joiners. Folding maps all of them to one
//! canonical spelling so matching compares letters, not encodings.

use std::cmp::Ordering;

use crate::normalizer::fold_digit;

/// Arabic presentation forms (FB50..FDFF, FE70..FEFF) that decompose to a
/// single base letter: `(first, last, base)`.
const PRESENTATION_FORMS: &[(char, char, char)] = &[
    ('\u{FB50}', '\u{FB51}', '\u{0671}'),
    ('\u{FB52}', '\u{FB55}', '\u{067B}'),
    ('\u{FB56}', '\u{FB59}', '\u{067E}'),
    ('\u{FB5A}', '\u{FB5D}', '\u{0680}'),
    ('\u{FB5E}', '\u{FB61}', '\u{067A}'),
    ('\u{FB62}', '\u{FB65}', '\u{067F}'),
    ('\u{FB66}', '\u{FB69}', '\u{0679}'),
    ('\u{FB6A}', '\u{FB6D}', '\u{06A4}'),
    ('\u{FB6E}', '\u{FB71}', '\u{06A6}'),
    ('\u{FB72}', '\u{FB75}', '\u{0684}'),
    ('\u{FB76}', '\u{FB79}', '\u{0683}'),
    ('\u{FB7A}', '\u{FB7D}', '\u{0686}'),
    ('\u{FB7E}', '\u{FB81}', '\u{0687}'),
    ('\u{FB82}', '\u{FB83}', '\u{068D}'),
    ('\u{FB84}', '\u{FB85}', '\u{068C}'),
    ('\u{FB86}', '\u{FB87}', '\u{068E}'),
    ('\u{FB88}', '\u{FB89}', '\u{0688}'),
    ('\u{FB8A}', '\u{FB8B}', '\u{0698}'),
    ('\u{FB8C}', '\u{FB8D}', '\u{0691}'),
    ('\u{FB8E}', '\u{FB91}', '\u{06A9}'),
    ('\u{FB92}', '\u{FB95}', '\u{06AF}'),
    ('\u{FB96}', '\u{FB99}', '\u{06B3}'),
    ('\u{FB9A}', '\u{FB9D}', '\u{06B1}'),
    ('\u{FB9E}', '\u{FB9F}', '\u{06BA}'),
    ('\u{FBA0}', '\u{FBA3}', '\u{06BB}'),
    ('\u{FBA4}', '\u{FBA5}', '\u{06C0}'),
    ('\u{FBA6}', '\u{FBA9}', '\u{06C1}'),
    ('\u{FBAA}', '\u{FBAD}', '\u{06BE}'),
    ('\u{FBAE}', '\u{FBAF}', '\u{06D2}'),
    ('\u{FBB0}', '\u{FBB1}', '\u{06D3}'),
    ('\u{FBD3}', '\u{FBD6}', '\u{06AD}'),
    ('\u{FBD7}', '\u{FBD8}', '\u{06C7}'),
    ('\u{FBD9}', '\u{FBDA}', '\u{06C6}'),
    ('\u{FBDB}', '\u{FBDC}', '\u{06C8}'),
    ('\u{FBDE}', '\u{FBDF}', '\u{06CB}'),
    ('\u{FBE0}', '\u{FBE1}', '\u{06C5}'),
    ('\u{FBE2}', '\u{FBE3}', '\u{06C9}'),
    ('\u{FBE4}', '\u{FBE7}', '\u{06D0}'),
    ('\u{FBE8}', '\u{FBE9}', '\u{0649}'),
    ('\u{FBFC}', '\u{FBFF}', '\u{06CC}'),
    ('\u{FE80}', '\u{FE80}', '\u{0621}'),
    ('\u{FE81}', '\u{FE82}', '\u{0622}'),
    ('\u{FE83}', '\u{FE84}', '\u{0623}'),
    ('\u{FE85}', '\u{FE86}', '\u{0624}'),
    ('\u{FE87}', '\u{FE88}', '\u{0625}'),
    ('\u{FE89}', '\u{FE8C}', '\u{0626}'),
    ('\u{FE8D}', '\u{FE8E}', '\u{0627}'),
    ('\u{FE8F}', '\u{FE92}', '\u{0628}'),
    ('\u{FE93}', '\u{FE94}', '\u{0629}'),
    ('\u{FE95}', '\u{FE98}', '\u{062A}'),
    ('\u{FE99}', '\u{FE9C}', '\u{062B}'),
    ('\u{FE9D}', '\u{FEA0}', '\u{062C}'),
    ('\u{FEA1}', '\u{FEA4}', '\u{062D}'),
    ('\u{FEA5}', '\u{FEA8}', '\u{062E}'),
    ('\u{FEA9}', '\u{FEAA}', '\u{062F}'),
    ('\u{FEAB}', '\u{FEAC}', '\u{0630}'),
    ('\u{FEAD}', '\u{FEAE}', '\u{0631}'),
    ('\u{FEAF}', '\u{FEB0}', '\u{0632}'),
    ('\u{FEB1}', '\u{FEB4}', '\u{0633}'),
    ('\u{FEB5}', '\u{FEB8}', '\u{0634}'),
    ('\u{FEB9}', '\u{FEBC}', '\u{0635}'),
    ('\u{FEBD}', '\u{FEC0}', '\u{0636}'),
    ('\u{FEC1}', '\u{FEC4}', '\u{0637}'),
    ('\u{FEC5}', '\u{FEC8}', '\u{0638}'),
    ('\u{FEC9}', '\u{FECC}', '\u{0639}'),
    ('\u{FECD}', '\u{FED0}', '\u{063A}'),
    ('\u{FED1}', '\u{FED4}', '\u{0641}'),
    ('\u{FED5}', '\u{FED8}', '\u{0642}'),
    ('\u{FED9}', '\u{FEDC}', '\u{0643}'),
    ('\u{FEDD}', '\u{FEE0}', '\u{0644}'),
    ('\u{FEE1}', '\u{FEE4}', '\u{0645}'),
    ('\u{FEE5}', '\u{FEE8}', '\u{0646}'),
    ('\u{FEE9}', '\u{FEEC}', '\u{0647}'),
    ('\u{FEED}', '\u{FEEE}', '\u{0648}'),
    ('\u{FEEF}', '\u{FEF0}', '\u{0649}'),
    ('\u{FEF1}', '\u{FEF4}', '\u{064A}'),
];

/// Folded text in two shapes: words separated by single spaces, and the same
/// letters with all spaces removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldedText {
    pub spaced: String,
    pub compact: String,
}

impl FoldedText {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let spaced = fold(text);
        let compact = spaced.chars().filter(|ch| *ch != ' ').collect();
        Self { spaced, compact }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compact.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.spaced.split(' ').filter(|token| !token.is_empty())
    }
}

/// Folds `text` to its canonical matching form.
#[must_use]
pub fn fold(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars().flat_map(expand_ligature) {
        let Some(ch) = fold_char(ch) else {
            continue;
        };
        if ch.is_whitespace() {
            pending_space = !folded.is_empty();
            continue;
        }
        if pending_space {
            folded.push(' ');
            pending_space = false;
        }
        folded.extend(ch.to_lowercase());
    }
    folded
}

/// Splits the lam-alef presentation ligatures into lam and the matching alef.
fn expand_ligature(ch: char) -> impl Iterator<Item = char> {
    let alef = match ch {
        '\u{FEF5}' | '\u{FEF6}' => Some('\u{0622}'),
        '\u{FEF7}' | '\u{FEF8}' => Some('\u{0623}'),
        '\u{FEF9}' | '\u{FEFA}' => Some('\u{0625}'),
        '\u{FEFB}' | '\u{FEFC}' => Some('\u{0627}'),
        _ => None,
    };
    let first = if alef.is_some() { '\u{0644}' } else { ch };
    std::iter::once(first).chain(alef)
}

/// Canonical form of one code point; `None` drops it.
fn fold_char(ch: char) -> Option<char> {
    let ch = presentation_base(ch).unwrap_or(ch);
    let folded = match ch {
        '\u{064A}' | '\u{0649}' | '\u{0626}' => '\u{06CC}',
        '\u{0643}' => '\u{06A9}',
        '\u{0629}' | '\u{06C0}' | '\u{06D5}' => '\u{0647}',
        '\u{0622}' | '\u{0623}' | '\u{0625}' | '\u{0671}' => '\u{0627}',
        '\u{0624}' => '\u{0648}',
        '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{0640}' | '\u{FE70}'..='\u{FE7F}' => {
            return None;
        }
        '\u{200C}' | '\u{200D}' | '\u{200E}' | '\u{200F}' | '\u{00A0}' => ' ',
        other => fold_digit(other),
    };
    Some(folded)
}

fn presentation_base(ch: char) -> Option<char> {
    if !matches!(ch, '\u{FB50}'..='\u{FDFF}' | '\u{FE70}'..='\u{FEFF}') {
        return None;
    }
    PRESENTATION_FORMS
        .binary_search_by(|(first, last, _)| {
            if *last < ch {
                Ordering::Less
            } else if *first > ch {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
        .ok()
        .map(|index| PRESENTATION_FORMS[index].2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arabic_and_persian_spellings_fold_together() {
        assert_eq!(fold("ايران خودرو"), fold("ایران خودرو"));
        assert_eq!(fold("فولاد مباركه"), fold("فولاد مبارکه"));
        assert_eq!(fold("بانك ملت"), "بانک ملت");
        assert_eq!(fold("أمید"), "امید");
    }

    #[test]
    fn zero_width_joiners_become_spaces() {
        let joined = FoldedText::new("ایران\u{200C}خودرو");
        let spaced = FoldedText::new("ایران  خودرو ");
        assert_eq!(joined, spaced);
        assert_eq!(joined.compact, "ایرانخودرو");
        assert_eq!(joined.tokens().count(), 2);
    }

    #[test]
    fn presentation_forms_fold_to_base_letters() {
        // feh, waw, lam, dal in contextual forms
        assert_eq!(fold("\u{FED3}\u{FEEE}\u{FEDF}\u{FEAA}"), "فولد");
        assert_eq!(fold("\u{FEF1}"), "\u{06CC}");
        assert_eq!(fold("\u{FB8E}"), "\u{06A9}");
    }

    #[test]
    fn lam_alef_ligatures_expand_to_two_letters() {
        // feh, waw, lam-alef, dal as rendered on a web page
        assert_eq!(fold("\u{FED3}\u{FEEE}\u{FEFB}\u{FEA9}"), fold("فولاد"));
        assert_eq!(fold("\u{FEF5}"), "لا");
        assert_eq!(fold("\u{FEF8}\u{FEFA}"), "لالا");
        assert_eq!(
            FoldedText::new("\u{FED3}\u{FEEE}\u{FEFB}\u{FEA9}").compact,
            "فولاد"
        );
    }

    #[test]
    fn harakat_presentation_forms_are_stripped() {
        assert_eq!(fold("م\u{FE77}لت"), "ملت");
        assert_eq!(fold("\u{FE70}بانک\u{FE7E}"), "بانک");
    }

    #[test]
    fn strips_diacritics_tatweel_and_folds_digits() {
        assert_eq!(fold("مـــلت"), "ملت");
        assert_eq!(fold("مُبارَکه"), "مبارکه");
        assert_eq!(fold("SYM۱"), "sym1");
        assert_eq!(fold("  Sym   1 "), "sym 1");
    }

    #[test]
    fn presentation_table_is_sorted() {
        for pair in PRESENTATION_FORMS.windows(2) {
            assert!(pair[0].1 < pair[1].0);
        }
    }
}
