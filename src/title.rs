//! Raw listing titles → searchable movie titles.

use std::sync::LazyLock;

use regex::Regex;

/// Applied in order; each pattern is replaced everywhere it occurs.
static CLEANING_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // bundle and programme prefixes
        (r"Dining\sSet\*", ""),
        (r"Fans`\sSc\*", ""),
        (r"Kids\sFlix –", ""),
        (r"(?i)the\smovie", ""),
        // punctuation
        (r"`", "'"),
        (r"\[", "("),
        (r"\]", ")"),
        (r"\s*:", ":"),
        // formats and classification codes
        (r"\s+3D", ""),
        (r"(?i)\bPG\d*\b", ""),
        (r"(?i)\bNC\d+\b", ""),
        (r"(?i)\bM\d+\b", ""),
        (r"\*Atmos", ""),
        (r"Marathon", ""),
        (r"TBA", ""),
        // annotations and footnote markers
        (r"\([^)]*\)", ""),
        (r"\*", ""),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("cleaning pattern"), replacement))
    .collect()
});

/// Classification codes, rerun after the rules above (`M*18` → `M18`).
static RATING_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:PG\d*|NC\d+|M\d+)\b").expect("rating pattern"));

/// Tokens with an inner period or apostrophe (initials, abbreviations).
static RECLEANING_RULES: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"\s*\w*\.\w*\s+").expect("period pattern"),
        Regex::new(r"\s*\w*'\w*\s+").expect("apostrophe pattern"),
    ]
});

/// Listings whose raw text always means one specific film.
const KNOWN_RETITLES: &[(&str, &str)] = &[("Mums & Babies – Trolls", "Trolls")];

/// Words left lowercase inside a title.
const SMALL_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "en", "for", "if", "in", "nor", "of", "on", "or",
    "per", "the", "to", "v", "vs", "via",
];

/// First-pass cleaning of a raw listing title.
///
/// Strips promotional prefixes, format suffixes, classification codes,
/// parenthesized annotations and footnote asterisks, then title-cases.
pub fn clean_title(raw: &str) -> String {
    if let Some((_, title)) = KNOWN_RETITLES.iter().find(|(needle, _)| raw.contains(needle)) {
        return title.to_string();
    }
    let mut cleaned = raw.to_string();
    for (pattern, replacement) in CLEANING_RULES.iter() {
        cleaned = pattern.replace_all(&cleaned, *replacement).into_owned();
    }
    let cleaned = RATING_CODE.replace_all(&cleaned, "");
    title_case(&collapse_whitespace(&cleaned))
}

/// Second pass, tried when the first-pass title finds nothing.
pub fn reclean_title(cleaned: &str) -> String {
    let mut title = cleaned.to_string();
    for pattern in RECLEANING_RULES.iter() {
        title = pattern.replace_all(&title, " ").into_owned();
    }
    collapse_whitespace(&title)
}

pub fn title_case(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let last = words.len().saturating_sub(1);
    let mut out = Vec::with_capacity(words.len());
    let mut after_colon = false;
    for (i, word) in words.iter().enumerate() {
        let lower = word.to_lowercase();
        let keep_small = i != 0 && i != last && !after_colon && SMALL_WORDS.contains(&lower.as_str());
        out.push(if keep_small {
            lower
        } else {
            lower.split('-').map(capitalize).collect::<Vec<_>>().join("-")
        });
        after_colon = word.ends_with(':');
    }
    out.join(" ")
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clean_strips_bundle_year_and_rating() {
        assert_eq!(clean_title("Dining Set* Finding Dory (2016) PG13"), "Finding Dory");
    }

    #[test]
    fn test_clean_formats_and_brackets() {
        assert_eq!(clean_title("DESPICABLE ME 3 3D [Dolby] *Atmos"), "Despicable Me 3");
        assert_eq!(clean_title("Kids Flix – Sing NC16"), "Sing");
        assert_eq!(clean_title("Fans` Sc* Baby Driver M18"), "Baby Driver");
    }

    #[test]
    fn test_clean_strips_lowercase_and_split_rating_codes() {
        assert_eq!(clean_title("Baby Driver m18"), "Baby Driver");
        assert_eq!(clean_title("Baby Driver (Dolby) M*18"), "Baby Driver");
        assert_eq!(clean_title("Sing pg 3D13"), "Sing");
        assert_eq!(clean_title("Cars M(x)3"), "Cars");
    }

    #[test]
    fn test_clean_normalizes_colon_and_backtick() {
        assert_eq!(clean_title("Spider-man : homecoming"), "Spider-Man: Homecoming");
        assert_eq!(clean_title("Ocean`s Eleven"), "Ocean's Eleven");
    }

    #[test]
    fn test_clean_drops_the_movie_suffix() {
        assert_eq!(clean_title("Captain Underpants The Movie"), "Captain Underpants");
    }

    #[test]
    fn test_known_retitle_wins() {
        assert_eq!(clean_title("Mums & Babies – Trolls (PG)"), "Trolls");
    }

    #[test]
    fn test_title_case_keeps_inner_small_words_lowercase() {
        assert_eq!(title_case("pirates OF THE caribbean"), "Pirates of the Caribbean");
        assert_eq!(title_case("the king of"), "The King Of");
        assert_eq!(title_case("alien: the covenant"), "Alien: The Covenant");
    }

    #[test]
    fn test_reclean_drops_initialled_and_apostrophe_tokens() {
        assert_eq!(reclean_title("Dr. Strange"), "Strange");
        assert_eq!(reclean_title("Ocean's Eight"), "Eight");
        assert_eq!(reclean_title("Wonder Woman"), "Wonder Woman");
    }

    fn rating_token() -> impl Strategy<Value = String> {
        prop_oneof![
            "[Pp][Gg][0-9]{0,2}",
            "[Nn][Cc][0-9]{1,2}",
            "[Mm][0-9]{1,2}",
            r"[Mm]\*[0-9]{1,2}",
            r"[Nn][Cc]\*[0-9]{1,2}",
            r"[Mm]\([a-z]{0,3}\)[0-9]{1,2}",
        ]
    }

    fn title_token() -> impl Strategy<Value = String> {
        prop_oneof![
            3 => "[A-Za-z]{1,10}",
            1 => rating_token(),
            1 => r"\([A-Za-z0-9 ]{0,10}\)",
        ]
    }

    proptest! {
        #[test]
        fn prop_cleaned_title_has_no_codes_or_annotations(
            tokens in prop::collection::vec(title_token(), 0..8),
            pad in " {0,3}",
        ) {
            let raw = format!("{pad}{}{pad}", tokens.join(" "));
            let cleaned = clean_title(&raw);

            let rating = Regex::new(r"(?i)^(PG\d*|NC\d+|M\d+)$").unwrap();
            prop_assert!(cleaned.split_whitespace().all(|t| !rating.is_match(t)), "{cleaned:?}");
            prop_assert!(!Regex::new(r"\([^)]*\)").unwrap().is_match(&cleaned), "{cleaned:?}");
            prop_assert_eq!(cleaned.trim(), cleaned.as_str());
        }
    }
}
