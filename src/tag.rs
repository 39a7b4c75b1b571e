//! Normalization of tag text, both for model output and for what users type.

use indexmap::IndexSet;
use itertools::Itertools;

/// Emoticon tags whose underscores are part of the tag.
#[rustfmt::skip]
pub const UNDERSCORE_TAGS: [&str; 19] = [
    ">_<",
    ">_o",
    "0_0",
    "o_o",
    "3_3",
    "6_9",
    "@_@",
    "u_u",
    "x_x",
    "^_^",
    "|_|",
    "=_=",
    "+_+",
    "+_-",
    "._.",
    "<o>_<o>",
    "<|>_<|>",
    "||_||",
    "(o)_(o)",
];

pub fn fix_tag_underscore(tag: &str) -> String {
    if UNDERSCORE_TAGS.contains(&tag) {
        tag.to_string()
    } else {
        tag.replace('_', " ")
    }
}

/// Parses tags typed for a single image.
///
/// Ideographic spaces count as spaces, whitespace runs collapse to one space,
/// repeated commas collapse, and duplicates keep their first position.
pub fn parse_tag_input(text: &str) -> Vec<String> {
    let spaced = text.replace('\u{3000}', " ");
    let collapsed = spaced.split_whitespace().join(" ");

    collapsed
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Parses the tag list given to a bulk add: unique and sorted.
pub fn parse_tag_set(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .sorted()
        .dedup()
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fix_tag_underscore() {
        assert_eq!(fix_tag_underscore("long_hair"), "long hair");
        assert_eq!(fix_tag_underscore("^_^"), "^_^");
        assert_eq!(fix_tag_underscore("solo"), "solo");
    }

    #[test]
    fn test_parse_tag_input_normalizes() {
        let tags = parse_tag_input("  blue\u{3000}sky,,  red   dress ,, blue sky,");
        assert_eq!(tags, vec!["blue sky", "red dress"]);
    }

    #[test]
    fn test_parse_tag_input_empty() {
        assert!(parse_tag_input(" , ,, ").is_empty());
    }

    #[test]
    fn test_parse_tag_set_sorted_unique() {
        let tags = parse_tag_set("zeta, alpha,zeta , , beta");
        assert_eq!(tags, vec!["alpha", "beta", "zeta"]);
    }
}
