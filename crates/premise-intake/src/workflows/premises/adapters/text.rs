const STREET_ABBREVIATIONS: [(&str, &str); 20] = [
    ("st", "street"),
    ("str", "street"),
    ("rd", "road"),
    ("ave", "avenue"),
    ("av", "avenue"),
    ("blvd", "boulevard"),
    ("dr", "drive"),
    ("ln", "lane"),
    ("ct", "court"),
    ("pl", "place"),
    ("sq", "square"),
    ("pkwy", "parkway"),
    ("cir", "circle"),
    ("hwy", "highway"),
    ("hiway", "highway"),
    ("trl", "trail"),
    ("n", "north"),
    ("s", "south"),
    ("e", "east"),
    ("w", "west"),
];

const CORPORATE_SUFFIXES: [&str; 12] = [
    "incorporated",
    "inc",
    "corporation",
    "corp",
    "llc",
    "limited",
    "ltd",
    "llp",
    "lp",
    "company",
    "co",
    "plc",
];

fn words(value: &str) -> Vec<String> {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '#' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Lowercase, punctuation-free street text with suffixes and directions spelled out.
pub(crate) fn normalize_street(value: &str) -> String {
    words(value)
        .into_iter()
        .map(|word| {
            STREET_ABBREVIATIONS
                .iter()
                .find(|(short, _)| *short == word)
                .map(|(_, long)| long.to_string())
                .unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn normalize_place(value: &str) -> String {
    words(value).join(" ")
}

/// Business name without a leading article or trailing corporate suffixes.
pub(crate) fn normalize_business_name(value: &str) -> String {
    let cleaned = value.replace('&', " and ").replace('\'', "");
    let mut tokens = words(&cleaned);

    if tokens.len() > 1 && matches!(tokens[0].as_str(), "the" | "a" | "an") {
        tokens.remove(0);
    }
    while tokens.len() > 1
        && tokens
            .last()
            .is_some_and(|last| CORPORATE_SUFFIXES.contains(&last.as_str()))
    {
        tokens.pop();
    }

    tokens.join(" ")
}
