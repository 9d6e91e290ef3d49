use std::collections::HashMap;
use std::sync::OnceLock;

static PROGRAM_NAME_MAP: OnceLock<HashMap<String, &'static str>> = OnceLock::new();

pub(crate) fn normalize_text(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Map a long-form program name to its short code, if the name is known.
pub(crate) fn program_code_for_name(value: &str) -> Option<&'static str> {
    program_name_map()
        .get(&normalize_text(value).to_ascii_lowercase())
        .copied()
}

fn program_name_map() -> &'static HashMap<String, &'static str> {
    PROGRAM_NAME_MAP.get_or_init(|| {
        const NAME_TO_CODE: &[(&str, &str)] = &[
            ("Bachelor of Science in Information Technology", "BSIT"),
            ("BS Information Technology", "BSIT"),
            ("Bachelor of Science in Computer Science", "BSCS"),
            ("BS Computer Science", "BSCS"),
            ("Bachelor of Science in Information Systems", "BSIS"),
            ("Bachelor of Science in Business Administration", "BSBA"),
            ("BS Business Administration", "BSBA"),
            ("Bachelor of Science in Accountancy", "BSA"),
            ("Bachelor of Science in Criminology", "BSCRIM"),
            ("Bachelor of Science in Hospitality Management", "BSHM"),
            ("Bachelor of Science in Tourism Management", "BSTM"),
            ("Bachelor of Science in Psychology", "BSPSYCH"),
            ("Bachelor of Elementary Education", "BEED"),
            ("Bachelor of Secondary Education", "BSED"),
            ("Bachelor of Arts in Communication", "ABCOMM"),
        ];

        NAME_TO_CODE
            .iter()
            .map(|(name, code)| (name.to_ascii_lowercase(), *code))
            .collect()
    })
}

/// Collapse a year-level label to the ordinal it denotes (`"1st Year"` -> 1).
pub(crate) fn year_ordinal(value: &str) -> Option<u8> {
    let compact: String = normalize_text(value)
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .collect();

    let stripped = compact
        .strip_suffix("yearlevel")
        .or_else(|| compact.strip_suffix("year"))
        .or_else(|| compact.strip_suffix("yr"))
        .unwrap_or(&compact);
    let stripped = stripped
        .strip_prefix("yearlevel")
        .or_else(|| stripped.strip_prefix("year"))
        .unwrap_or(stripped);

    match stripped {
        "1" | "1st" | "first" => Some(1),
        "2" | "2nd" | "second" => Some(2),
        "3" | "3rd" | "third" => Some(3),
        "4" | "4th" | "fourth" => Some(4),
        "5" | "5th" | "fifth" => Some(5),
        _ => None,
    }
}
