/// Trim a raw line and drop control characters (CR, TAB, form feeds, ...).
pub fn clean(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}
