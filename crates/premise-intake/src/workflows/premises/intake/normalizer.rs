pub(crate) fn normalize_header(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    collapsed.replace('-', "_").to_ascii_lowercase()
}

/// Which record field a header feeds, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Column {
    Name,
    BusinessType,
    Address,
    City,
    State,
    PostalCode,
}

/// First matching rule wins, so a `location_name` header is a name, not an address.
pub(crate) fn classify_header(header: &str) -> Option<Column> {
    let key = normalize_header(header);
    let contains_any = |needles: &[&str]| needles.iter().any(|needle| key.contains(needle));

    if contains_any(&[
        "premise_name",
        "business_name",
        "company_name",
        "facility_name",
        "location_name",
    ]) || key == "name"
        || key == "business"
    {
        Some(Column::Name)
    } else if contains_any(&["type", "category", "industry"]) {
        Some(Column::BusinessType)
    } else if contains_any(&["address", "street", "location"]) && !key.contains("name") {
        Some(Column::Address)
    } else if contains_any(&["city", "municipality", "town"]) {
        Some(Column::City)
    } else if key.contains("state") || key == "st" {
        Some(Column::State)
    } else if contains_any(&["postal", "zip"]) {
        Some(Column::PostalCode)
    } else {
        None
    }
}
