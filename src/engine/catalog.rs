use crate::models::item::Item;
use crate::state::AppState;

const MAX_RESULTS: usize = 50;

/// Case-insensitive substring match on item names within one city.
pub fn search_items(state: &AppState, city: &str, query: &str) -> Vec<Item> {
    let city = city.trim();
    let needle = query.trim().to_lowercase();
    if city.is_empty() || needle.is_empty() {
        return Vec::new();
    }

    let mut items: Vec<Item> = state
        .items
        .iter()
        .filter(|entry| entry.city.eq_ignore_ascii_case(city))
        .filter(|entry| entry.name.to_lowercase().contains(&needle))
        .map(|entry| entry.value().clone())
        .collect();

    items.sort_by(|a, b| a.name.cmp(&b.name));
    items.truncate(MAX_RESULTS);
    items
}
