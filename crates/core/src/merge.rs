use std::collections::HashMap;

use crate::models::ChecklistItem;

/// Collapses a concatenated candidate sequence into one item per name.
/// Later occurrences replace earlier ones entirely (category, priority and
/// reason included), so the caller's concatenation order decides conflicts.
pub fn merge_items(candidates: Vec<ChecklistItem>) -> Vec<ChecklistItem> {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, ChecklistItem> = HashMap::new();

    for item in candidates {
        if !by_name.contains_key(&item.name) {
            order.push(item.name.clone());
        }
        by_name.insert(item.name.clone(), item);
    }

    let mut merged: Vec<ChecklistItem> = order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect();
    sort_items(&mut merged);
    merged
}

/// Presentation order: priority descending, then category, then name.
/// Names are unique after a merge, so the order is total.
pub fn sort_items(items: &mut [ChecklistItem]) {
    items.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.name.cmp(&b.name))
    });
}
