use crate::Record;

/// Result of writing one sighting into a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Merged,
}

/// Applies a repeat sighting onto the stored record.
///
/// Text fields are replaced only by non-blank incoming values; counters keep
/// the running maximum. Returns `true` if `stored` changed.
pub fn merge_record(stored: &mut Record, incoming: &Record) -> bool {
    let mut changed = false;

    for (name, value) in &incoming.fields {
        if value.trim().is_empty() {
            continue;
        }
        if stored.fields.get(name) != Some(value) {
            stored.fields.insert(name.clone(), value.clone());
            changed = true;
        }
    }

    for (name, &value) in &incoming.counters {
        let current = stored.counters.entry(name.clone()).or_insert(0);
        if value > *current {
            *current = value;
            changed = true;
        }
    }

    changed
}
