use std::collections::HashSet;
use std::ops::{Range, RangeInclusive};

use crate::models::{FeedPosition, Materialization, UserAction};

/// Section/row delta between two materializations.
///
/// Apply as a section-level splice (delete `deleted_sections` from the old
/// view, insert `inserted_sections` of the new one) followed by row inserts;
/// sections outside both ranges keep their relative order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDiff {
    pub deleted_sections: Range<usize>,
    pub inserted_sections: Range<usize>,
    pub inserted_rows: Vec<FeedPosition>,
}

impl FeedDiff {
    /// Nothing new to show
    pub fn is_empty(&self) -> bool {
        self.inserted_rows.is_empty()
    }
}

pub fn diff(old: &Materialization, new: &Materialization, action: UserAction) -> FeedDiff {
    match action {
        UserAction::Focus => replace_all(old, new),
        UserAction::ScrollUp => {
            let added = new.section_count().saturating_sub(old.section_count());
            FeedDiff {
                deleted_sections: 0..0,
                inserted_sections: 0..added,
                // The old first section may have gained older rows too
                inserted_rows: unseen_rows(old, new, 0..=added),
            }
        }
        UserAction::Refresh => {
            if old.section_count() == 0 {
                return FeedDiff {
                    deleted_sections: 0..0,
                    inserted_sections: 0..new.section_count(),
                    inserted_rows: new.positions(),
                };
            }
            let last_old = old.section_count() - 1;
            let added = new.section_count().saturating_sub(old.section_count());
            FeedDiff {
                deleted_sections: 0..0,
                inserted_sections: last_old + 1..last_old + 1 + added,
                // The old last section may have gained newer rows too
                inserted_rows: unseen_rows(old, new, last_old..=last_old + added),
            }
        }
    }
}

fn replace_all(old: &Materialization, new: &Materialization) -> FeedDiff {
    FeedDiff {
        deleted_sections: 0..old.section_count(),
        inserted_sections: 0..new.section_count(),
        inserted_rows: new.positions(),
    }
}

/// Positions inside `sections` of `new` whose message is not in `old`.
fn unseen_rows(
    old: &Materialization,
    new: &Materialization,
    sections: RangeInclusive<usize>,
) -> Vec<FeedPosition> {
    let old_ids: HashSet<u64> = old.ids();
    sections
        .filter_map(|index| new.sections.get(index))
        .flat_map(|section| section.items.iter())
        .filter(|item| !old_ids.contains(&item.message_id))
        .map(|item| item.position())
        .collect()
}
