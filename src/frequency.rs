use std::collections::HashMap;

use serde::Serialize;

use crate::data::Cell;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyEntry {
    pub value: String,
    pub count: usize,
}

/// Everything that fell outside the top-K entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OtherBucket {
    pub distinct: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrequencyTable {
    pub top: Vec<FrequencyEntry>,
    pub other: OtherBucket,
}

impl FrequencyTable {
    /// Distinct present values, listed or bucketed.
    pub fn distinct(&self) -> usize {
        self.top.len() + self.other.distinct
    }
}

/// Counts present cells by grouping key, remembering first-seen order so
/// equal counts rank deterministically.
#[derive(Debug, Default)]
pub struct FrequencyAccumulator {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl FrequencyAccumulator {
    pub fn ingest(&mut self, cell: &Cell) {
        if cell.is_absent() {
            return;
        }
        let key = cell.key();
        match self.counts.get_mut(&key) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(key.clone(), 1);
                self.order.push(key);
            }
        }
    }

    pub fn into_table(self, top: usize) -> FrequencyTable {
        let Self { order, counts } = self;
        let mut items = order
            .into_iter()
            .map(|value| {
                let count = counts.get(&value).copied().unwrap_or(0);
                FrequencyEntry { value, count }
            })
            .collect::<Vec<_>>();
        // stable: ties keep first-seen order
        items.sort_by(|a, b| b.count.cmp(&a.count));
        let rest = if items.len() > top {
            items.split_off(top)
        } else {
            Vec::new()
        };
        FrequencyTable {
            top: items,
            other: OtherBucket {
                distinct: rest.len(),
                count: rest.iter().map(|entry| entry.count).sum(),
            },
        }
    }
}

pub fn frequency_table<'a, I>(cells: I, top: usize) -> FrequencyTable
where
    I: IntoIterator<Item = &'a Cell>,
{
    let mut accumulator = FrequencyAccumulator::default();
    for cell in cells {
        accumulator.ingest(cell);
    }
    accumulator.into_table(top)
}
