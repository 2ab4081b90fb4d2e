//! Calendar grouping of time steps

use std::collections::BTreeMap;

use crate::calendar::{CalendarDate, CalendarField};

/// Groups of time-step indices keyed by a calendar field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeGroups {
    pub field: CalendarField,
    /// Keys present in the data, ascending.
    pub keys: Vec<i64>,
    /// Time-step indices of each key, in time order.
    pub indices: Vec<Vec<usize>>,
}

impl TimeGroups {
    /// Group `dates` by `field`. Only keys that occur are kept.
    pub fn new(field: CalendarField, dates: &[CalendarDate]) -> Self {
        let mut by_key: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, date) in dates.iter().enumerate() {
            by_key.entry(field.key(date)).or_default().push(i);
        }
        let (keys, indices) = by_key.into_iter().unzip();
        Self {
            field,
            keys,
            indices,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monthly(months: usize) -> Vec<CalendarDate> {
        (0..months)
            .map(|i| CalendarDate {
                year: 2000 + (i / 12) as i32,
                month: (i % 12) as u32 + 1,
                day: 15,
                hour: 0,
                day_of_year: 1,
            })
            .collect()
    }

    #[test]
    fn two_years_by_month_gives_twelve_groups_of_two() {
        let groups = TimeGroups::new(CalendarField::Month, &monthly(24));
        assert_eq!(groups.keys, (1..=12).collect::<Vec<i64>>());
        assert!(groups.indices.iter().all(|g| g.len() == 2));
        assert_eq!(groups.indices[0], vec![0, 12]);
    }

    #[test]
    fn only_present_seasons_are_kept() {
        // March..August: MAM and JJA
        let dates: Vec<CalendarDate> = monthly(8).into_iter().skip(2).collect();
        let groups = TimeGroups::new(CalendarField::Season, &dates);
        assert_eq!(groups.keys, vec![1, 2]);
    }
}
