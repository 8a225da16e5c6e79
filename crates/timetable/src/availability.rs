//! Free-teacher computation for the substitute arrangement workflow.
//!
//! A teacher is busy in a time slot on a day if any entry for that (day, slot)
//! lists them. A candidate is free for a slot iff not busy and not already
//! assigned as a substitute in that slot on the same date.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::{
    ScheduleEntry, Substitution, SubstitutionId, Teacher, TeacherId, TimeSlot, TimeSlotId,
    Weekday,
};

/// Candidates that are free in one time slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAvailability {
    pub time_slot_id: TimeSlotId,
    pub period: u32,
    pub free_teachers: Vec<Teacher>,
}

/// Entries scheduled on `day`, in the order given.
pub fn entries_for_day(entries: &[ScheduleEntry], day: Weekday) -> Vec<ScheduleEntry> {
    entries.iter().filter(|e| e.day == day).cloned().collect()
}

/// Maps each time slot to the union of teachers occupied in it.
///
/// `entries` must already be narrowed to a single day.
pub fn busy_teachers_by_slot(
    entries: &[ScheduleEntry],
) -> BTreeMap<TimeSlotId, BTreeSet<TeacherId>> {
    let mut busy: BTreeMap<TimeSlotId, BTreeSet<TeacherId>> = BTreeMap::new();
    for entry in entries {
        busy.entry(entry.time_slot_id)
            .or_default()
            .extend(entry.teacher_ids.iter().copied());
    }
    busy
}

/// Maps each time slot to teachers already covering a substitution in it.
///
/// Substitutions whose schedule entry is not among `entries` are ignored.
pub fn substitutes_by_slot(
    substitutions: &[Substitution],
    entries: &[ScheduleEntry],
    ignore: Option<SubstitutionId>,
) -> BTreeMap<TimeSlotId, BTreeSet<TeacherId>> {
    let slot_of: HashMap<_, _> = entries.iter().map(|e| (e.id, e.time_slot_id)).collect();

    let mut consumed: BTreeMap<TimeSlotId, BTreeSet<TeacherId>> = BTreeMap::new();
    for sub in substitutions.iter().filter(|s| Some(s.id) != ignore) {
        if let Some(slot) = slot_of.get(&sub.schedule_entry_id) {
            consumed
                .entry(*slot)
                .or_default()
                .insert(sub.substitute_teacher_id);
        }
    }
    consumed
}

/// Computes, for every time slot, which candidate teachers are free.
///
/// Returns one row per slot in period order. With no candidates every row is
/// empty and no schedule data is examined.
pub fn free_teachers_per_slot(
    time_slots: &[TimeSlot],
    day_entries: &[ScheduleEntry],
    teachers: &[Teacher],
    candidates: &BTreeSet<TeacherId>,
    substitutions: &[Substitution],
) -> Vec<SlotAvailability> {
    let mut slots: Vec<&TimeSlot> = time_slots.iter().collect();
    slots.sort_by_key(|s| (s.period, s.id));

    if candidates.is_empty() {
        return slots
            .into_iter()
            .map(|slot| SlotAvailability {
                time_slot_id: slot.id,
                period: slot.period,
                free_teachers: Vec::new(),
            })
            .collect();
    }

    let busy = busy_teachers_by_slot(day_entries);
    let consumed = substitutes_by_slot(substitutions, day_entries, None);
    let candidate_teachers = sorted_teachers(
        teachers
            .iter()
            .filter(|t| candidates.contains(&t.id))
            .collect(),
    );

    slots
        .into_iter()
        .map(|slot| {
            let busy_here = busy.get(&slot.id);
            let consumed_here = consumed.get(&slot.id);
            let free_teachers = candidate_teachers
                .iter()
                .filter(|t| !busy_here.is_some_and(|b| b.contains(&t.id)))
                .filter(|t| !consumed_here.is_some_and(|c| c.contains(&t.id)))
                .map(|t| (*t).clone())
                .collect();

            SlotAvailability {
                time_slot_id: slot.id,
                period: slot.period,
                free_teachers,
            }
        })
        .collect()
}

/// Substitute choices for a single target slot.
///
/// Excludes the absent teacher, anyone scheduled in `slot` on the day, and
/// anyone already substituting in that slot. `ignore` exempts the substitution
/// being replaced so its teacher can be offered again.
pub fn available_substitutes(
    day_entries: &[ScheduleEntry],
    teachers: &[Teacher],
    slot: TimeSlotId,
    absent_teacher_id: TeacherId,
    substitutions: &[Substitution],
    ignore: Option<SubstitutionId>,
) -> Vec<Teacher> {
    let busy = busy_teachers_by_slot(day_entries);
    let consumed = substitutes_by_slot(substitutions, day_entries, ignore);
    let busy_here = busy.get(&slot);
    let consumed_here = consumed.get(&slot);

    sorted_teachers(
        teachers
            .iter()
            .filter(|t| t.id != absent_teacher_id)
            .filter(|t| !busy_here.is_some_and(|b| b.contains(&t.id)))
            .filter(|t| !consumed_here.is_some_and(|c| c.contains(&t.id)))
            .collect(),
    )
    .into_iter()
    .cloned()
    .collect()
}

/// The absent teacher's entries for the day, ordered by period.
pub fn absent_teacher_entries(
    day_entries: &[ScheduleEntry],
    time_slots: &[TimeSlot],
    absent_teacher_id: TeacherId,
) -> Vec<ScheduleEntry> {
    let period_of: HashMap<_, _> = time_slots.iter().map(|s| (s.id, s.period)).collect();
    let mut owned: Vec<ScheduleEntry> = day_entries
        .iter()
        .filter(|e| e.has_teacher(absent_teacher_id))
        .cloned()
        .collect();
    owned.sort_by_key(|e| (period_of.get(&e.time_slot_id).copied(), e.id));
    owned
}

/// Orders names case-insensitively, falling back to the exact text.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn sorted_teachers(mut teachers: Vec<&Teacher>) -> Vec<&Teacher> {
    teachers.sort_by(|a, b| compare_names(&a.name, &b.name).then_with(|| a.id.cmp(&b.id)));
    teachers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryContent, EntryDraft};
    use chrono::{NaiveDate, NaiveTime};

    fn teacher(id: i64, name: &str) -> Teacher {
        Teacher {
            id,
            name: name.to_string(),
            department: None,
            phone: None,
        }
    }

    fn slot(id: i64, period: u32) -> TimeSlot {
        TimeSlot {
            id,
            period,
            start_time: NaiveTime::from_hms_opt(7 + period, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(7 + period, 50, 0).unwrap(),
        }
    }

    fn entry(id: i64, slot: i64, teachers: Vec<i64>) -> ScheduleEntry {
        EntryDraft {
            day: Weekday::Monday,
            time_slot_id: slot,
            class_group: None,
            content: EntryContent::Subject {
                code: "ENG".to_string(),
            },
            teacher_ids: teachers,
            location_id: None,
            academic_year: 2024,
            semester: 1,
        }
        .into_entry(id)
    }

    fn substitution(id: i64, entry_id: i64, absent: i64, substitute: i64) -> Substitution {
        Substitution {
            id,
            date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            absent_teacher_id: absent,
            substitute_teacher_id: substitute,
            schedule_entry_id: entry_id,
            reason: String::new(),
            notes: None,
        }
    }

    fn fixture() -> (Vec<TimeSlot>, Vec<ScheduleEntry>, Vec<Teacher>) {
        let slots = vec![slot(2, 2), slot(1, 1), slot(3, 3)];
        let entries = vec![
            entry(10, 1, vec![1, 2]),
            entry(11, 2, vec![3]),
            entry(12, 1, vec![4]),
        ];
        let teachers = vec![
            teacher(1, "Somchai"),
            teacher(2, "anong"),
            teacher(3, "Boonmee"),
            teacher(4, "Chai"),
            teacher(5, "Dara"),
        ];
        (slots, entries, teachers)
    }

    #[test]
    fn test_busy_map_is_union_per_slot() {
        let (_, entries, _) = fixture();
        let busy = busy_teachers_by_slot(&entries);

        assert_eq!(busy[&1], BTreeSet::from([1, 2, 4]));
        assert_eq!(busy[&2], BTreeSet::from([3]));
        assert!(!busy.contains_key(&3));
    }

    #[test]
    fn test_free_iff_not_scheduled_in_slot() {
        let (slots, entries, teachers) = fixture();
        let candidates: BTreeSet<_> = teachers.iter().map(|t| t.id).collect();
        let result = free_teachers_per_slot(&slots, &entries, &teachers, &candidates, &[]);
        let busy = busy_teachers_by_slot(&entries);

        for row in &result {
            for candidate in &candidates {
                let is_free = row.free_teachers.iter().any(|t| t.id == *candidate);
                let is_busy = busy
                    .get(&row.time_slot_id)
                    .is_some_and(|b| b.contains(candidate));
                assert_eq!(is_free, !is_busy, "slot {} teacher {}", row.time_slot_id, candidate);
            }
        }
    }

    #[test]
    fn test_rows_in_period_order_and_names_sorted() {
        let (slots, entries, teachers) = fixture();
        let candidates = BTreeSet::from([2, 3, 5]);
        let result = free_teachers_per_slot(&slots, &entries, &teachers, &candidates, &[]);

        let periods: Vec<_> = result.iter().map(|r| r.period).collect();
        assert_eq!(periods, vec![1, 2, 3]);

        let slot3: Vec<_> = result[2].free_teachers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(slot3, vec!["anong", "Boonmee", "Dara"]);

        let slot1: Vec<_> = result[0].free_teachers.iter().map(|t| t.id).collect();
        assert_eq!(slot1, vec![3, 5]);
    }

    #[test]
    fn test_no_candidates_yields_empty_rows() {
        let (slots, entries, teachers) = fixture();
        let result = free_teachers_per_slot(&slots, &entries, &teachers, &BTreeSet::new(), &[]);

        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|r| r.free_teachers.is_empty()));
    }

    #[test]
    fn test_assigned_substitute_is_not_free() {
        let (slots, entries, teachers) = fixture();
        let subs = vec![substitution(1, 10, 1, 5)];
        let candidates = BTreeSet::from([5]);
        let result = free_teachers_per_slot(&slots, &entries, &teachers, &candidates, &subs);

        assert!(result[0].free_teachers.is_empty());
        assert_eq!(result[1].free_teachers[0].id, 5);
    }

    #[test]
    fn test_available_substitutes_for_slot() {
        let (_, entries, teachers) = fixture();
        let subs = vec![substitution(1, 12, 4, 5)];

        let offered = available_substitutes(&entries, &teachers, 1, 1, &subs, None);
        assert_eq!(offered.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3]);

        // Replacing substitution 1 frees its substitute again
        let offered = available_substitutes(&entries, &teachers, 1, 1, &subs, Some(1));
        assert_eq!(offered.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3, 5]);
    }

    #[test]
    fn test_absent_teacher_entries_by_period() {
        let slots = vec![slot(1, 1), slot(2, 2)];
        let entries = vec![entry(20, 2, vec![7]), entry(21, 1, vec![7, 8]), entry(22, 1, vec![8])];
        let owned = absent_teacher_entries(&entries, &slots, 7);
        assert_eq!(owned.iter().map(|e| e.id).collect::<Vec<_>>(), vec![21, 20]);
    }

    #[test]
    fn test_entries_for_day() {
        let mut tuesday = entry(30, 1, vec![1]);
        tuesday.day = Weekday::Tuesday;
        let entries = vec![entry(31, 1, vec![1]), tuesday];
        let monday = entries_for_day(&entries, Weekday::Monday);
        assert_eq!(monday.len(), 1);
        assert_eq!(monday[0].id, 31);
    }

    #[test]
    fn test_compare_names_case_insensitive() {
        assert_eq!(compare_names("anong", "Boonmee"), Ordering::Less);
        assert_eq!(compare_names("Chai", "chai"), Ordering::Less);
        assert_eq!(compare_names("Dara", "Dara"), Ordering::Equal);
    }
}
