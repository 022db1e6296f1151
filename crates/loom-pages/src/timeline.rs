//! Timeline event picker.
//!
//! Each timeline row either references a shared event (whose name and date
//! then fill the row, read-only) or stands alone with hand-entered values.
//! The date selects and the event dropdown constrain each other: picking
//! dates narrows which events are offered, picking an event locks the dates.

use smol_str::SmolStr;

/// A calendar date as the form fields hold it; empty strings mean unset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventDate {
    pub day: SmolStr,
    pub month: SmolStr,
    pub year: SmolStr,
}

impl EventDate {
    pub fn new(day: &str, month: &str, year: &str) -> Self {
        Self {
            day: SmolStr::new(day),
            month: SmolStr::new(month),
            year: SmolStr::new(year),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub id: SmolStr,
    pub name: String,
    pub date: EventDate,
}

#[derive(Debug, Clone, Default)]
pub struct TimelineCatalog {
    events: Vec<TimelineEvent>,
}

impl TimelineCatalog {
    pub fn new(events: Vec<TimelineEvent>) -> Self {
        Self { events }
    }

    pub fn find(&self, id: &str) -> Option<&TimelineEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Events compatible with partially-filled date fields.
    pub fn matching(&self, date: &EventDate) -> Vec<&TimelineEvent> {
        self.events
            .iter()
            .filter(|e| {
                let fits = |set: &SmolStr, have: &SmolStr| set.is_empty() || set == have;
                fits(&date.day, &e.date.day)
                    && fits(&date.month, &e.date.month)
                    && fits(&date.year, &e.date.year)
            })
            .collect()
    }
}

/// One editable row of the timeline form.
#[derive(Debug, Clone, Default)]
pub struct TimelineRow {
    pub event: Option<SmolStr>,
    pub date: EventDate,
    pub name: String,
    /// Set while an event is picked; locked fields ignore edits and render
    /// disabled.
    pub locked: bool,
}

impl TimelineRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick an event (locking the row to its data) or pick the blank entry
    /// (unlocking, keeping the filled-in values for further editing).
    pub fn select_event(&mut self, catalog: &TimelineCatalog, id: Option<&str>) {
        match id.and_then(|id| catalog.find(id)) {
            Some(event) => {
                self.event = Some(event.id.clone());
                self.date = event.date.clone();
                self.name = event.name.clone();
                self.locked = true;
            }
            None => {
                self.event = None;
                self.locked = false;
            }
        }
    }

    pub fn set_day(&mut self, day: &str) {
        if !self.locked {
            self.date.day = SmolStr::new(day);
        }
    }

    pub fn set_month(&mut self, month: &str) {
        if !self.locked {
            self.date.month = SmolStr::new(month);
        }
    }

    pub fn set_year(&mut self, year: &str) {
        if !self.locked {
            self.date.year = SmolStr::new(year);
        }
    }

    pub fn set_name(&mut self, name: &str) {
        if !self.locked {
            self.name = name.to_string();
        }
    }

    /// Dropdown contents for this row given its date fields.
    pub fn event_choices<'a>(&self, catalog: &'a TimelineCatalog) -> Vec<&'a TimelineEvent> {
        catalog.matching(&self.date)
    }
}

/// The whole timeline form.
#[derive(Debug, Clone, Default)]
pub struct TimelineForm {
    pub rows: Vec<TimelineRow>,
}

impl TimelineForm {
    pub fn with_rows(count: usize) -> Self {
        Self {
            rows: (0..count).map(|_| TimelineRow::new()).collect(),
        }
    }

    /// Disabled fields do not post, so every row unlocks right before the
    /// form submits.
    pub fn unlock_all_for_submit(&mut self) {
        for row in &mut self.rows {
            row.locked = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TimelineCatalog {
        TimelineCatalog::new(vec![
            TimelineEvent {
                id: SmolStr::new("e1"),
                name: "The Coronation".to_string(),
                date: EventDate::new("12", "3", "1211"),
            },
            TimelineEvent {
                id: SmolStr::new("e2"),
                name: "The Fire".to_string(),
                date: EventDate::new("4", "7", "1211"),
            },
            TimelineEvent {
                id: SmolStr::new("e3"),
                name: "The Trial".to_string(),
                date: EventDate::new("4", "7", "1215"),
            },
        ])
    }

    #[test]
    fn test_select_event_fills_and_locks() {
        let cat = catalog();
        let mut row = TimelineRow::new();
        row.select_event(&cat, Some("e1"));
        assert!(row.locked);
        assert_eq!(row.name, "The Coronation");
        assert_eq!(row.date, EventDate::new("12", "3", "1211"));
        // locked fields ignore edits
        row.set_day("1");
        row.set_name("scribbled over");
        assert_eq!(row.date.day, "12");
        assert_eq!(row.name, "The Coronation");
    }

    #[test]
    fn test_blank_selection_unlocks_but_keeps_values() {
        let cat = catalog();
        let mut row = TimelineRow::new();
        row.select_event(&cat, Some("e2"));
        row.select_event(&cat, None);
        assert!(!row.locked);
        assert_eq!(row.name, "The Fire");
        row.set_name("A Smaller Fire");
        assert_eq!(row.name, "A Smaller Fire");
    }

    #[test]
    fn test_date_fields_filter_event_choices() {
        let cat = catalog();
        let mut row = TimelineRow::new();
        assert_eq!(row.event_choices(&cat).len(), 3);
        row.set_day("4");
        row.set_month("7");
        let ids: Vec<&str> = row
            .event_choices(&cat)
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["e2", "e3"]);
        row.set_year("1215");
        let ids: Vec<&str> = row
            .event_choices(&cat)
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["e3"]);
    }

    #[test]
    fn test_unlock_all_for_submit() {
        let cat = catalog();
        let mut form = TimelineForm::with_rows(3);
        form.rows[0].select_event(&cat, Some("e1"));
        form.rows[2].select_event(&cat, Some("e3"));
        form.unlock_all_for_submit();
        assert!(form.rows.iter().all(|r| !r.locked));
        // values survive the unlock so they post
        assert_eq!(form.rows[0].name, "The Coronation");
    }
}
