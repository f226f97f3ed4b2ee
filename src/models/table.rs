use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A synchronized table, shared by the local store and the remote gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Notes,
    Verses,
    DailyRecords,
    PersonalNoteCategories,
    PersonalNotes,
}

impl Table {
    /// Push and pull order. Parents come before their children.
    pub const ALL: [Table; 5] = [
        Table::Notes,
        Table::Verses,
        Table::DailyRecords,
        Table::PersonalNoteCategories,
        Table::PersonalNotes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Notes => "notes",
            Table::Verses => "verses",
            Table::DailyRecords => "daily_records",
            Table::PersonalNoteCategories => "personal_note_categories",
            Table::PersonalNotes => "personal_notes",
        }
    }

    /// Tables whose rows are removed locally when a row of this table is deleted.
    pub fn cascades_to(&self) -> &'static [Table] {
        match self {
            Table::Notes => &[Table::Verses],
            _ => &[],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|table| table.name() == s)
            .ok_or_else(|| {
                format!(
                    "Invalid table '{}'. Valid options: notes, verses, daily_records, personal_note_categories, personal_notes",
                    s
                )
            })
    }
}
