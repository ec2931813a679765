//! Weekly schedule and plan content types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Label of a weekday, Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DayLabel {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayLabel {
    pub const ALL: [DayLabel; 7] = [
        Self::Mon,
        Self::Tue,
        Self::Wed,
        Self::Thu,
        Self::Fri,
        Self::Sat,
        Self::Sun,
    ];

    pub fn for_date(date: NaiveDate) -> Self {
        Self::ALL[date.weekday().num_days_from_monday() as usize]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mon => "Mon",
            Self::Tue => "Tue",
            Self::Wed => "Wed",
            Self::Thu => "Thu",
            Self::Fri => "Fri",
            Self::Sat => "Sat",
            Self::Sun => "Sun",
        }
    }
}

impl fmt::Display for DayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label mixed into meal ids for meals produced by a daily refresh.
pub const TODAY_LABEL: &str = "Today";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealSlot {
    pub const ALL: [MealSlot; 3] = [Self::Breakfast, Self::Lunch, Self::Dinner];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        }
    }
}

/// Monday of the week containing `date`.
pub fn week_start_for(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Stable meal identifier: the first 16 hex chars of
/// SHA-256(name ‖ slot ‖ date ‖ label).
pub fn meal_id(name: &str, slot: MealSlot, date: NaiveDate, label: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(slot.as_str().as_bytes());
    hasher.update(date.to_string().as_bytes());
    hasher.update(label.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(16);
    id
}

/// One suggested meal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// The three slots of one day. Any slot may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayMeals {
    #[serde(default)]
    pub breakfast: Option<Meal>,
    #[serde(default)]
    pub lunch: Option<Meal>,
    #[serde(default)]
    pub dinner: Option<Meal>,
}

impl DayMeals {
    pub fn slot(&self, slot: MealSlot) -> Option<&Meal> {
        match slot {
            MealSlot::Breakfast => self.breakfast.as_ref(),
            MealSlot::Lunch => self.lunch.as_ref(),
            MealSlot::Dinner => self.dinner.as_ref(),
        }
    }

    pub fn set_slot(&mut self, slot: MealSlot, meal: Option<Meal>) {
        match slot {
            MealSlot::Breakfast => self.breakfast = meal,
            MealSlot::Lunch => self.lunch = meal,
            MealSlot::Dinner => self.dinner = meal,
        }
    }

    pub fn is_empty(&self) -> bool {
        MealSlot::ALL.iter().all(|s| self.slot(*s).is_none())
    }
}

/// A dated day of meals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub meals: DayMeals,
}

/// A generated week: seven days of meals, Monday first, dated
/// `week_start + i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    pub week_start: NaiveDate,
    pub days: [DayMeals; 7],
}

impl WeeklySchedule {
    pub fn date_of(&self, label: DayLabel) -> NaiveDate {
        self.week_start + Duration::days(label as i64)
    }
}

/// Stored content of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanContent {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub days: BTreeMap<DayLabel, DayPlan>,
    /// Snapshot of the current day.
    #[serde(default)]
    pub daily: Option<DayPlan>,
}

impl PlanContent {
    /// Build content from a freshly generated week. The daily snapshot is
    /// taken from the day matching `today` when it falls inside the week.
    pub fn from_weekly(schedule: WeeklySchedule, today: NaiveDate) -> Self {
        let week_start = schedule.week_start;
        let week_end = week_start + Duration::days(6);

        let days: BTreeMap<DayLabel, DayPlan> = DayLabel::ALL
            .into_iter()
            .zip(schedule.days)
            .map(|(label, meals)| {
                let date = week_start + Duration::days(label as i64);
                (label, DayPlan { date, meals })
            })
            .collect();

        let daily = if (week_start..=week_end).contains(&today) {
            days.get(&DayLabel::for_date(today)).cloned()
        } else {
            None
        };

        Self {
            week_start,
            week_end,
            days,
            daily,
        }
    }

    /// Replace the slots of `date`'s weekday and the daily snapshot,
    /// leaving the other days and the week bounds untouched.
    pub fn with_daily(mut self, date: NaiveDate, meals: DayMeals) -> Self {
        let day = DayPlan { date, meals };
        self.days.insert(DayLabel::for_date(date), day.clone());
        self.daily = Some(day);
        self
    }

    pub fn daily_date(&self) -> Option<NaiveDate> {
        self.daily.as_ref().map(|d| d.date)
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}
