//! Shared fakes for engine and worker tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use mealplan_core::dispatch::{GenerationTask, TaskDispatcher};
use mealplan_core::generator::{GeneratorError, GeneratorErrorKind, PlanGenerator};
use mealplan_core::preferences::{PreferenceInput, Preferences};
use mealplan_core::schedule::{DayLabel, DayMeals, Meal, MealSlot, WeeklySchedule, meal_id};

/// Wednesday 2026-02-25, mid-morning.
pub fn wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 25, 10, 0, 0).unwrap()
}

pub fn monday_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 23).unwrap()
}

pub fn vegan() -> PreferenceInput {
    PreferenceInput {
        diet: Some("Vegan".to_string()),
        goal: Some("Eat Healthier".to_string()),
        allergens: vec!["peanut".to_string()],
        ..Default::default()
    }
}

pub fn keto() -> PreferenceInput {
    PreferenceInput {
        diet: Some("Keto".to_string()),
        ..Default::default()
    }
}

/// Dispatcher that only records what it was handed.
#[derive(Default)]
pub struct RecordingDispatcher {
    tasks: Mutex<Vec<GenerationTask>>,
}

impl RecordingDispatcher {
    pub fn tasks(&self) -> Vec<GenerationTask> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<GenerationTask> {
        self.tasks.lock().unwrap().last().cloned()
    }
}

impl TaskDispatcher for RecordingDispatcher {
    fn enqueue(&self, task: GenerationTask) {
        self.tasks.lock().unwrap().push(task);
    }
}

fn meal(prefix: &str, slot: MealSlot, date: NaiveDate, label: &str) -> Meal {
    let name = format!("{prefix} {label} {}", slot.as_str());
    Meal {
        id: meal_id(&name, slot, date, label),
        name,
        category: None,
        area: None,
        thumbnail: None,
    }
}

fn day(prefix: &str, date: NaiveDate, label: &str) -> DayMeals {
    let mut meals = DayMeals::default();
    for slot in MealSlot::ALL {
        meals.set_slot(slot, Some(meal(prefix, slot, date, label)));
    }
    meals
}

/// Generator that returns canned schedules, or fails with a fixed kind.
#[derive(Default)]
pub struct ScriptedGenerator {
    fail: Option<GeneratorErrorKind>,
    weekly_calls: AtomicUsize,
    daily_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing(kind: GeneratorErrorKind) -> Self {
        Self {
            fail: Some(kind),
            ..Default::default()
        }
    }

    pub fn weekly_calls(&self) -> usize {
        self.weekly_calls.load(Ordering::SeqCst)
    }

    pub fn daily_calls(&self) -> usize {
        self.daily_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), GeneratorError> {
        match self.fail {
            None => Ok(()),
            Some(GeneratorErrorKind::Unavailable) => {
                Err(GeneratorError::Unavailable("missing API key".to_string()))
            }
            Some(GeneratorErrorKind::UpstreamError) => Err(GeneratorError::Upstream {
                status: Some(503),
                message: "HTTP 503 Service Unavailable".to_string(),
            }),
            Some(GeneratorErrorKind::EmptyContent) => Err(GeneratorError::EmptyContent),
            Some(GeneratorErrorKind::MalformedContent) => Err(GeneratorError::MalformedContent(
                "response has no `days` array".to_string(),
            )),
        }
    }
}

#[async_trait]
impl PlanGenerator for ScriptedGenerator {
    async fn generate_weekly(
        &self,
        _preferences: &Preferences,
        week_start: NaiveDate,
    ) -> Result<WeeklySchedule, GeneratorError> {
        self.weekly_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let days = std::array::from_fn(|i| {
            let label = DayLabel::ALL[i];
            let date = week_start + chrono::Duration::days(i as i64);
            day("Weekly", date, label.as_str())
        });
        Ok(WeeklySchedule { week_start, days })
    }

    async fn generate_daily(
        &self,
        _preferences: &Preferences,
        date: NaiveDate,
    ) -> Result<DayMeals, GeneratorError> {
        self.daily_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(day("Daily", date, "Today"))
    }
}
