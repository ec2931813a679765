//! Map decoded model output onto schedule types.
//!
//! The model's output is trusted only as far as its shape: a `days` array
//! must be present, but missing days, missing slots and meals without a
//! name all degrade to empty slots rather than failing the whole plan.

use chrono::{Duration, NaiveDate};
use serde_json::{Map, Value};

use super::GeneratorError;
use crate::schedule::{DayLabel, DayMeals, Meal, MealSlot, TODAY_LABEL, WeeklySchedule, meal_id};

fn days_array(object: &Map<String, Value>) -> Result<&Vec<Value>, GeneratorError> {
    object
        .get("days")
        .and_then(Value::as_array)
        .ok_or_else(|| GeneratorError::MalformedContent("response has no `days` array".to_string()))
}

/// Build a week from `{"days": [...]}`. Entry `i` becomes the day at
/// `week_start + i`; entries past the seventh are ignored.
pub fn weekly_from_object(
    object: &Map<String, Value>,
    week_start: NaiveDate,
) -> Result<WeeklySchedule, GeneratorError> {
    let raw_days = days_array(object)?;

    let days: [DayMeals; 7] = std::array::from_fn(|i| {
        let label = DayLabel::ALL[i];
        let date = week_start + Duration::days(i as i64);
        map_meals(
            raw_days.get(i).and_then(|d| d.get("meals")),
            date,
            label.as_str(),
        )
    });

    Ok(WeeklySchedule { week_start, days })
}

/// Today's slots from the first entry of `{"days": [...]}`.
pub fn daily_from_object(
    object: &Map<String, Value>,
    date: NaiveDate,
) -> Result<DayMeals, GeneratorError> {
    let raw_days = days_array(object)?;
    let meals = raw_days.first().and_then(|d| d.get("meals"));
    Ok(map_meals(meals, date, TODAY_LABEL))
}

fn map_meals(meals: Option<&Value>, date: NaiveDate, label: &str) -> DayMeals {
    let mut out = DayMeals::default();
    for slot in MealSlot::ALL {
        let meal = meals
            .and_then(|m| m.get(slot.as_str()))
            .and_then(|raw| map_meal(raw, slot, date, label));
        out.set_slot(slot, meal);
    }
    out
}

fn map_meal(raw: &Value, slot: MealSlot, date: NaiveDate, label: &str) -> Option<Meal> {
    let name = text(raw, "name")?;
    Some(Meal {
        id: meal_id(&name, slot, date, label),
        category: text(raw, "category"),
        area: text(raw, "area"),
        thumbnail: text(raw, "thumb").or_else(|| text(raw, "thumbnail")),
        name,
    })
}

/// Trimmed, non-empty string field.
fn text(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 23).unwrap()
    }

    #[test]
    fn weekly_maps_meals_with_ids() {
        let obj = object(json!({
            "days": [{
                "day": "Mon",
                "meals": {
                    "breakfast": { "name": " Oatmeal ", "category": "Breakfast", "thumb": "http://img/1" },
                    "lunch": { "name": "Lentil Soup", "area": "Turkish" },
                    "dinner": { "name": "" },
                },
            }],
        }));

        let week = weekly_from_object(&obj, monday()).unwrap();
        let mon = &week.days[0];
        let breakfast = mon.breakfast.as_ref().unwrap();
        assert_eq!(breakfast.name, "Oatmeal");
        assert_eq!(breakfast.category.as_deref(), Some("Breakfast"));
        assert_eq!(breakfast.thumbnail.as_deref(), Some("http://img/1"));
        assert_eq!(
            breakfast.id,
            meal_id("Oatmeal", MealSlot::Breakfast, monday(), "Mon")
        );
        assert_eq!(mon.lunch.as_ref().unwrap().area.as_deref(), Some("Turkish"));
        assert!(mon.dinner.is_none(), "blank name maps to an empty slot");
    }

    #[test]
    fn short_day_list_pads_with_empty_days() {
        let obj = object(json!({ "days": [{ "meals": { "lunch": { "name": "Pho" } } }] }));
        let week = weekly_from_object(&obj, monday()).unwrap();
        assert!(week.days[0].lunch.is_some());
        assert!(week.days[1..].iter().all(DayMeals::is_empty));
        assert_eq!(week.date_of(DayLabel::Sun), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn missing_days_is_malformed() {
        for value in [json!({}), json!({ "days": "Mon" }), json!({ "plan": [] })] {
            let err = weekly_from_object(&object(value), monday()).unwrap_err();
            assert!(matches!(err, GeneratorError::MalformedContent(_)));
        }
    }

    #[test]
    fn daily_uses_first_day_and_today_label() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 25).unwrap();
        let obj = object(json!({
            "days": [
                { "meals": { "dinner": { "name": "Risotto" } } },
                { "meals": { "dinner": { "name": "Ignored" } } },
            ],
        }));
        let meals = daily_from_object(&obj, date).unwrap();
        let dinner = meals.dinner.unwrap();
        assert_eq!(dinner.name, "Risotto");
        assert_eq!(dinner.id, meal_id("Risotto", MealSlot::Dinner, date, "Today"));
        assert!(meals.breakfast.is_none());
    }

    #[test]
    fn daily_with_empty_days_is_all_empty() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 25).unwrap();
        let meals = daily_from_object(&object(json!({ "days": [] })), date).unwrap();
        assert!(meals.is_empty());
    }

    #[test]
    fn non_object_meal_is_empty_slot() {
        let obj = object(json!({ "days": [{ "meals": { "breakfast": "toast", "lunch": null } }] }));
        let week = weekly_from_object(&obj, monday()).unwrap();
        assert!(week.days[0].is_empty());
    }
}
