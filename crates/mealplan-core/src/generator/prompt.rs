//! Prompt construction for chat-completion based generators.

use serde_json::{Value, json};

use crate::preferences::Preferences;

pub const SYSTEM_PROMPT: &str = "You are a nutritionist that plans realistic meals. \
Return ONLY JSON with no fences, no commentary.";

/// The user message: a JSON document describing the preferences, how many
/// days to plan, an example of the expected shape, and the rules to follow.
pub fn user_message(preferences: &Preferences, day_count: usize) -> String {
    let country = preferences.country.as_deref().unwrap_or("Any");
    let allergens: Vec<&str> = preferences.allergens.iter().map(String::as_str).collect();

    let body = json!({
        "preferences": {
            "diet": preferences.diet,
            "goal": preferences.goal,
            "country": country,
            "allergens": allergens,
            "portion": preferences.portion,
        },
        "days": day_count,
        "schema": example_schema(),
        "rules": {
            "avoid_allergens": allergens,
            "respect_diet": preferences.diet,
            "respect_goal": preferences.goal,
            "adapt_country": country,
            "keep_portion_note": preferences.portion,
            "keep_names_short": true,
        },
        "output": "Return only JSON. Do not include markdown fences or explanations.",
    });

    body.to_string()
}

fn example_schema() -> Value {
    json!({
        "days": [{
            "day": "Mon",
            "meals": {
                "breakfast": {
                    "name": "Chicken Salad",
                    "category": "Salad",
                    "area": "American",
                    "thumb": "https://example.com/img.jpg",
                },
                "lunch": { "name": "..." },
                "dinner": { "name": "..." },
            },
        }],
    })
}
