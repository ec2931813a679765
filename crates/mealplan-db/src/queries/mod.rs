pub mod meal_plans;
