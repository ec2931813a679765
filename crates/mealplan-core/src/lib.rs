//! Meal plan refresh engine.
//!
//! Keeps one weekly meal plan per user fresh without regenerating it more
//! often than needed: preferences are fingerprinted to detect changes, the
//! refresh decision stamps the record and hands the work to a background
//! worker, and the worker commits the generated schedule (or the failure)
//! back to the record.

pub mod dispatch;
pub mod engine;
pub mod fingerprint;
pub mod generator;
pub mod preferences;
pub mod record;
pub mod refresh;
pub mod schedule;
pub mod state;
pub mod store;
pub mod view;
pub mod worker;

pub use mealplan_db::models::{JobKind, PlanStatus};
