//! Plan generation: the [`PlanGenerator`] seam and its error type.
//!
//! The default implementation is [`openai::OpenAiGenerator`], which asks an
//! OpenAI-compatible chat-completions endpoint for a JSON schedule.

pub mod extract;
pub mod mapping;
pub mod openai;
pub mod prompt;

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::preferences::Preferences;
use crate::schedule::{DayMeals, WeeklySchedule};

pub use openai::{GeneratorConfig, OpenAiGenerator};

/// Coarse classification of a generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorErrorKind {
    Unavailable,
    UpstreamError,
    EmptyContent,
    MalformedContent,
}

impl GeneratorErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::UpstreamError => "upstream_error",
            Self::EmptyContent => "empty_content",
            Self::MalformedContent => "malformed_content",
        }
    }
}

impl fmt::Display for GeneratorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The generator is not configured (e.g. no credentials).
    #[error("meal planner unavailable: {0}")]
    Unavailable(String),

    /// Transport failure, timeout, or a non-success HTTP status.
    #[error("meal planner upstream error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("meal planner returned empty content")]
    EmptyContent,

    #[error("meal planner returned malformed content: {0}")]
    MalformedContent(String),
}

impl GeneratorError {
    pub fn kind(&self) -> GeneratorErrorKind {
        match self {
            Self::Unavailable(_) => GeneratorErrorKind::Unavailable,
            Self::Upstream { .. } => GeneratorErrorKind::UpstreamError,
            Self::EmptyContent => GeneratorErrorKind::EmptyContent,
            Self::MalformedContent(_) => GeneratorErrorKind::MalformedContent,
        }
    }
}

/// Produces meal schedules from preferences.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// Seven days of meals, Monday first, dated from `week_start`.
    async fn generate_weekly(
        &self,
        preferences: &Preferences,
        week_start: NaiveDate,
    ) -> Result<WeeklySchedule, GeneratorError>;

    /// The three slots for `date`.
    async fn generate_daily(
        &self,
        preferences: &Preferences,
        date: NaiveDate,
    ) -> Result<DayMeals, GeneratorError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PlanGenerator) {}
};
