use crate::catalog::{PromptCatalog, Variant};
use crate::ssml;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Scales every playback delay. Kept as a tuning hook for slower voices.
pub const GENERAL_DELAY_ADJUST: f64 = 1.0;
/// Extra time the welcome speech needs before the shutter moment.
pub const WELCOME_DELAY_OFFSET: Duration = Duration::from_millis(3000);

pub const WELCOME: &str = "WELCOME";
pub const TAKE_PICTURE: &str = "TAKE_PICTURE";
pub const APPROVAL_INQUIRY: &str = "APPROVAL_INQUIRY";
pub const LAST_CHANCE_INQUIRY: &str = "LAST_CHANCE_INQUIRY";

const WELCOME_JOINER: &str = ", ";
const CAPTURE_JOINER: &str = "... ... ";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlannerError {
    #[error("Unknown prompt: {0}")]
    UnknownPrompt(String),
    #[error("Prompt {name} has no variant at index {index}")]
    VariantOutOfRange { name: String, index: usize },
    #[error("Prompt {0} does not carry a command delay")]
    MissingDelay(String),
}

/// Speech markup plus the delay until the booth should act on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedSpeech {
    pub speech: String,
    pub delay: Duration,
}

/// Per-prompt position of the next variant to serve.
///
/// Unset and exhausted cursors both serve variant 0 and then store 1, so the
/// served sequence is `0, 1, …, n-1, 0, 1, …`.
#[derive(Debug, Default)]
pub struct CursorStore {
    cursors: HashMap<String, usize>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index to serve for a prompt with `count` variants and
    /// advances the cursor.
    pub fn advance(&mut self, name: &str, count: usize) -> usize {
        if count <= 1 {
            return 0;
        }
        match self.cursors.get_mut(name) {
            Some(cursor) if *cursor < count => {
                let index = *cursor;
                *cursor += 1;
                index
            }
            _ => {
                self.cursors.insert(name.to_string(), 1);
                0
            }
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.cursors.get(name).copied()
    }
}

/// Chooses and renders prompt variants.
///
/// The cursor store is shared by every session served by this planner.
pub struct ResponsePlanner {
    catalog: PromptCatalog,
    cursors: Mutex<CursorStore>,
}

impl ResponsePlanner {
    pub fn new(catalog: PromptCatalog) -> Self {
        Self {
            catalog,
            cursors: Mutex::new(CursorStore::new()),
        }
    }

    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }

    pub fn select_variant(&self, name: &str) -> Result<Variant, PlannerError> {
        let variants = self.variants(name)?;
        let index = self
            .cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .advance(name, variants.len());
        Ok(variants[index].clone())
    }

    fn variants(&self, name: &str) -> Result<&[Variant], PlannerError> {
        self.catalog
            .variants(name)
            .ok_or_else(|| PlannerError::UnknownPrompt(name.to_string()))
    }

    /// Picks by explicit index when given, otherwise by cursor.
    fn resolve(&self, name: &str, index: Option<usize>) -> Result<Variant, PlannerError> {
        match index {
            None => self.select_variant(name),
            Some(index) => self
                .variants(name)?
                .get(index)
                .cloned()
                .ok_or_else(|| PlannerError::VariantOutOfRange {
                    name: name.to_string(),
                    index,
                }),
        }
    }

    pub fn render(&self, name: &str, index: Option<usize>) -> Result<String, PlannerError> {
        let variant = self.resolve(name, index)?;
        let speech = ssml::to_speech(variant.text());
        debug!(prompt = name, %speech, "Rendered prompt");
        Ok(speech)
    }

    pub fn render_with_delay(
        &self,
        name: &str,
        index: Option<usize>,
    ) -> Result<TimedSpeech, PlannerError> {
        let variant = self.resolve(name, index)?;
        let delay = variant
            .delay()
            .ok_or_else(|| PlannerError::MissingDelay(name.to_string()))?;
        Ok(TimedSpeech {
            speech: ssml::to_speech(variant.text()),
            delay: scale(delay),
        })
    }

    fn select_timed(&self, name: &str) -> Result<(String, Duration), PlannerError> {
        let variant = self.select_variant(name)?;
        let delay = variant
            .delay()
            .ok_or_else(|| PlannerError::MissingDelay(name.to_string()))?;
        Ok((variant.text().to_string(), delay))
    }

    /// Greeting, countdown to the shutter and the approval question in one
    /// utterance. The delay runs to the shutter sound and excludes the
    /// question.
    pub fn render_welcome(&self) -> Result<TimedSpeech, PlannerError> {
        let (greeting, greeting_delay) = self.select_timed(WELCOME)?;
        let (capture, capture_delay) = self.select_timed(TAKE_PICTURE)?;
        let inquiry = self.select_variant(APPROVAL_INQUIRY)?;

        let text = format!(
            "{greeting}{WELCOME_JOINER}{capture}{CAPTURE_JOINER}{}",
            inquiry.text()
        );
        let delay = scale(greeting_delay + capture_delay + WELCOME_DELAY_OFFSET);
        debug!(delay_ms = delay.as_millis() as u64, "Rendered welcome");
        Ok(TimedSpeech {
            speech: ssml::to_speech(&text),
            delay,
        })
    }

    pub fn render_take_picture(&self) -> Result<TimedSpeech, PlannerError> {
        self.render_capture(APPROVAL_INQUIRY)
    }

    /// Same countdown as [`Self::render_take_picture`], but the closing
    /// question warns that this is the final retake.
    pub fn render_last_chance_picture(&self) -> Result<TimedSpeech, PlannerError> {
        self.render_capture(LAST_CHANCE_INQUIRY)
    }

    fn render_capture(&self, inquiry_prompt: &str) -> Result<TimedSpeech, PlannerError> {
        let (capture, capture_delay) = self.select_timed(TAKE_PICTURE)?;
        let inquiry = self.select_variant(inquiry_prompt)?;
        let text = format!("{capture}{CAPTURE_JOINER}{}", inquiry.text());
        Ok(TimedSpeech {
            speech: ssml::to_speech(&text),
            delay: scale(capture_delay),
        })
    }
}

fn scale(delay: Duration) -> Duration {
    delay.mul_f64(GENERAL_DELAY_ADJUST)
}
