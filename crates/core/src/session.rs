//! Per-turn view of a conversation as the assistant platform reports it.

use crate::dialogue::DialogueState;
use serde::{Deserialize, Serialize};

/// Number of turns a freshly armed context survives.
pub const CONTEXT_LIFESPAN: u32 = 3;

pub const PICTURE_TAKEN: &str = "picture_taken";
pub const PICTURE_TAKEN_FOLLOWUP: &str = "intro_and_take_picture-followup";
pub const PICTURE_CHOSEN_FOLLOWUP: &str = "intro_and_take_picture-yes-followup";
pub const PICTURE_STYLE_DONE: &str = "picture_styled";

/// A named context and the number of turns it has left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueContext {
    pub name: String,
    pub lifespan: u32,
}

impl DialogueContext {
    pub fn armed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            lifespan: CONTEXT_LIFESPAN,
        }
    }
}

/// Free-form payload the platform hands back unchanged on the next turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionData {
    pub state: DialogueState,
    pub retake_count: u32,
}

/// Everything a handler may read about the current turn.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub user_id: Option<String>,
    pub contexts: Vec<DialogueContext>,
    pub data: SessionData,
}

impl Conversation {
    pub fn context_lifespan(&self, name: &str) -> Option<u32> {
        self.contexts
            .iter()
            .find(|context| context.name == name)
            .map(|context| context.lifespan)
    }
}
