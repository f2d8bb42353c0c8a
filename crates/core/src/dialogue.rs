use crate::session::{
    PICTURE_CHOSEN_FOLLOWUP, PICTURE_STYLE_DONE, PICTURE_TAKEN, PICTURE_TAKEN_FOLLOWUP,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Where a conversation stands in the booth flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    #[default]
    Idle,
    /// A picture was just taken and the user is asked whether they like it.
    AwaitingApproval,
    AwaitingStyleChoice,
    AwaitingShareChoice,
    Ended,
    /// The user asked for too many retakes.
    Abandoned,
}

impl DialogueState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DialogueState::Ended | DialogueState::Abandoned)
    }

    /// Contexts to arm on entering this state. Each one keeps the matching
    /// follow-up intents reachable on the platform side.
    pub fn contexts(self) -> &'static [&'static str] {
        match self {
            DialogueState::AwaitingApproval => &[PICTURE_TAKEN, PICTURE_TAKEN_FOLLOWUP],
            DialogueState::AwaitingStyleChoice => &[
                PICTURE_TAKEN,
                PICTURE_TAKEN_FOLLOWUP,
                PICTURE_CHOSEN_FOLLOWUP,
            ],
            DialogueState::AwaitingShareChoice => &[
                PICTURE_TAKEN,
                PICTURE_TAKEN_FOLLOWUP,
                PICTURE_CHOSEN_FOLLOWUP,
                PICTURE_STYLE_DONE,
            ],
            DialogueState::Idle | DialogueState::Ended | DialogueState::Abandoned => &[],
        }
    }
}

/// Actions the platform's intent classifier can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Start,
    PictureDenied,
    PictureApproved,
    StylePictureApproved,
    StylePictureDenied,
    PictureUploadApproved,
    PictureUploadDenied,
    FallbackGeneral,
    StartOver,
    Cancel,
    Help,
    About,
    EasterEgg,
}

impl Intent {
    pub const ALL: [Intent; 13] = [
        Intent::Start,
        Intent::PictureDenied,
        Intent::PictureApproved,
        Intent::StylePictureApproved,
        Intent::StylePictureDenied,
        Intent::PictureUploadApproved,
        Intent::PictureUploadDenied,
        Intent::FallbackGeneral,
        Intent::StartOver,
        Intent::Cancel,
        Intent::Help,
        Intent::About,
        Intent::EasterEgg,
    ];

    pub fn action(self) -> &'static str {
        match self {
            Intent::Start => "start",
            Intent::PictureDenied => "picture_denied",
            Intent::PictureApproved => "picture_approved",
            Intent::StylePictureApproved => "style_picture_approved",
            Intent::StylePictureDenied => "style_picture_denied",
            Intent::PictureUploadApproved => "picture_upload_approved",
            Intent::PictureUploadDenied => "picture_upload_denied",
            Intent::FallbackGeneral => "fallback_general",
            Intent::StartOver => "start_over",
            Intent::Cancel => "cancel",
            Intent::Help => "help",
            Intent::About => "about",
            Intent::EasterEgg => "easter_egg",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Intent {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.action() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Outcome of looking an intent up in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The intent is valid here and leads to this state.
    To(DialogueState),
    /// The intent is valid anywhere and leaves the state as it is.
    Stay,
    /// The intent makes no sense here; answer with the fallback.
    Reject,
}

/// The booth flow as an explicit table.
///
/// The retake limit is not part of the table: the controller moves to
/// `Abandoned` itself when the counter runs out.
pub fn transition(state: DialogueState, intent: Intent) -> Transition {
    use DialogueState::*;
    use Intent::*;

    match (state, intent) {
        (_, Start | StartOver) => Transition::To(AwaitingApproval),
        (_, Cancel) => Transition::To(Ended),
        (_, Help | About | EasterEgg | FallbackGeneral) => Transition::Stay,
        (AwaitingApproval, PictureDenied) => Transition::To(AwaitingApproval),
        (AwaitingApproval, PictureApproved) => Transition::To(AwaitingStyleChoice),
        (AwaitingStyleChoice, StylePictureApproved | StylePictureDenied) => {
            Transition::To(AwaitingShareChoice)
        }
        (AwaitingShareChoice, PictureUploadApproved | PictureUploadDenied) => {
            Transition::To(Ended)
        }
        _ => Transition::Reject,
    }
}
