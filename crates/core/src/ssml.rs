//! Speech-markup helpers shared by every rendered prompt.
//!
//! Catalog text is written as plain sentences. Before it is handed to the
//! assistant platform it goes through three stages: punctuation becomes
//! pauses, `**cue**` tokens become audio tags, and the result is wrapped in a
//! single `<speak>` element.

pub const SPEAK_OPEN: &str = "<speak>";
pub const SPEAK_CLOSE: &str = "</speak>";
pub const SHORT_BREAK: &str = r#"<break time="0.5s"/>"#;
pub const MEDIUM_BREAK: &str = r#"<break time="1s"/>"#;

const ELLIPSIS: &str = "...";
const SHORT_PAUSE_MARKS: [&str; 5] = [".", ",", "!", ";", ":"];

/// A `**name**` placeholder and the audio tag it expands to.
#[derive(Debug, Clone, Copy)]
pub struct SoundCue {
    pub token: &'static str,
    pub markup: &'static str,
}

pub const SHUTTER: SoundCue = SoundCue {
    token: "**shutter**",
    markup: r#"<audio src="https://storage.googleapis.com/smart-photobooth-93105.appspot.com/sounds/shutter.mp3" />"#,
};
pub const DIAL_UP: SoundCue = SoundCue {
    token: "**dialup**",
    markup: r#"<audio src="https://storage.googleapis.com/smart-photobooth-93105.appspot.com/sounds/DialUp.mp3" />"#,
};
pub const BOING: SoundCue = SoundCue {
    token: "**boing**",
    markup: r#"<audio src="https://actions.google.com/sounds/v1/cartoon/cartoon_boing.ogg" />"#,
};
pub const RUSTLING: SoundCue = SoundCue {
    token: "**rustling**",
    markup: r#"<audio src="https://actions.google.com/sounds/v1/household/bacon_out_of_package.ogg" />"#,
};

/// Expansion order matters only if one token contained another; none do.
pub const SOUND_CUES: [SoundCue; 4] = [SHUTTER, DIAL_UP, BOING, RUSTLING];

/// Replaces an ellipsis with a medium pause, then every remaining sentence
/// mark with a short pause.
///
/// Each mark is handled on its own pass, so a sentence with both `.` and `,`
/// gets one pause per occurrence of each.
pub fn punctuation_to_breaks(text: &str) -> String {
    let mut out = text.replace(ELLIPSIS, MEDIUM_BREAK);
    for mark in SHORT_PAUSE_MARKS {
        out = out.replace(mark, SHORT_BREAK);
    }
    out
}

pub fn expand_sound_cues(text: &str) -> String {
    SOUND_CUES
        .iter()
        .fold(text.to_string(), |acc, cue| acc.replace(cue.token, cue.markup))
}

pub fn wrap(text: &str) -> String {
    format!("{SPEAK_OPEN}{text}{SPEAK_CLOSE}")
}

/// Full pipeline: pauses, sound cues, wrapper.
///
/// Punctuation runs before cue expansion so the URLs inside audio tags are
/// left intact.
pub fn to_speech(text: &str) -> String {
    wrap(&expand_sound_cues(&punctuation_to_breaks(text)))
}

/// Joins already wrapped fragments into one `<speak>` document by dropping
/// every inner `</speak><speak>` boundary.
pub fn stitch<S: AsRef<str>>(fragments: &[S]) -> String {
    let joined: String = fragments.iter().map(AsRef::as_ref).collect();
    joined.replace(&format!("{SPEAK_CLOSE}{SPEAK_OPEN}"), "")
}
