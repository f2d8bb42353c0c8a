use crate::catalog::CatalogError;
use crate::dialogue::{DialogueState, Intent, Transition, transition};
use crate::planner::{
    APPROVAL_INQUIRY, LAST_CHANCE_INQUIRY, PlannerError, ResponsePlanner, TAKE_PICTURE, WELCOME,
};
use crate::session::{Conversation, DialogueContext, PICTURE_TAKEN, SessionData};
use crate::ssml;
use crate::{Command, ScheduledCommand};
use std::str::FromStr;
use tracing::{info, warn};

pub const NOT_IN_PHOTOBOOTH: &str = "NOT_IN_PHOTOBOOTH";
pub const TOO_MANY_PICTURES: &str = "TOO_MANY_PICTURES";
pub const STYLE_INQUIRY: &str = "STYLE_INQUIRY";
pub const STYLE_STALLING: &str = "STYLE_STALLING";
pub const SELECT_PHOTO_INQUIRY: &str = "SELECT_PHOTO_INQUIRY";
pub const SHARE_PHOTO_INQUIRY: &str = "SHARE_PHOTO_INQUIRY";
pub const SELECTING_PHOTO: &str = "SELECTING_PHOTO";
pub const END: &str = "END";
pub const FALLBACK_GENERAL: &str = "FALLBACK_GENERAL";
pub const FALLBACK_FINAL: &str = "FALLBACK_FINAL";
pub const HELP: &str = "HELP";
pub const ABOUT: &str = "ABOUT";
pub const EASTER_EGGS: &str = "EASTER_EGGS";

/// Every prompt some handler may ask the planner for.
pub const REQUIRED_PROMPTS: [&str; 17] = [
    WELCOME,
    TAKE_PICTURE,
    APPROVAL_INQUIRY,
    LAST_CHANCE_INQUIRY,
    NOT_IN_PHOTOBOOTH,
    TOO_MANY_PICTURES,
    STYLE_INQUIRY,
    STYLE_STALLING,
    SELECT_PHOTO_INQUIRY,
    SHARE_PHOTO_INQUIRY,
    SELECTING_PHOTO,
    END,
    FALLBACK_GENERAL,
    FALLBACK_FINAL,
    HELP,
    ABOUT,
    EASTER_EGGS,
];

/// The retake that gets the "last chance" wording.
pub const LAST_CHANCE_RETAKE: u32 = 5;
/// The retake that ends the session instead.
pub const MAX_RETAKES: u32 = 6;

/// Which booth firmware the dialogue drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowVariant {
    /// Print-only booth.
    #[default]
    Standard,
    /// Booth that can also upload the picture for sharing.
    ShareEnabled,
}

impl FlowVariant {
    fn reset_command(self) -> Command {
        match self {
            FlowVariant::Standard => Command::StartOver,
            FlowVariant::ShareEnabled => Command::Preview,
        }
    }

    fn accept_command(self) -> Command {
        match self {
            FlowVariant::Standard => Command::Finish,
            FlowVariant::ShareEnabled => Command::FinishAndShare,
        }
    }

    fn inquiry_prompt(self) -> &'static str {
        match self {
            FlowVariant::Standard => SELECT_PHOTO_INQUIRY,
            FlowVariant::ShareEnabled => SHARE_PHOTO_INQUIRY,
        }
    }
}

impl FromStr for FlowVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(FlowVariant::Standard),
            "share" => Ok(FlowVariant::ShareEnabled),
            other => Err(format!("'{other}' is not a flow variant (standard, share)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Speak and keep the microphone open.
    Ask,
    /// Speak and close the conversation.
    Tell,
}

/// What a handler wants the platform and the booth to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub directive: Directive,
    pub speech: String,
    pub contexts: Vec<DialogueContext>,
    pub data: SessionData,
    pub commands: Vec<ScheduledCommand>,
}

impl Reply {
    fn ask(speech: String, data: SessionData) -> Self {
        Self::new(Directive::Ask, speech, data)
    }

    fn tell(speech: String, data: SessionData) -> Self {
        Self::new(Directive::Tell, speech, data)
    }

    fn new(directive: Directive, speech: String, data: SessionData) -> Self {
        Self {
            directive,
            speech,
            contexts: Vec::new(),
            data,
            commands: Vec::new(),
        }
    }

    /// Arms the contexts that belong to the reply's state.
    fn arm_for_state(mut self) -> Self {
        self.contexts = self
            .data
            .state
            .contexts()
            .iter()
            .map(|name| DialogueContext::armed(name))
            .collect();
        self
    }

    fn arm(mut self, name: &str) -> Self {
        self.contexts.push(DialogueContext::armed(name));
        self
    }

    fn command(mut self, command: ScheduledCommand) -> Self {
        self.commands.push(command);
        self
    }

    pub fn expects_user_response(&self) -> bool {
        self.directive == Directive::Ask
    }
}

/// Turns an intent plus the conversation so far into a reply.
///
/// The controller holds no per-session state; everything it needs comes in
/// with the [`Conversation`] and goes back out in the [`Reply`].
pub struct DialogueController {
    planner: ResponsePlanner,
    booth_id: String,
    flow: FlowVariant,
}

impl DialogueController {
    pub fn new(
        planner: ResponsePlanner,
        booth_id: String,
        flow: FlowVariant,
    ) -> Result<Self, CatalogError> {
        planner.catalog().require(&REQUIRED_PROMPTS)?;
        Ok(Self {
            planner,
            booth_id,
            flow,
        })
    }

    pub fn flow(&self) -> FlowVariant {
        self.flow
    }

    pub fn handle(
        &self,
        intent: Intent,
        conversation: &Conversation,
    ) -> Result<Reply, PlannerError> {
        let mut data = conversation.data.clone();
        if data.state.is_terminal() {
            data = SessionData::default();
        }
        info!(action = intent.action(), state = ?data.state, "Handling intent");

        if transition(data.state, intent) == Transition::Reject {
            warn!(
                action = intent.action(),
                state = ?data.state,
                "Intent does not fit the dialogue state, answering with fallback"
            );
            return self.fallback(conversation, data);
        }

        match intent {
            Intent::Start => self.start(conversation, data),
            Intent::PictureDenied => self.take_picture(data),
            Intent::PictureApproved => self.style_picture_inquiry(data),
            Intent::StylePictureApproved => self.share_photo_inquiry_stall(data),
            Intent::StylePictureDenied => self.share_photo_inquiry(data),
            Intent::PictureUploadApproved => self.photo_selected(data, self.flow.accept_command()),
            Intent::PictureUploadDenied => self.decline(data),
            Intent::FallbackGeneral => self.fallback(conversation, data),
            Intent::StartOver => self.restart(data),
            Intent::Cancel => self.end(data),
            Intent::Help => self.canned(HELP, data),
            Intent::About => self.canned(ABOUT, data),
            Intent::EasterEgg => self.canned(EASTER_EGGS, data),
        }
    }

    /// Welcome. Only the booth's own account may start a session.
    pub fn start(
        &self,
        conversation: &Conversation,
        data: SessionData,
    ) -> Result<Reply, PlannerError> {
        info!(user_id = ?conversation.user_id, "Welcome requested");
        if conversation.user_id.as_deref() != Some(self.booth_id.as_str()) {
            warn!(user_id = ?conversation.user_id, "Caller is not the photobooth, refusing");
            let speech = self.planner.render(NOT_IN_PHOTOBOOTH, None)?;
            return Ok(Reply::tell(speech, data));
        }
        self.welcome(data)
    }

    /// Start over from anywhere. No identity check: only an ongoing session
    /// can reach it.
    pub fn restart(&self, data: SessionData) -> Result<Reply, PlannerError> {
        info!("Restart requested");
        let reply = self.welcome(data)?;
        let reset = ScheduledCommand::now(self.flow.reset_command());
        Ok(Reply {
            commands: std::iter::once(reset).chain(reply.commands).collect(),
            ..reply
        })
    }

    fn welcome(&self, mut data: SessionData) -> Result<Reply, PlannerError> {
        let welcome = self.planner.render_welcome()?;
        data.state = DialogueState::AwaitingApproval;
        data.retake_count = 0;
        info!(delay_ms = welcome.delay.as_millis() as u64, "Capture scheduled after welcome");
        Ok(Reply::ask(welcome.speech, data)
            .arm_for_state()
            .command(ScheduledCommand::after(Command::Capture, welcome.delay)))
    }

    /// The user did not like the picture: take another one, up to the limit.
    pub fn take_picture(&self, mut data: SessionData) -> Result<Reply, PlannerError> {
        data.retake_count += 1;
        info!(retake = data.retake_count, "Retake requested");

        if data.retake_count >= MAX_RETAKES {
            data.state = DialogueState::Abandoned;
            let speech = self.planner.render(TOO_MANY_PICTURES, None)?;
            return Ok(Reply::tell(speech, data));
        }

        let capture = if data.retake_count == LAST_CHANCE_RETAKE {
            self.planner.render_last_chance_picture()?
        } else {
            self.planner.render_take_picture()?
        };
        data.state = DialogueState::AwaitingApproval;
        Ok(Reply::ask(capture.speech, data)
            .arm_for_state()
            .command(ScheduledCommand::now(self.flow.reset_command()))
            .command(ScheduledCommand::after(Command::Capture, capture.delay)))
    }

    pub fn style_picture_inquiry(&self, mut data: SessionData) -> Result<Reply, PlannerError> {
        data.state = DialogueState::AwaitingStyleChoice;
        let speech = self.planner.render(STYLE_INQUIRY, None)?;
        Ok(Reply::ask(speech, data).arm_for_state())
    }

    /// Styling takes a while on the booth, so fill the silence before asking
    /// about the result.
    pub fn share_photo_inquiry_stall(&self, mut data: SessionData) -> Result<Reply, PlannerError> {
        data.state = DialogueState::AwaitingShareChoice;
        let speech = ssml::stitch(&[
            self.planner.render(STYLE_STALLING, None)?,
            self.planner.render(self.flow.inquiry_prompt(), None)?,
        ]);
        Ok(Reply::ask(speech, data)
            .arm_for_state()
            .command(ScheduledCommand::now(Command::Style)))
    }

    pub fn share_photo_inquiry(&self, mut data: SessionData) -> Result<Reply, PlannerError> {
        data.state = DialogueState::AwaitingShareChoice;
        let speech = self.planner.render(self.flow.inquiry_prompt(), None)?;
        Ok(Reply::ask(speech, data).arm_for_state())
    }

    pub fn photo_selected(
        &self,
        mut data: SessionData,
        command: Command,
    ) -> Result<Reply, PlannerError> {
        data.state = DialogueState::Ended;
        let speech = ssml::stitch(&[
            self.planner.render(SELECTING_PHOTO, None)?,
            self.planner.render(END, None)?,
        ]);
        Ok(Reply::tell(speech, data).command(ScheduledCommand::now(command)))
    }

    /// A print-only booth says goodbye; a sharing booth still prints, it just
    /// does not upload.
    pub fn decline(&self, data: SessionData) -> Result<Reply, PlannerError> {
        match self.flow {
            FlowVariant::Standard => self.end(data),
            FlowVariant::ShareEnabled => self.photo_selected(data, Command::Finish),
        }
    }

    pub fn end(&self, mut data: SessionData) -> Result<Reply, PlannerError> {
        data.state = DialogueState::Ended;
        let speech = self.planner.render(END, None)?;
        Ok(Reply::tell(speech, data))
    }

    /// Re-prompts while the fallback budget lasts, then gives up.
    pub fn fallback(
        &self,
        conversation: &Conversation,
        mut data: SessionData,
    ) -> Result<Reply, PlannerError> {
        let remaining = conversation.context_lifespan(PICTURE_TAKEN).unwrap_or(0);
        if remaining == 0 {
            info!("Fallback budget exhausted, closing session");
            data.state = DialogueState::Ended;
            let speech = self.planner.render(FALLBACK_FINAL, None)?;
            return Ok(Reply::tell(speech, data));
        }
        info!(remaining, "General fallback");
        let speech = self.planner.render(FALLBACK_GENERAL, None)?;
        Ok(Reply::ask(speech, data))
    }

    fn canned(&self, prompt: &str, data: SessionData) -> Result<Reply, PlannerError> {
        let speech = self.planner.render(prompt, None)?;
        Ok(Reply::ask(speech, data).arm(PICTURE_TAKEN))
    }
}
