//! Review modes and the framing sent alongside each chunk.

use serde::Serialize;

use crate::client::Message;
use crate::errors::RedpenError;

/// Default subject used in the framing instructions.
pub const DEFAULT_TOPIC: &str = "the subject of the document";

const HARSH_INSTRUCTIONS: &str = "\
Be blunt and uncompromising. Do not soften criticism or pad it with praise.
Point out every unclear sentence, unsupported claim and sloppy phrasing.";

const REVIEWER2_OPENING: &str = "\
I am Reviewer 2. I have read a great many theses and I am rarely impressed. \
Send me the text and I will tell you, line by line, everything that is wrong with it.";

/// Tone of the requested feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewMode {
    /// Plain writing-quality feedback.
    #[default]
    Default,
    /// Adds instructions for blunt criticism.
    Harsh,
    /// Harsh, and the transcript opens with a scripted reviewer persona.
    Reviewer2,
}

impl ReviewMode {
    pub fn all() -> &'static [ReviewMode] {
        &[ReviewMode::Default, ReviewMode::Harsh, ReviewMode::Reviewer2]
    }

    /// Extra instructions appended to each chunk request.
    pub fn modifier(&self) -> Option<&'static str> {
        match self {
            ReviewMode::Default => None,
            ReviewMode::Harsh | ReviewMode::Reviewer2 => Some(HARSH_INSTRUCTIONS),
        }
    }

    /// Messages that open every fresh transcript.
    pub fn seed(&self) -> Vec<Message> {
        match self {
            ReviewMode::Reviewer2 => vec![Message::assistant(REVIEWER2_OPENING)],
            ReviewMode::Default | ReviewMode::Harsh => Vec::new(),
        }
    }
}

impl std::fmt::Display for ReviewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewMode::Default => write!(f, "default"),
            ReviewMode::Harsh => write!(f, "harsh"),
            ReviewMode::Reviewer2 => write!(f, "reviewer2"),
        }
    }
}

impl std::str::FromStr for ReviewMode {
    type Err = RedpenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(ReviewMode::Default),
            "harsh" => Ok(ReviewMode::Harsh),
            "reviewer2" | "reviewer-2" | "reviewer_2" => Ok(ReviewMode::Reviewer2),
            _ => Err(RedpenError::UnrecognizedMode {
                mode: s.to_string(),
            }),
        }
    }
}

/// Build the user message that carries a chunk.
pub fn chunk_message(body: &str, topic: &str, mode: ReviewMode) -> String {
    let mut message = String::with_capacity(body.len() + 512);
    message.push_str(body);
    message.push_str(&format!(
        "
The above is an excerpt from a thesis about {topic}.
The line number in the LaTeX file is included.
Give feedback on the writing quality and give suggestions.
Be concise, reference line numbers, do not quote large sections of the text.
Format should be like:
- L5: [feedback]
- L30: [feedback]
"
    ));
    if let Some(modifier) = mode.modifier() {
        message.push('\n');
        message.push_str(modifier);
        message.push('\n');
    }
    message
}

/// A fresh transcript for one chunk: the mode's seed followed by the chunk.
pub fn fresh_transcript(body: &str, topic: &str, mode: ReviewMode) -> Vec<Message> {
    let mut transcript = mode.seed();
    transcript.push(Message::user(chunk_message(body, topic, mode)));
    transcript
}
