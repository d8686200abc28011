//! The interactive review loop.
//!
//! A [`Session`] pulls chunks from the engine, sends each one to the
//! analysis service inside a fresh transcript, shows the reply, and asks the
//! user whether to continue, stop, or ask a follow-up question about the
//! current chunk. Only the cost total survives from one chunk to the next.

use std::io::{BufRead, Write};

use tracing::{debug, info};

use crate::client::{ChatBackend, Message};
use crate::engine::{Chunk, Engine, TraversalState};
use crate::errors::RedpenError;
use crate::output::{position_line, usage_line, wrap_text, DEFAULT_WIDTH};
use crate::pricing::CostLedger;
use crate::review::{fresh_transcript, ReviewMode, DEFAULT_TOPIC};

const CONTINUE_PROMPT: &str = "Continue with feedback Y/N/Q (Q is for a query): ";
const QUERY_PROMPT: &str = "Enter your query: ";
const INVALID_CHOICE: &str = "You have to choose Yes or No or Query";

/// What the user chose after a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop,
    Query(String),
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every document was reviewed.
    Finished,
    /// The user chose to stop.
    Stopped,
}

/// Presentation settings for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub topic: String,
    pub mode: ReviewMode,
    /// Wrap column for feedback.
    pub width: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            mode: ReviewMode::default(),
            width: DEFAULT_WIDTH,
        }
    }
}

/// One end-to-end review run.
pub struct Session<B, R, W> {
    engine: Engine,
    state: Option<TraversalState>,
    backend: B,
    ledger: CostLedger,
    transcript: Vec<Message>,
    config: SessionConfig,
    input: R,
    output: W,
    rounds: usize,
}

impl<B, R, W> Session<B, R, W>
where
    B: ChatBackend,
    R: BufRead,
    W: Write,
{
    pub fn new(
        engine: Engine,
        state: TraversalState,
        backend: B,
        ledger: CostLedger,
        config: SessionConfig,
        input: R,
        output: W,
    ) -> Self {
        Self {
            engine,
            state: Some(state),
            backend,
            ledger,
            transcript: Vec::new(),
            config,
            input,
            output,
            rounds: 0,
        }
    }

    pub fn total_cost(&self) -> f64 {
        self.ledger.total()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Where the next round would start, if anything is left.
    pub fn state(&self) -> Option<&TraversalState> {
        self.state.as_ref()
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Drive rounds until the tree is exhausted or the user stops.
    pub fn run(&mut self) -> Result<Outcome, RedpenError> {
        while let Some(state) = self.state.take() {
            let chunk = self.engine.next_chunk(state)?;
            if chunk.lines_emitted == 0 {
                // markers only, nothing to review
                debug!(partial = chunk.partial, "skipping chunk without content lines");
                if !chunk.partial {
                    writeln!(self.output, "Finished text")?;
                    return Ok(Outcome::Finished);
                }
                self.state = Some(chunk.state);
                continue;
            }
            self.rounds += 1;
            info!(
                round = self.rounds,
                lines = chunk.lines_emitted,
                units = chunk.units,
                partial = chunk.partial,
                "reviewing chunk"
            );

            if self.review_chunk(&chunk)? == Outcome::Stopped {
                return Ok(Outcome::Stopped);
            }
            if !chunk.partial {
                writeln!(self.output, "Finished text")?;
                return Ok(Outcome::Finished);
            }
            self.state = Some(chunk.state);
        }
        Ok(Outcome::Finished)
    }

    fn review_chunk(&mut self, chunk: &Chunk) -> Result<Outcome, RedpenError> {
        // Each chunk starts a new conversation
        self.transcript = fresh_transcript(&chunk.body, &self.config.topic, self.config.mode);
        self.exchange()?;
        writeln!(self.output, "{}", position_line(chunk))?;

        loop {
            match self.decide()? {
                Decision::Continue => break,
                Decision::Stop => return Ok(Outcome::Stopped),
                Decision::Query(query) => {
                    debug!(round = self.rounds, "follow-up query");
                    self.transcript.push(Message::user(query));
                    self.exchange()?;
                }
            }
        }
        writeln!(self.output, "\n\n")?;
        Ok(Outcome::Finished)
    }

    /// Send the transcript, show and record the reply.
    fn exchange(&mut self) -> Result<(), RedpenError> {
        let completion = self.backend.complete(&self.transcript)?;
        writeln!(
            self.output,
            "{}",
            wrap_text(&completion.content, self.config.width)
        )?;

        let cost = self.ledger.record(&completion.usage)?;
        writeln!(
            self.output,
            "{}",
            usage_line(completion.usage.total_tokens, cost, self.ledger.total())
        )?;
        self.transcript.push(Message::assistant(completion.content));
        Ok(())
    }

    /// Ask until the user gives a valid answer. End of input means stop.
    fn decide(&mut self) -> Result<Decision, RedpenError> {
        loop {
            let Some(pick) = self.prompt(CONTINUE_PROMPT)? else {
                return Ok(Decision::Stop);
            };
            match pick.to_lowercase().as_str() {
                "y" => return Ok(Decision::Continue),
                "n" => return Ok(Decision::Stop),
                "q" => {
                    let Some(query) = self.prompt(QUERY_PROMPT)? else {
                        return Ok(Decision::Stop);
                    };
                    if query.is_empty() {
                        writeln!(self.output, "{}", INVALID_CHOICE)?;
                        continue;
                    }
                    return Ok(Decision::Query(query));
                }
                _ => writeln!(self.output, "{}", INVALID_CHOICE)?,
            }
        }
    }

    fn prompt(&mut self, text: &str) -> Result<Option<String>, RedpenError> {
        write!(self.output, "{}", text)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Completion, Role, Usage};
    use crate::engine::EngineOptions;
    use crate::pricing::PriceTable;
    use std::cell::RefCell;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// Replies "- L<n>: ok" and remembers every transcript it saw.
    struct ScriptedBackend {
        seen: RefCell<Vec<Vec<Message>>>,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self {
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn complete(&self, messages: &[Message]) -> Result<Completion, RedpenError> {
            self.seen.borrow_mut().push(messages.to_vec());
            Ok(Completion {
                content: format!("- L{}: ok", self.seen.borrow().len()),
                usage: Usage {
                    prompt_tokens: 1000,
                    completion_tokens: 0,
                    total_tokens: 1000,
                },
            })
        }
    }

    fn thesis(dir: &TempDir) -> TraversalState {
        let root = dir.path().join("main.tex");
        fs::write(&root, "first sentence\nsecond sentence\nthird sentence\n").unwrap();
        TraversalState::new(root)
    }

    fn engine(max_tokens: usize) -> Engine {
        Engine::new(EngineOptions {
            max_tokens,
            ..Default::default()
        })
    }

    fn ledger(model: &str) -> CostLedger {
        CostLedger::new(model, PriceTable::default())
    }

    #[test]
    fn test_runs_to_completion() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new();
        let mut output = Vec::new();

        let mut session = Session::new(
            engine(0),
            thesis(&dir),
            &backend,
            ledger("gpt-4o"),
            SessionConfig::default(),
            Cursor::new("y\ny\ny\ny\n"),
            &mut output,
        );
        let outcome = session.run().unwrap();

        assert_eq!(outcome, Outcome::Finished);
        // the trailing chunk holds only the finish marker and is not sent
        assert_eq!(session.rounds(), 3);
        assert_eq!(backend.seen.borrow().len(), 3);
        assert!(session.state().is_none());
        assert!((session.total_cost() - 3.0 * 0.0025).abs() < 1e-9);

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Finished text"));
        assert!(text.contains("final line was:"));
    }

    #[test]
    fn test_comment_only_document_is_never_sent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("notes.tex");
        fs::write(&root, "% only notes\n\n").unwrap();
        let backend = ScriptedBackend::new();
        let mut output = Vec::new();

        let mut session = Session::new(
            engine(0),
            TraversalState::new(root),
            &backend,
            ledger("gpt-4o"),
            SessionConfig::default(),
            Cursor::new(""),
            &mut output,
        );
        assert_eq!(session.run().unwrap(), Outcome::Finished);
        assert_eq!(session.rounds(), 0);
        assert!(backend.seen.borrow().is_empty());
        assert_eq!(String::from_utf8(output).unwrap(), "Finished text\n");
    }

    #[test]
    fn test_fresh_transcript_per_chunk() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new();

        let mut session = Session::new(
            engine(0),
            thesis(&dir),
            &backend,
            ledger("gpt-4o"),
            SessionConfig::default(),
            Cursor::new("y\nn\n"),
            Vec::new(),
        );
        assert_eq!(session.run().unwrap(), Outcome::Stopped);

        let seen = backend.seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].len(), 1);
        assert!(seen[1][0].content.contains("L2\tsecond sentence"));
        assert!(!seen[1][0].content.contains("L1\tfirst sentence"));
    }

    #[test]
    fn test_follow_up_queries_extend_transcript() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new();

        let mut session = Session::new(
            engine(10_000),
            thesis(&dir),
            &backend,
            ledger("gpt-4o"),
            SessionConfig::default(),
            Cursor::new("q\nWhy line 2?\nq\nAnd line 3?\ny\n"),
            Vec::new(),
        );
        assert_eq!(session.run().unwrap(), Outcome::Finished);

        let roles: Vec<Role> = session.transcript().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant
            ]
        );
        assert_eq!(session.transcript()[2].content, "Why line 2?");
        assert_eq!(backend.seen.borrow().len(), 3);
    }

    #[test]
    fn test_invalid_input_reprompts() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new();
        let mut output = Vec::new();

        let mut session = Session::new(
            engine(10_000),
            thesis(&dir),
            &backend,
            ledger("gpt-4o"),
            SessionConfig::default(),
            Cursor::new("maybe\nY\n"),
            &mut output,
        );
        assert_eq!(session.run().unwrap(), Outcome::Finished);

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches(INVALID_CHOICE).count(), 1);
        assert_eq!(text.matches(CONTINUE_PROMPT).count(), 2);
    }

    #[test]
    fn test_end_of_input_stops() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new();

        let mut session = Session::new(
            engine(0),
            thesis(&dir),
            &backend,
            ledger("gpt-4o"),
            SessionConfig::default(),
            Cursor::new(""),
            Vec::new(),
        );
        assert_eq!(session.run().unwrap(), Outcome::Stopped);
        assert_eq!(session.rounds(), 1);
    }

    #[test]
    fn test_unknown_pricing_tier_is_fatal() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new();

        let mut session = Session::new(
            engine(10_000),
            thesis(&dir),
            &backend,
            ledger("unpriced-model"),
            SessionConfig::default(),
            Cursor::new("y\n"),
            Vec::new(),
        );
        let err = session.run().unwrap_err();
        assert!(matches!(err, RedpenError::UnknownPricingTier { .. }));
        assert_eq!(session.total_cost(), 0.0);
    }

    #[test]
    fn test_reviewer2_mode_seeds_every_chunk() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new();
        let config = SessionConfig {
            mode: ReviewMode::Reviewer2,
            ..Default::default()
        };

        let mut session = Session::new(
            engine(0),
            thesis(&dir),
            &backend,
            ledger("gpt-4o"),
            config,
            Cursor::new("y\nn\n"),
            Vec::new(),
        );
        session.run().unwrap();

        for transcript in backend.seen.borrow().iter() {
            assert_eq!(transcript[0].role, Role::Assistant);
            assert_eq!(transcript[1].role, Role::User);
        }
    }
}
