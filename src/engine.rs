//! Resumable depth-first traversal of an inclusion tree.
//!
//! The open documents form an explicit stack of [`Frame`]s. Each call to
//! [`Engine::next_chunk`] consumes a [`TraversalState`] by value, emits
//! annotated lines until the unit ceiling is passed or the tree runs out, and
//! hands back the state needed to continue. Nothing is kept between calls, so
//! a caller can serialize the state, drop the engine, and pick up later.
//!
//! Each content line is emitted as `L<number>\t<text>`. Inclusion boundaries
//! are marked with `[start <doc>]` and `[finish <doc>]`, and a chunk that
//! begins in the middle of a document opens with `[resume <doc> at L<n>]`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::errors::RedpenError;
use crate::include::{resolve, resolve_path, Directive};
use crate::reader::{ContentLine, LineReader, ReadOptions};
use crate::tokens::{BudgetMeter, DEFAULT_MAX_TOKENS};

/// One open document in the inclusion chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Path of the document.
    pub document: PathBuf,
    /// 0-based index of the next line to read.
    pub resume_line: usize,
}

impl Frame {
    pub fn new(document: impl Into<PathBuf>, resume_line: usize) -> Self {
        Self {
            document: document.into(),
            resume_line,
        }
    }
}

/// The stack of open documents, root first.
///
/// Empty exactly when the whole tree has been consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalState {
    frames: SmallVec<[Frame; 4]>,
}

impl TraversalState {
    /// Start at the top of `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::at(root, 0)
    }

    /// Start `root` at a 0-based line index.
    pub fn at(root: impl Into<PathBuf>, resume_line: usize) -> Self {
        let mut frames = SmallVec::new();
        frames.push(Frame::new(root, resume_line));
        Self { frames }
    }

    /// Rebuild a state from frames, root first.
    pub fn from_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// Parse a state previously produced by [`TraversalState::to_json`].
    pub fn from_json(json: &str) -> Result<Self, RedpenError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, RedpenError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn root(&self) -> Option<&Path> {
        self.frames.first().map(|f| f.document.as_path())
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_done(&self) -> bool {
        self.frames.is_empty()
    }

    fn contains(&self, document: &Path) -> bool {
        self.frames.iter().any(|f| same_document(&f.document, document))
    }
}

impl std::fmt::Display for TraversalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.top() {
            Some(top) => write!(f, "{}:{}", top.document.display(), top.resume_line + 1),
            None => write!(f, "<done>"),
        }
    }
}

/// Whether two paths name the same document, comparing canonical forms
/// when the literal paths differ.
pub fn same_document(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// A document position, 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub document: PathBuf,
    pub line: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.document.display(), self.line)
    }
}

/// One bounded unit of traversal output.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Annotated text.
    pub body: String,
    /// More content remains on the stack.
    pub partial: bool,
    /// State to pass to the next call.
    pub state: TraversalState,
    /// Estimated units charged for `body`.
    pub units: usize,
    /// Content lines emitted (markers excluded).
    pub lines_emitted: usize,
    /// Last content line emitted.
    pub last_line: Option<Position>,
    /// Documents read to end of file during this chunk, in order.
    pub finished: Vec<PathBuf>,
}

/// Traversal options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Unit ceiling per chunk.
    pub max_tokens: usize,
    /// Descend into `\input{...}`. When false, directives are ordinary text.
    pub follow_includes: bool,
    pub read: ReadOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            follow_includes: true,
            read: ReadOptions::default(),
        }
    }
}

/// The traversal step function.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: EngineOptions,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Produce the next chunk from `state`.
    ///
    /// At least one content line is emitted before the ceiling is checked,
    /// so every call makes progress.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use redpen::engine::{Engine, TraversalState};
    ///
    /// let engine = Engine::default();
    /// let mut state = TraversalState::new("thesis/main.tex");
    /// loop {
    ///     let chunk = engine.next_chunk(state).unwrap();
    ///     print!("{}", chunk.body);
    ///     if !chunk.partial {
    ///         break;
    ///     }
    ///     state = chunk.state;
    /// }
    /// ```
    pub fn next_chunk(&self, mut state: TraversalState) -> Result<Chunk, RedpenError> {
        let root = state
            .root()
            .map(Path::to_path_buf)
            .ok_or_else(|| RedpenError::InvalidState("traversal already finished".into()))?;
        let mut out = ChunkWriter::new(&root, self.options.max_tokens);
        let mut reader: Option<LineReader> = None;
        let mut opened_any = false;

        loop {
            if state.is_done() {
                debug!(units = out.meter.total(), "traversal done");
                return Ok(out.finish(state));
            }

            // READING: (re)open the top frame when it changed
            if reader.is_none() {
                let top = &state.frames[state.frames.len() - 1];
                if !opened_any {
                    if top.resume_line == 0 {
                        out.marker("start", &top.document);
                    } else {
                        out.resume_marker(top);
                    }
                    opened_any = true;
                }
                trace!(document = %top.document.display(), line = top.resume_line, "open");
                reader = Some(LineReader::open(
                    &top.document,
                    top.resume_line,
                    self.options.read,
                )?);
            }
            let next = match reader.as_mut() {
                Some(lines) => lines.next().transpose()?,
                None => None,
            };

            let Some(line) = next else {
                // ASCEND
                reader = None;
                if let Some(done) = state.frames.pop() {
                    debug!(document = %done.document.display(), depth = state.depth(), "ascend");
                    out.marker("finish", &done.document);
                    out.finished.push(done.document);
                }
                continue;
            };

            match self.classify(&line) {
                Directive::Include(name) => {
                    // DESCEND
                    let target = resolve_path(&root, &name);
                    let current = current_document(&state);
                    if state.contains(&target) {
                        return Err(RedpenError::IncludeCycle {
                            document: current,
                            line: line.number,
                            target,
                        });
                    }
                    set_resume(&mut state, line.index + 1);
                    debug!(from = %current.display(), line = line.number, into = %target.display(), "descend");
                    out.marker("start", &target);
                    state.frames.push(Frame::new(target, 0));
                    reader = None;
                }
                Directive::Malformed => {
                    return Err(RedpenError::MalformedInclusion {
                        document: current_document(&state),
                        line: line.number,
                        directive: line.text.trim().to_string(),
                    });
                }
                Directive::Text => {
                    set_resume(&mut state, line.index + 1);
                    out.line(&current_document(&state), &line);
                }
            }

            // only content lines are metered, so a suspend always follows one
            if out.lines_emitted > 0 && out.meter.exceeded() {
                // SUSPENDED
                debug!(
                    units = out.meter.total(),
                    ceiling = out.meter.ceiling(),
                    at = %state,
                    "suspend"
                );
                return Ok(out.finish(state));
            }
        }
    }

    /// Run the traversal to the end, collecting every chunk.
    pub fn run_to_end(&self, mut state: TraversalState) -> Result<Vec<Chunk>, RedpenError> {
        let mut chunks = Vec::new();
        loop {
            let chunk = self.next_chunk(state)?;
            let partial = chunk.partial;
            state = chunk.state.clone();
            chunks.push(chunk);
            if !partial {
                return Ok(chunks);
            }
        }
    }

    fn classify(&self, line: &ContentLine) -> Directive {
        if !self.options.follow_includes {
            return Directive::Text;
        }
        resolve(&line.text)
    }
}

fn current_document(state: &TraversalState) -> PathBuf {
    state
        .top()
        .map(|f| f.document.clone())
        .unwrap_or_default()
}

fn set_resume(state: &mut TraversalState, resume_line: usize) {
    if let Some(top) = state.frames.last_mut() {
        top.resume_line = resume_line;
    }
}

/// Accumulates the annotated body of one chunk.
struct ChunkWriter {
    base: PathBuf,
    body: String,
    meter: BudgetMeter,
    lines_emitted: usize,
    last_line: Option<Position>,
    finished: Vec<PathBuf>,
}

impl ChunkWriter {
    fn new(root: &Path, ceiling: usize) -> Self {
        Self {
            base: root.parent().map(Path::to_path_buf).unwrap_or_default(),
            body: String::with_capacity(4096),
            meter: BudgetMeter::new(ceiling),
            lines_emitted: 0,
            last_line: None,
            finished: Vec::new(),
        }
    }

    fn display_name(&self, document: &Path) -> String {
        document
            .strip_prefix(&self.base)
            .unwrap_or(document)
            .display()
            .to_string()
    }

    fn push(&mut self, text: &str) {
        self.body.push_str(text);
        self.body.push('\n');
    }

    fn marker(&mut self, kind: &str, document: &Path) {
        let text = format!("[{} {}]", kind, self.display_name(document));
        self.push(&text);
    }

    fn resume_marker(&mut self, frame: &Frame) {
        let mut text = String::new();
        let _ = write!(
            text,
            "[resume {} at L{}]",
            self.display_name(&frame.document),
            frame.resume_line + 1
        );
        self.push(&text);
    }

    fn line(&mut self, document: &Path, line: &ContentLine) {
        let text = format!("L{}\t{}", line.number, line.text);
        self.meter.charge(&text);
        self.push(&text);
        self.lines_emitted += 1;
        self.last_line = Some(Position {
            document: document.to_path_buf(),
            line: line.number,
        });
    }

    fn finish(self, state: TraversalState) -> Chunk {
        Chunk {
            partial: !state.is_done(),
            body: self.body,
            state,
            units: self.meter.total(),
            lines_emitted: self.lines_emitted,
            last_line: self.last_line,
            finished: self.finished,
        }
    }
}
