//! Fluent builder API for redpen.
//!
//! Bundles traversal options and the starting position of the root document
//! into an [`Engine`] and an initial [`TraversalState`], or into an iterator
//! that yields chunks until the tree is exhausted.

use std::path::{Path, PathBuf};

use crate::engine::{Chunk, Engine, EngineOptions, TraversalState};
use crate::errors::RedpenError;
use crate::reader::ReadOptions;

/// Builder for a chunked traversal.
///
/// # Examples
///
/// ```no_run
/// use redpen::builder::Traversal;
///
/// let chunks = Traversal::new("thesis/main.tex")
///     .max_tokens(2048)
///     .build()
///     .unwrap();
///
/// for chunk in chunks {
///     let chunk = chunk.unwrap();
///     println!("{} lines, partial: {}", chunk.lines_emitted, chunk.partial);
/// }
/// ```
pub struct Traversal {
    root: PathBuf,
    start_line: usize,
    options: EngineOptions,
}

impl Traversal {
    /// Create a new builder for the given root document.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            start_line: 0,
            options: EngineOptions::default(),
        }
    }

    /// Unit ceiling per chunk.
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.options.max_tokens = max_tokens;
        self
    }

    /// First line to read in the root document, 1-based. `0` and `1` both
    /// mean the top of the file.
    pub fn start_line(mut self, line: usize) -> Self {
        self.start_line = line.saturating_sub(1);
        self
    }

    /// Descend into inclusion directives (default: true).
    pub fn follow_includes(mut self, follow: bool) -> Self {
        self.options.follow_includes = follow;
        self
    }

    /// Marker that starts a comment line (default: `%`).
    pub fn comment_marker(mut self, marker: char) -> Self {
        self.options.read = ReadOptions {
            comment_marker: marker,
        };
        self
    }

    /// Root document path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Split into the engine and its initial state.
    pub fn into_parts(self) -> Result<(Engine, TraversalState), RedpenError> {
        if !self.root.is_file() {
            return Err(RedpenError::DocumentNotFound { path: self.root });
        }
        let state = TraversalState::at(&self.root, self.start_line);
        Ok((Engine::new(self.options), state))
    }

    /// Build an iterator over all chunks.
    pub fn build(self) -> Result<Chunks, RedpenError> {
        let (engine, state) = self.into_parts()?;
        Ok(Chunks {
            engine,
            state: Some(state),
        })
    }
}

/// Iterator over the chunks of a traversal.
///
/// Stops after the final chunk or after the first error.
pub struct Chunks {
    engine: Engine,
    state: Option<TraversalState>,
}

impl Chunks {
    /// State the next chunk will start from, if any.
    pub fn state(&self) -> Option<&TraversalState> {
        self.state.as_ref()
    }
}

impl Iterator for Chunks {
    type Item = Result<Chunk, RedpenError>;

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.state.take()?;
        match self.engine.next_chunk(state) {
            Ok(chunk) => {
                if chunk.partial {
                    self.state = Some(chunk.state.clone());
                }
                Some(Ok(chunk))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
