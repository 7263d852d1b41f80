//! Path handling for partial extraction.
//!
//! A combined path string uses `/` to separate segments and `!` to escape
//! itself and `/`. Splitting/escaping happens on the caller side — the
//! engines only ever see unescaped segments through a [`PathCursor`].

/// Stack of unconsumed path segments, threaded by `&mut` through one
/// traversal call and never retained afterwards.
#[derive(Debug)]
pub struct PathCursor {
    segments: Vec<String>,
    pos: usize,
}

impl PathCursor {
    pub fn new<S: AsRef<str>>(segments: &[S]) -> Self {
        Self {
            segments: segments.iter().map(|s| s.as_ref().to_string()).collect(),
            pos: 0,
        }
    }

    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
            pos: 0,
        }
    }

    /// Consume and return the next segment.
    pub fn pop(&mut self) -> Option<String> {
        let seg = self.segments.get(self.pos).cloned();
        if seg.is_some() {
            self.pos += 1;
        }
        seg
    }

    pub fn peek(&self) -> Option<&str> {
        self.segments.get(self.pos).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.segments.len()
    }

    pub fn remaining(&self) -> usize {
        self.segments.len() - self.pos
    }
}

/// Split a combined path string into unescaped segments.
///
/// `!` escapes the following character; a trailing lone `!` is kept
/// literally. Empty segments (from `//` or a leading `/`) are dropped.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '!' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => current.push('!'),
            },
            '/' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Escape one segment for embedding into a combined path string.
pub fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c == '!' || c == '/' {
            out.push('!');
        }
        out.push(c);
    }
    out
}

/// Join unescaped segments into a combined path string.
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| escape_segment(s.as_ref()))
        .collect::<Vec<_>>()
        .join("/")
}
