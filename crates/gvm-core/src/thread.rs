//! Interpreter threads
//!
//! Each thread owns its frame stack exclusively; the class table and heap
//! are shared through the runtime.

use crate::frame::Frame;
use crate::{VmError, VmResult};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Unique thread identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    /// Allocate a fresh identifier
    pub fn next() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread-{}", self.0)
    }
}

/// A thread of execution: a bounded stack of frames
#[derive(Debug)]
pub struct Thread {
    id: ThreadId,
    frames: Vec<Frame>,
    max_frames: usize,
}

impl Thread {
    /// Create an empty thread allowing at most `max_frames` frames
    pub fn new(max_frames: usize) -> Self {
        Self {
            id: ThreadId::next(),
            frames: Vec::new(),
            max_frames,
        }
    }

    /// Thread identifier
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Frame limit
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Push a frame
    pub fn push_frame(&mut self, frame: Frame) -> VmResult<()> {
        if self.frames.len() >= self.max_frames {
            return Err(VmError::FrameStackOverflow(self.max_frames));
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Pop the current frame
    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Current frame
    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Current frame, mutably
    pub fn current_frame_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Frame below the current one
    pub(crate) fn caller_frame_mut(&mut self) -> Option<&mut Frame> {
        let depth = self.frames.len();
        depth.checked_sub(2).and_then(|i| self.frames.get_mut(i))
    }

    /// All frames, outermost first
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frames remain
    pub fn is_finished(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop all frames, returning them innermost first
    pub fn unwind(&mut self) -> Vec<Frame> {
        let mut frames = std::mem::take(&mut self.frames);
        frames.reverse();
        frames
    }

    /// Java-style stack trace lines, innermost first
    pub fn backtrace(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .map(|frame| {
                let method = frame.method();
                let location = match (frame.class().source_file(), method.line_number(frame.pc)) {
                    (Some(file), Some(line)) => format!("{}:{}", file, line),
                    (Some(file), None) => file.to_string(),
                    _ => format!("pc {}", frame.pc),
                };
                format!("at {}.{}({})", method.class_name.replace('/', "."), method.name, location)
            })
            .collect()
    }
}
