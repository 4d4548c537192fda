//! delta::window
//!
//! Delta instructions and window application.

use super::DeltaError;

/// Largest source or target view a window may declare.
///
/// Writers emit views of at most [`super::DELTA_WINDOW_SIZE`] bytes; the
/// bound keeps a hostile header from sizing buffers.
pub const MAX_VIEW_LEN: usize = 64 * super::DELTA_WINDOW_SIZE;

/// One delta instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Copy `len` bytes from the source view starting at `offset`.
    Source { offset: usize, len: usize },
    /// Copy `len` bytes from the target built so far, starting at `offset`.
    ///
    /// The ranges may overlap, in which case bytes produced by this very
    /// instruction are copied again (run-length expansion).
    Target { offset: usize, len: usize },
    /// Copy the next `len` bytes of new data.
    New { len: usize },
}

impl Instruction {
    pub const OP_SOURCE: u8 = 0;
    pub const OP_TARGET: u8 = 1;
    pub const OP_NEW: u8 = 2;

    /// The 2-bit wire opcode.
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Source { .. } => Self::OP_SOURCE,
            Self::Target { .. } => Self::OP_TARGET,
            Self::New { .. } => Self::OP_NEW,
        }
    }

    /// Number of target bytes this instruction produces.
    pub fn len(&self) -> usize {
        match *self {
            Self::Source { len, .. } | Self::Target { len, .. } | Self::New { len } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One delta window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Window {
    /// Offset of the source view within the source text.
    pub sview_offset: u64,
    /// Length of the source view.
    pub sview_len: usize,
    /// Exact number of bytes this window produces.
    pub tview_len: usize,
    pub ops: Vec<Instruction>,
    pub new_data: Vec<u8>,
}

impl Window {
    /// A window that emits `data` verbatim with a single `New` instruction.
    pub fn from_new_data(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            sview_offset: 0,
            sview_len: 0,
            tview_len: len,
            ops: if len == 0 {
                Vec::new()
            } else {
                vec![Instruction::New { len }]
            },
            new_data: data,
        }
    }

    /// Check that the instructions are consistent with the declared view
    /// lengths without applying them.
    pub fn check(&self) -> Result<(), DeltaError> {
        if self.sview_len > MAX_VIEW_LEN || self.tview_len > MAX_VIEW_LEN {
            return Err(DeltaError::ViewOutOfRange {
                reason: format!(
                    "views of {}/{} bytes exceed the {MAX_VIEW_LEN} byte limit",
                    self.sview_len, self.tview_len
                ),
            });
        }
        let mut produced = 0usize;
        let mut new_consumed = 0usize;
        for op in &self.ops {
            match *op {
                Instruction::Source { offset, len } => {
                    if offset.checked_add(len).map_or(true, |end| end > self.sview_len) {
                        return Err(DeltaError::ViewOutOfRange {
                            reason: format!(
                                "source copy {offset}+{len} exceeds view of {}",
                                self.sview_len
                            ),
                        });
                    }
                }
                Instruction::Target { offset, len } => {
                    if len > 0 && offset >= produced {
                        return Err(DeltaError::ViewOutOfRange {
                            reason: format!("target copy at {offset} but only {produced} built"),
                        });
                    }
                }
                Instruction::New { len } => {
                    new_consumed = new_consumed.saturating_add(len);
                    if new_consumed > self.new_data.len() {
                        return Err(DeltaError::ViewOutOfRange {
                            reason: format!(
                                "new data exhausted: need {new_consumed}, have {}",
                                self.new_data.len()
                            ),
                        });
                    }
                }
            }
            produced = produced.saturating_add(op.len());
        }
        if produced != self.tview_len {
            return Err(DeltaError::TargetLengthMismatch {
                expected: self.tview_len,
                actual: produced,
            });
        }
        Ok(())
    }
}

/// Apply one window against its source view.
///
/// `sview` must be exactly the source bytes selected by the window's
/// `sview_offset`/`sview_len`.
///
/// # Errors
///
/// Returns [`DeltaError::ViewOutOfRange`] if any instruction reads outside
/// its buffer and [`DeltaError::TargetLengthMismatch`] if the result is not
/// exactly `tview_len` bytes. Nothing is allocated for a window that fails
/// [`Window::check`].
pub fn apply_window(sview: &[u8], window: &Window) -> Result<Vec<u8>, DeltaError> {
    window.check()?;
    let mut tbuf: Vec<u8> = Vec::with_capacity(window.tview_len);
    let mut new_offset = 0usize;

    for op in &window.ops {
        let end = tbuf.len().saturating_add(op.len());
        if end > window.tview_len {
            return Err(DeltaError::TargetLengthMismatch {
                expected: window.tview_len,
                actual: end,
            });
        }
        match *op {
            Instruction::Source { offset, len } => {
                let chunk = offset
                    .checked_add(len)
                    .and_then(|end| sview.get(offset..end))
                    .ok_or_else(|| DeltaError::ViewOutOfRange {
                        reason: format!("source copy {offset}+{len} of {}", sview.len()),
                    })?;
                tbuf.extend_from_slice(chunk);
            }
            Instruction::Target { offset, len } => {
                if offset >= tbuf.len() && len > 0 {
                    return Err(DeltaError::ViewOutOfRange {
                        reason: format!("target copy at {offset} of {}", tbuf.len()),
                    });
                }
                // byte-wise: the copy may read what it writes
                for i in 0..len {
                    let b = tbuf[offset + i];
                    tbuf.push(b);
                }
            }
            Instruction::New { len } => {
                let chunk = new_offset
                    .checked_add(len)
                    .and_then(|end| window.new_data.get(new_offset..end))
                    .ok_or_else(|| DeltaError::ViewOutOfRange {
                        reason: format!(
                            "new data {new_offset}+{len} of {}",
                            window.new_data.len()
                        ),
                    })?;
                tbuf.extend_from_slice(chunk);
                new_offset += len;
            }
        }
    }

    if tbuf.len() != window.tview_len {
        return Err(DeltaError::TargetLengthMismatch {
            expected: window.tview_len,
            actual: tbuf.len(),
        });
    }
    Ok(tbuf)
}

fn source_view<'a>(source: &'a [u8], window: &Window) -> Result<&'a [u8], DeltaError> {
    let start = usize::try_from(window.sview_offset).map_err(|_| DeltaError::ViewOutOfRange {
        reason: format!("source view offset {}", window.sview_offset),
    })?;
    start
        .checked_add(window.sview_len)
        .and_then(|end| source.get(start..end))
        .ok_or_else(|| DeltaError::ViewOutOfRange {
            reason: format!(
                "source view {}+{} of {}",
                start,
                window.sview_len,
                source.len()
            ),
        })
}

/// Apply a sequence of windows to a full source text.
pub fn apply_windows(source: &[u8], windows: &[Window]) -> Result<Vec<u8>, DeltaError> {
    let mut out = Vec::new();
    for window in windows {
        let sview = source_view(source, window)?;
        out.extend(apply_window(sview, window)?);
    }
    Ok(out)
}

/// Incremental receiver for a stream of windows.
///
/// Editors hand each incoming window to [`TxDeltaApplier::window`] and call
/// it with `None` at end of stream; afterwards the reconstructed text is
/// available from [`TxDeltaApplier::finish`].
#[derive(Debug)]
pub struct TxDeltaApplier {
    source: Vec<u8>,
    target: Vec<u8>,
    closed: bool,
}

impl TxDeltaApplier {
    pub fn new(source: Vec<u8>) -> Self {
        Self {
            source,
            target: Vec::new(),
            closed: false,
        }
    }

    /// Feed one window, or `None` to end the stream.
    pub fn window(&mut self, window: Option<&Window>) -> Result<(), DeltaError> {
        if self.closed {
            return Err(DeltaError::StreamClosed);
        }
        match window {
            Some(w) => {
                let sview = source_view(&self.source, w)?;
                let chunk = apply_window(sview, w)?;
                self.target.extend(chunk);
            }
            None => self.closed = true,
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The reconstructed text.
    pub fn finish(self) -> Vec<u8> {
        self.target
    }
}
