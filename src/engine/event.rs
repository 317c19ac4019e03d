/// Kind of a [`NoteEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum NoteEventKind {
    NoteOn,
    NoteOff,
}

/// A sample accurate note event within one audio block.
///
/// Events passed to [`GrainEngine::process`](crate::GrainEngine::process) must be ordered by
/// non-decreasing `sample_offset`, with offsets in range `0..block_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    /// Frame offset of the event in the current block.
    pub sample_offset: usize,
    pub kind: NoteEventKind,
    /// MIDI note number in range 0..=127.
    pub note: u8,
}

impl NoteEvent {
    pub const fn note_on(sample_offset: usize, note: u8) -> Self {
        Self {
            sample_offset,
            kind: NoteEventKind::NoteOn,
            note,
        }
    }

    pub const fn note_off(sample_offset: usize, note: u8) -> Self {
        Self {
            sample_offset,
            kind: NoteEventKind::NoteOff,
            note,
        }
    }
}
