use streamforge_model::TerminationSignal;

/// The pipeline's process-level exit status, one level coarser than the
/// per-kernel [`TerminationSignal`] it's folded down from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TerminationCode {
    Normal = 0,
    Aborted = 1,
    Fatal = 2,
}

impl From<TerminationSignal> for TerminationCode {
    fn from(signal: TerminationSignal) -> Self {
        match signal {
            TerminationSignal::None => TerminationCode::Normal,
            TerminationSignal::Aborted => TerminationCode::Aborted,
            TerminationSignal::Fatal => TerminationCode::Fatal,
        }
    }
}

impl TerminationCode {
    pub fn exit_code(self) -> i32 {
        self as i32
    }
}
