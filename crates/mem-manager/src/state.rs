//! Per-scope state machine (`spec.md` §4.12):
//! `UNINITIALIZED → OPENING → REPLAYING → READY ⇄ MAINTAINING → CLOSED`.
//! Writes are rejected outside `Ready`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Uninitialized,
    Opening,
    Replaying,
    Ready,
    Maintaining,
    Closed,
}

impl ScopeState {
    pub fn accepts_writes(&self) -> bool {
        matches!(self, ScopeState::Ready)
    }

    /// Whether `to` is a legal transition from `self`. `Ready` and
    /// `Maintaining` transition back and forth into each other for the
    /// duration of `rebuild`/`verify`/`snapshot`/`compact`; every other edge
    /// is a one-way advance through the open sequence, ending at `Closed`.
    pub fn can_transition_to(&self, to: ScopeState) -> bool {
        use ScopeState::*;
        matches!(
            (self, to),
            (Uninitialized, Opening)
                | (Opening, Replaying)
                | (Replaying, Ready)
                | (Ready, Maintaining)
                | (Maintaining, Ready)
                | (Ready, Closed)
                | (Maintaining, Closed)
                | (Opening, Closed)
                | (Replaying, Closed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_and_maintaining_cycle_freely() {
        assert!(ScopeState::Ready.can_transition_to(ScopeState::Maintaining));
        assert!(ScopeState::Maintaining.can_transition_to(ScopeState::Ready));
    }

    #[test]
    fn only_ready_accepts_writes() {
        assert!(ScopeState::Ready.accepts_writes());
        assert!(!ScopeState::Maintaining.accepts_writes());
        assert!(!ScopeState::Replaying.accepts_writes());
    }

    #[test]
    fn cannot_skip_the_open_sequence() {
        assert!(!ScopeState::Uninitialized.can_transition_to(ScopeState::Ready));
        assert!(!ScopeState::Opening.can_transition_to(ScopeState::Maintaining));
    }
}
