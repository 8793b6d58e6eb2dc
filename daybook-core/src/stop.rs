// Stop predicates for halting token generation

/// Decides whether decoding should halt, given the most recently produced
/// token. Engines evaluate this once per new token, before that token's
/// text is appended to the chunk stream. Implementations must be
/// side-effect free.
pub trait StopPredicate: Send + Sync {
    fn should_stop(&self, last_token: u32, generated: &[u32]) -> bool;
}

/// Default predicate: stop when the last token is one of a small fixed set
/// of terminal ids (typically just end-of-sequence).
#[derive(Debug, Clone)]
pub struct EosStop {
    terminal_ids: Vec<u32>,
}

impl EosStop {
    pub fn new(eos_id: u32) -> Self {
        Self {
            terminal_ids: vec![eos_id],
        }
    }

    pub fn with_ids(terminal_ids: Vec<u32>) -> Self {
        Self { terminal_ids }
    }
}

impl StopPredicate for EosStop {
    fn should_stop(&self, last_token: u32, _generated: &[u32]) -> bool {
        self.terminal_ids.contains(&last_token)
    }
}

impl<F> StopPredicate for F
where
    F: Fn(u32, &[u32]) -> bool + Send + Sync,
{
    fn should_stop(&self, last_token: u32, generated: &[u32]) -> bool {
        self(last_token, generated)
    }
}
