//! Per-connection transaction state.

use std::mem;

use crate::command::ParsedCommand;
use crate::error::{EngineError, EngineResult};

/// Whether a session is executing commands or collecting them for EXEC.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum TxnState {
    #[default]
    Normal,
    Queuing(Vec<ParsedCommand>),
}

/// State owned by one client connection.
///
/// Dropping the session drops any commands it had queued.
#[derive(Debug, Default)]
pub struct Session {
    state: TxnState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TxnState {
        &self.state
    }

    pub fn is_queuing(&self) -> bool {
        matches!(self.state, TxnState::Queuing(_))
    }

    /// Enter queuing mode. Calling it again while queuing keeps the queue.
    pub fn begin(&mut self) {
        if let TxnState::Normal = self.state {
            self.state = TxnState::Queuing(Vec::new());
        }
    }

    /// Append a command to the queue. Returns `false` outside MULTI.
    pub fn enqueue(&mut self, cmd: ParsedCommand) -> bool {
        match &mut self.state {
            TxnState::Queuing(queue) => {
                queue.push(cmd);
                true
            }
            TxnState::Normal => false,
        }
    }

    /// Leave queuing mode and hand back the queue, for EXEC.
    pub fn take_queue(&mut self) -> EngineResult<Vec<ParsedCommand>> {
        match mem::take(&mut self.state) {
            TxnState::Queuing(queue) => Ok(queue),
            TxnState::Normal => Err(EngineError::ExecWithoutMulti),
        }
    }

    /// Leave queuing mode and drop the queue, for DISCARD.
    pub fn discard(&mut self) -> EngineResult<()> {
        match mem::take(&mut self.state) {
            TxnState::Queuing(_) => Ok(()),
            TxnState::Normal => Err(EngineError::DiscardWithoutMulti),
        }
    }

    /// Commands queued so far; empty outside MULTI.
    pub fn queued(&self) -> &[ParsedCommand] {
        match &self.state {
            TxnState::Queuing(queue) => queue,
            TxnState::Normal => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &str, value: &str) -> ParsedCommand {
        ParsedCommand::new("SET", [key, value])
    }

    #[test]
    fn test_new_session_is_normal() {
        let session = Session::new();
        assert_eq!(session.state(), &TxnState::Normal);
        assert!(session.queued().is_empty());
    }

    #[test]
    fn test_begin_enters_queuing() {
        let mut session = Session::new();
        session.begin();
        assert!(session.is_queuing());
        assert!(session.queued().is_empty());
    }

    #[test]
    fn test_begin_again_keeps_queue() {
        let mut session = Session::new();
        session.begin();
        session.enqueue(set("a", "1"));
        session.begin();
        assert!(session.is_queuing());
        assert_eq!(session.queued(), &[set("a", "1")]);
    }

    #[test]
    fn test_enqueue_outside_multi() {
        let mut session = Session::new();
        assert!(!session.enqueue(set("a", "1")));
        assert!(session.queued().is_empty());
    }

    #[test]
    fn test_take_queue_preserves_order() {
        let mut session = Session::new();
        session.begin();
        session.enqueue(set("a", "1"));
        session.enqueue(ParsedCommand::new("INCR", ["a"]));

        let queue = session.take_queue().unwrap();
        assert_eq!(queue, vec![set("a", "1"), ParsedCommand::new("INCR", ["a"])]);
        assert_eq!(session.state(), &TxnState::Normal);
    }

    #[test]
    fn test_take_queue_without_multi() {
        let mut session = Session::new();
        assert!(matches!(
            session.take_queue(),
            Err(EngineError::ExecWithoutMulti)
        ));
    }

    #[test]
    fn test_discard() {
        let mut session = Session::new();
        session.begin();
        session.enqueue(set("a", "1"));
        assert!(session.discard().is_ok());
        assert_eq!(session.state(), &TxnState::Normal);

        assert!(matches!(
            session.discard(),
            Err(EngineError::DiscardWithoutMulti)
        ));
    }
}
