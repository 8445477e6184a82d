//! Per-connection session state: selected database, transaction
//! machine, and subscription sets.

use std::collections::HashSet;

use bytes::Bytes;

/// The transaction state machine.
///
/// `Discarded` is entered when a command fails validation while
/// queueing (unknown name, bad arity, or a command that can't run
/// inside a transaction); EXEC then aborts with EXECABORT instead of
/// running a half-validated queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxnPhase {
    #[default]
    None,
    Queuing,
    Discarded,
}

/// A command held in the MULTI queue, pre-validated against the
/// registry.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub name: String,
    pub args: Vec<Bytes>,
}

/// One watched key: the database it lives in and the version observed
/// at WATCH time (`None` when the key was absent).
#[derive(Debug, Clone)]
pub struct Watch {
    pub db: usize,
    pub key: String,
    pub version: Option<u64>,
}

/// Everything the server remembers about one client connection.
#[derive(Debug, Default)]
pub struct Session {
    /// Selected database index.
    pub db: usize,
    pub txn: TxnPhase,
    pub queue: Vec<QueuedCommand>,
    pub watches: Vec<Watch>,
    /// Exact channels this connection is subscribed to.
    pub channels: HashSet<String>,
    /// Pattern subscriptions.
    pub patterns: HashSet<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// With at least one subscription the command surface shrinks to
    /// the pub/sub controls plus PING/QUIT.
    pub fn in_subscriber_mode(&self) -> bool {
        !self.channels.is_empty() || !self.patterns.is_empty()
    }

    /// Total remaining subscriptions across channels and patterns,
    /// reported in subscribe/unsubscribe confirmations.
    pub fn subscription_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    /// Leaves any transaction, dropping the queue and the watches.
    /// Watches never survive EXEC or DISCARD.
    pub fn reset_txn(&mut self) {
        self.txn = TxnPhase::None;
        self.queue.clear();
        self.watches.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_defaults() {
        let s = Session::new();
        assert_eq!(s.db, 0);
        assert_eq!(s.txn, TxnPhase::None);
        assert!(!s.in_subscriber_mode());
        assert_eq!(s.subscription_count(), 0);
    }

    #[test]
    fn subscriber_mode_tracks_both_kinds() {
        let mut s = Session::new();
        s.channels.insert("ch".into());
        assert!(s.in_subscriber_mode());
        s.channels.clear();
        s.patterns.insert("p.*".into());
        assert!(s.in_subscriber_mode());
        assert_eq!(s.subscription_count(), 1);
    }

    #[test]
    fn reset_txn_clears_queue_and_watches() {
        let mut s = Session::new();
        s.txn = TxnPhase::Queuing;
        s.queue.push(QueuedCommand {
            name: "SET".into(),
            args: vec![],
        });
        s.watches.push(Watch {
            db: 0,
            key: "k".into(),
            version: Some(1),
        });

        s.reset_txn();
        assert_eq!(s.txn, TxnPhase::None);
        assert!(s.queue.is_empty());
        assert!(s.watches.is_empty());
    }
}
