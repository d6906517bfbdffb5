//! Append-only message log and replay.
//!
//! Every accepted message is stamped and appended here *before* any
//! delivery is attempted, so a message whose recipient is offline (or whose
//! delivery fails) can still be replayed when the recipient connects.
//!
//! Stamping and appending happen under the same write guard, so log order
//! is exactly `(time, seq)` order.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::groups::GroupDirectory;
use crate::messages::{Message, PushEvent, RecipientSelector};
use crate::participant::ParticipantId;

#[derive(Debug, Default)]
pub struct MessageLog {
    inner: RwLock<LogInner>,
}

#[derive(Debug, Default)]
struct LogInner {
    entries: Vec<Arc<Message>>,
    last_time: u64,
    next_seq: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        MessageLog::default()
    }

    /// Stamp and append a message. `now_ms` is clamped so time never runs
    /// backwards; the sequence number always increases.
    pub fn append(
        &self,
        sender: ParticipantId,
        recipient: RecipientSelector,
        text: String,
        now_ms: u64,
    ) -> Arc<Message> {
        let mut inner = self.inner.write();

        let time = now_ms.max(inner.last_time);
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.last_time = time;

        let msg = Arc::new(Message {
            sender,
            recipient,
            text,
            time,
            seq,
        });
        inner.entries.push(msg.clone());
        msg
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Copy of the current log (cheap: entries are shared).
    pub fn snapshot(&self) -> Vec<Arc<Message>> {
        self.inner.read().entries.clone()
    }

    /// Messages with `time > since_ms` that `participant` sent or received,
    /// in log order.
    ///
    /// The iterator walks a snapshot taken now; messages appended later are
    /// not included. Calling again with the same arguments yields the same
    /// prefix.
    pub fn replay_since(
        &self,
        participant: &ParticipantId,
        since_ms: u64,
        groups: Arc<GroupDirectory>,
    ) -> Replay {
        Replay {
            entries: self.snapshot(),
            pos: 0,
            participant: participant.clone(),
            since_ms,
            groups,
        }
    }

    /// Drop every entry and reset the clock state. Test / admin use only.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.last_time = 0;
        inner.next_seq = 0;
    }
}

/// Lazy, finite replay over a log snapshot.
#[derive(Debug, Clone)]
pub struct Replay {
    entries: Vec<Arc<Message>>,
    pos: usize,
    participant: ParticipantId,
    since_ms: u64,
    groups: Arc<GroupDirectory>,
}

impl Replay {
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    /// Highest sequence number in the snapshot (`0` for an empty log).
    ///
    /// Every message with `seq <= high_water()` was either replayed or is
    /// older than the requested window, so a live push carrying such a seq
    /// is a duplicate of what the replay already covered.
    pub fn high_water(&self) -> u64 {
        self.entries.last().map_or(0, |m| m.seq)
    }

    /// Mark to filter live pushes against once the replay has been sent.
    pub fn mark(&self) -> ReplayMark {
        ReplayMark {
            high_water: self.high_water(),
        }
    }
}

/// What a [`Replay`] already covered.
///
/// A connection is registered before its replay snapshot is taken, so a
/// message appended in between is both in the snapshot and pushed live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayMark {
    high_water: u64,
}

impl ReplayMark {
    /// True if `event` was already part of the replay window.
    pub fn covers(&self, event: &PushEvent) -> bool {
        event.seq() <= self.high_water
    }
}

impl Iterator for Replay {
    type Item = Arc<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(msg) = self.entries.get(self.pos) {
            self.pos += 1;
            if msg.time > self.since_ms && msg.involves(&self.participant, &self.groups) {
                return Some(msg.clone());
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entries.len() - self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::GroupName;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::parse(s).unwrap()
    }

    fn to(s: &str) -> RecipientSelector {
        RecipientSelector::Participant(pid(s))
    }

    #[test]
    fn keys_strictly_increase_even_when_clock_stalls_or_regresses() {
        let log = MessageLog::new();
        let a = log.append(pid("me"), to("friend"), "one".into(), 1_000);
        let b = log.append(pid("me"), to("friend"), "two".into(), 1_000);
        let c = log.append(pid("me"), to("friend"), "three".into(), 900);

        assert!(a.key() < b.key());
        assert!(b.key() < c.key());
        assert_eq!(c.time, 1_000);
        assert_eq!((a.seq, b.seq, c.seq), (1, 2, 3));
    }

    #[test]
    fn replay_filters_by_participant_and_time() {
        let groups = Arc::new(
            GroupDirectory::new().with_group(GroupName::parse("team").unwrap(), [pid("friend"), pid("boss")]),
        );
        let log = MessageLog::new();
        log.append(pid("me"), to("friend"), "old".into(), 10);
        log.append(pid("me"), to("other"), "not yours".into(), 20);
        log.append(pid("boss"), RecipientSelector::Group(GroupName::parse("team").unwrap()), "team".into(), 30);
        log.append(pid("other"), RecipientSelector::Everyone, "all".into(), 40);
        log.append(pid("friend"), to("me"), "reply".into(), 50);

        let texts: Vec<String> = log
            .replay_since(&pid("friend"), 10, groups.clone())
            .map(|m| m.text.clone())
            .collect();
        assert_eq!(texts, vec!["team", "all", "reply"]);

        // Restartable: same arguments, same result.
        let again: Vec<String> = log
            .replay_since(&pid("friend"), 10, groups)
            .map(|m| m.text.clone())
            .collect();
        assert_eq!(texts, again);
    }

    #[test]
    fn replay_is_a_snapshot() {
        let log = MessageLog::new();
        log.append(pid("me"), to("friend"), "first".into(), 1);
        let replay = log.replay_since(&pid("friend"), 0, Arc::new(GroupDirectory::new()));
        log.append(pid("me"), to("friend"), "second".into(), 2);

        assert_eq!(replay.high_water(), 1);
        assert_eq!(replay.count(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn mark_covers_only_the_snapshot() {
        let log = MessageLog::new();
        let empty = log.replay_since(&pid("friend"), 0, Arc::new(GroupDirectory::new())).mark();

        let first = log.append(pid("me"), to("friend"), "first".into(), 1);
        let mark = log.replay_since(&pid("friend"), 0, Arc::new(GroupDirectory::new())).mark();
        let second = log.append(pid("me"), to("friend"), "second".into(), 2);

        assert!(!empty.covers(&PushEvent::NewMessage(first.clone())));
        assert!(mark.covers(&PushEvent::NewMessage(first)));
        assert!(!mark.covers(&PushEvent::NewMessage(second)));
    }
}
