//! Timestamp arbitration.
//!
//! Pure decision functions: given our state and the timestamp a peer sent,
//! decide what survives. The handlers apply the result and do the sending.
//! Lower timestamps are older and older state wins.

use std::cmp::Ordering;

use crate::store::modes::{ModeChange, ModeKind, channel_mode_kind};
use crate::store::{Channel, Topic, User};

/// What a channel join burst does to state already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Our channel was younger: strip every status prefix we hold and adopt
    /// their timestamp.
    pub strip_ours: bool,
    /// Grant the prefixes carried in the burst. False when our channel is
    /// older, in which case joined users arrive without status.
    pub grant_theirs: bool,
}

pub fn join_outcome(ours: i64, theirs: i64) -> JoinOutcome {
    match ours.cmp(&theirs) {
        Ordering::Greater => JoinOutcome {
            strip_ours: true,
            grant_theirs: true,
        },
        Ordering::Equal => JoinOutcome {
            strip_ours: false,
            grant_theirs: true,
        },
        Ordering::Less => JoinOutcome {
            strip_ours: false,
            grant_theirs: false,
        },
    }
}

/// Current local value of the mode a change refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSlot {
    Unset,
    /// Set, with its parameter where the mode has one.
    Set(Option<String>),
}

/// Something that holds modes a remote change can be compared against.
pub trait ModeView {
    fn slot(&self, change: &ModeChange) -> ModeSlot;
    /// Whether parameterised modes on this target compete on value.
    fn has_value_modes(&self) -> bool;
}

impl ModeView for Channel {
    fn slot(&self, change: &ModeChange) -> ModeSlot {
        match channel_mode_kind(change.letter) {
            ModeKind::Prefix(_) => {
                let nick = change.param.as_deref().unwrap_or_default();
                match self.member(nick) {
                    Some(m) if m.status.has(change.letter) => ModeSlot::Set(Some(m.nick.clone())),
                    _ => ModeSlot::Unset,
                }
            }
            ModeKind::List => {
                let mask = change.param.as_deref().unwrap_or_default();
                if self.modes.has_list_entry(change.letter, mask) {
                    ModeSlot::Set(Some(mask.to_string()))
                } else {
                    ModeSlot::Unset
                }
            }
            ModeKind::Key | ModeKind::Limit => match self.modes.param_of(change.letter) {
                Some(value) => ModeSlot::Set(Some(value)),
                None => ModeSlot::Unset,
            },
            ModeKind::Flag => {
                if self.modes.is_set(change.letter) {
                    ModeSlot::Set(None)
                } else {
                    ModeSlot::Unset
                }
            }
        }
    }

    fn has_value_modes(&self) -> bool {
        true
    }
}

impl ModeView for User {
    fn slot(&self, change: &ModeChange) -> ModeSlot {
        if self.modes.contains(&change.letter) {
            ModeSlot::Set(None)
        } else {
            ModeSlot::Unset
        }
    }

    fn has_value_modes(&self) -> bool {
        false
    }
}

/// Resolution of a timestamped mode batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeResolution {
    /// Changes to apply locally and relay onward.
    pub accepted: Vec<ModeChange>,
    /// Changes to send back, restating our state.
    pub bounced: Vec<ModeChange>,
    /// The whole batch was refused. The bounce goes back over the link it
    /// arrived on rather than toward the source server.
    pub rejected: bool,
    /// A trusted source overrode a newer timestamp.
    pub trusted_override: bool,
}

/// The change that restates our own value for whatever `change` touched.
fn restate(change: &ModeChange, slot: ModeSlot) -> ModeChange {
    match slot {
        ModeSlot::Set(param) => ModeChange {
            adding: true,
            letter: change.letter,
            param: param.or_else(|| change.param.clone()),
        },
        ModeSlot::Unset => {
            let keeps_param = channel_mode_kind(change.letter).takes_param(false);
            ModeChange {
                adding: false,
                letter: change.letter,
                param: if keeps_param { change.param.clone() } else { None },
            }
        }
    }
}

/// Decide a mode batch carried with timestamp `theirs` against a target
/// whose timestamp is `ours`.
///
/// - Their timestamp is older: everything applies.
/// - Equal: everything applies, except that a parameterised mode already
///   set here to a different value keeps our value and is bounced back.
/// - Newer: nothing applies and our state is restated, unless the source is
///   trusted to bypass timestamps.
pub fn resolve_modes<V: ModeView>(
    target: &V,
    ours: i64,
    theirs: i64,
    changes: Vec<ModeChange>,
    trusted: bool,
) -> ModeResolution {
    match theirs.cmp(&ours) {
        Ordering::Less => ModeResolution {
            accepted: changes,
            ..Default::default()
        },
        Ordering::Equal => {
            let mut out = ModeResolution::default();
            for change in changes {
                let contested = change.adding
                    && target.has_value_modes()
                    && matches!(channel_mode_kind(change.letter), ModeKind::Key | ModeKind::Limit);
                if !contested {
                    out.accepted.push(change);
                    continue;
                }
                match target.slot(&change) {
                    ModeSlot::Set(Some(current)) if Some(&current) == change.param.as_ref() => {}
                    ModeSlot::Set(Some(current)) => out.bounced.push(ModeChange {
                        adding: true,
                        letter: change.letter,
                        param: Some(current),
                    }),
                    _ => out.accepted.push(change),
                }
            }
            out
        }
        Ordering::Greater if trusted => ModeResolution {
            accepted: changes,
            trusted_override: true,
            ..Default::default()
        },
        Ordering::Greater => ModeResolution {
            bounced: changes
                .iter()
                .map(|c| restate(c, target.slot(c)))
                .collect(),
            rejected: true,
            ..Default::default()
        },
    }
}

/// A topic carrying `ts` replaces `current` when it is at least as new.
pub fn topic_wins(current: Option<&Topic>, ts: i64) -> bool {
    current.is_none_or(|t| ts >= t.set_time)
}

/// What to do with a received `TIMESET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeVerdict {
    /// Already in agreement; pass it on.
    Relay,
    /// Move our clock by this many seconds and pass it on.
    Adjust(i64),
    /// We are behind them: tell the network our (earlier) time instead.
    Correct,
}

pub fn timeset_verdict(ours: i64, theirs: i64, force: bool) -> TimeVerdict {
    if theirs == ours {
        TimeVerdict::Relay
    } else if force || theirs < ours {
        TimeVerdict::Adjust(theirs - ours)
    } else {
        TimeVerdict::Correct
    }
}
