//! Channel and user mode model.
//!
//! Only what timestamp arbitration and bursting need: which letters take a
//! parameter, which are member status, which are lists, and how to stack a
//! set of changes into lines.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    /// Member status; the parameter is a nick. Carries the prefix symbol.
    Prefix(char),
    /// Ban-style list; the parameter is a mask.
    List,
    /// Parameter on set and unset (`+k`).
    Key,
    /// Parameter on set only (`+l`).
    Limit,
    Flag,
}

impl ModeKind {
    pub fn takes_param(self, adding: bool) -> bool {
        match self {
            Self::Flag => false,
            Self::Limit => adding,
            _ => true,
        }
    }
}

pub fn channel_mode_kind(letter: char) -> ModeKind {
    match letter {
        'o' => ModeKind::Prefix('@'),
        'h' => ModeKind::Prefix('%'),
        'v' => ModeKind::Prefix('+'),
        'b' | 'e' | 'I' => ModeKind::List,
        'k' => ModeKind::Key,
        'l' => ModeKind::Limit,
        _ => ModeKind::Flag,
    }
}

/// Mode letter for a status prefix symbol.
pub fn prefix_letter(symbol: char) -> Option<char> {
    match symbol {
        '@' => Some('o'),
        '%' => Some('h'),
        '+' => Some('v'),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub adding: bool,
    pub letter: char,
    pub param: Option<String>,
}

impl ModeChange {
    pub fn new(adding: bool, letter: char, param: Option<&str>) -> Self {
        Self {
            adding,
            letter,
            param: param.map(str::to_string),
        }
    }
}

/// Parse a channel mode string. A change whose parameter is missing is dropped.
pub fn parse_channel_modes(modes: &str, params: &[String]) -> Vec<ModeChange> {
    let mut out = Vec::new();
    let mut adding = true;
    let mut args = params.iter();
    for letter in modes.chars() {
        match letter {
            '+' => adding = true,
            '-' => adding = false,
            _ => {
                if channel_mode_kind(letter).takes_param(adding) {
                    if let Some(param) = args.next() {
                        out.push(ModeChange::new(adding, letter, Some(param)));
                    }
                } else {
                    out.push(ModeChange::new(adding, letter, None));
                }
            }
        }
    }
    out
}

/// Parse a user mode string. User modes never take parameters here.
pub fn parse_user_modes(modes: &str) -> Vec<ModeChange> {
    let mut adding = true;
    modes
        .chars()
        .filter_map(|letter| match letter {
            '+' => {
                adding = true;
                None
            }
            '-' => {
                adding = false;
                None
            }
            _ => Some(ModeChange::new(adding, letter, None)),
        })
        .collect()
}

/// Render changes as `+ab-c param param`, at most `max_params` parameters per line.
pub fn stack_modes(changes: &[ModeChange], max_params: usize) -> Vec<String> {
    let max_params = max_params.max(1);
    let mut lines = Vec::new();
    let mut letters = String::new();
    let mut params: Vec<&str> = Vec::new();
    let mut sign: Option<bool> = None;

    fn flush(letters: &mut String, params: &mut Vec<&str>, lines: &mut Vec<String>) {
        if letters.is_empty() {
            return;
        }
        let mut line = std::mem::take(letters);
        for p in params.drain(..) {
            line.push(' ');
            line.push_str(p);
        }
        lines.push(line);
    }

    for change in changes {
        if change.param.is_some() && params.len() >= max_params {
            flush(&mut letters, &mut params, &mut lines);
            sign = None;
        }
        if sign != Some(change.adding) {
            letters.push(if change.adding { '+' } else { '-' });
            sign = Some(change.adding);
        }
        letters.push(change.letter);
        if let Some(p) = &change.param {
            params.push(p);
        }
    }
    flush(&mut letters, &mut params, &mut lines);
    lines
}

/// One entry in a list mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub mask: String,
    pub setter: String,
    pub set_time: i64,
}

/// Non-status channel mode state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelModes {
    pub flags: BTreeSet<char>,
    pub key: Option<String>,
    pub limit: Option<u32>,
    pub lists: BTreeMap<char, Vec<ListEntry>>,
}

impl ChannelModes {
    pub fn is_set(&self, letter: char) -> bool {
        match letter {
            'k' => self.key.is_some(),
            'l' => self.limit.is_some(),
            _ => self.flags.contains(&letter),
        }
    }

    /// Current parameter of a parameterised mode.
    pub fn param_of(&self, letter: char) -> Option<String> {
        match letter {
            'k' => self.key.clone(),
            'l' => self.limit.map(|l| l.to_string()),
            _ => None,
        }
    }

    pub fn list(&self, letter: char) -> &[ListEntry] {
        self.lists.get(&letter).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_list_entry(&self, letter: char, mask: &str) -> bool {
        self.list(letter).iter().any(|e| e.mask == mask)
    }

    /// Apply a non-status change, returning whether anything changed.
    pub fn apply(&mut self, change: &ModeChange, setter: &str, now: i64) -> bool {
        match channel_mode_kind(change.letter) {
            ModeKind::Prefix(_) => false,
            ModeKind::List => {
                let Some(mask) = change.param.as_deref() else {
                    return false;
                };
                let list = self.lists.entry(change.letter).or_default();
                let present = list.iter().position(|e| e.mask == mask);
                match (change.adding, present) {
                    (true, None) => {
                        list.push(ListEntry {
                            mask: mask.to_string(),
                            setter: setter.to_string(),
                            set_time: now,
                        });
                        true
                    }
                    (false, Some(idx)) => {
                        list.remove(idx);
                        true
                    }
                    _ => false,
                }
            }
            ModeKind::Key => {
                if change.adding {
                    let new = change.param.clone();
                    let changed = self.key != new;
                    self.key = new;
                    changed
                } else {
                    self.key.take().is_some()
                }
            }
            ModeKind::Limit => {
                if change.adding {
                    match change.param.as_deref().and_then(|p| p.parse::<u32>().ok()) {
                        Some(limit) if limit > 0 => self.limit.replace(limit) != Some(limit),
                        _ => false,
                    }
                } else {
                    self.limit.take().is_some()
                }
            }
            ModeKind::Flag => {
                if change.adding {
                    self.flags.insert(change.letter)
                } else {
                    self.flags.remove(&change.letter)
                }
            }
        }
    }

    /// Flags and parameterised modes as `+ntkl` plus parameters. Lists excluded.
    pub fn to_mode_string(&self) -> (String, Vec<String>) {
        let mut letters = String::from("+");
        let mut params = Vec::new();
        letters.extend(self.flags.iter());
        if let Some(key) = &self.key {
            letters.push('k');
            params.push(key.clone());
        }
        if let Some(limit) = self.limit {
            letters.push('l');
            params.push(limit.to_string());
        }
        (letters, params)
    }
}
