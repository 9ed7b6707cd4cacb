//! In-memory entity store.

use std::collections::{BTreeMap, HashMap, VecDeque};

use slirc_wire::casemap::{irc_eq, irc_to_lower};
use tracing::info;

use super::modes::parse_channel_modes;
use super::{Channel, CommandOutcome, EntityStore, MemberStatus, Topic, User, XLine, XLineKind};

/// Notices kept for inspection before the oldest are discarded.
const NOTICE_BACKLOG: usize = 256;

/// A line written to a local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub target: String,
    pub line: String,
}

/// HashMap-backed store.
///
/// Users attached to `local_server` are treated as local: they receive
/// deliveries and are subject to x-line enforcement.
#[derive(Debug)]
pub struct MemoryStore {
    local_server: String,
    users: HashMap<String, User>,
    channels: HashMap<String, Channel>,
    xlines: Vec<XLine>,
    network_meta: BTreeMap<String, String>,
    deliveries: VecDeque<Delivery>,
    notices: VecDeque<(char, String)>,
}

impl MemoryStore {
    pub fn new(local_server: impl Into<String>) -> Self {
        Self {
            local_server: local_server.into(),
            users: HashMap::new(),
            channels: HashMap::new(),
            xlines: Vec::new(),
            network_meta: BTreeMap::new(),
            deliveries: VecDeque::new(),
            notices: VecDeque::new(),
        }
    }

    pub fn is_local(&self, user: &User) -> bool {
        irc_eq(&user.server, &self.local_server)
    }

    /// Lines delivered to local users, oldest first.
    pub fn deliveries(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries.iter()
    }

    /// Operator notices as `(snomask, text)`. OPERNOTICE uses `'*'`.
    pub fn notices(&self) -> impl Iterator<Item = &(char, String)> {
        self.notices.iter()
    }

    pub fn take_deliveries(&mut self) -> Vec<Delivery> {
        self.deliveries.drain(..).collect()
    }

    fn record_notice(&mut self, mask: char, text: &str) {
        info!(target: "snotice", snomask = %mask, "{}", text);
        if self.notices.len() >= NOTICE_BACKLOG {
            self.notices.pop_front();
        }
        self.notices.push_back((mask, text.to_string()));
    }

    fn local_nicks(&self) -> Vec<String> {
        self.users
            .values()
            .filter(|u| self.is_local(u))
            .map(|u| u.nick.clone())
            .collect()
    }

    /// Deliver to every local member of `chan` except `skip`.
    fn deliver_to_channel(&mut self, chan: &str, skip: &str, line: &str) {
        let Some(channel) = self.channels.get(&irc_to_lower(chan)) else {
            return;
        };
        let targets: Vec<String> = channel
            .members
            .values()
            .filter(|m| !irc_eq(&m.nick, skip))
            .filter(|m| self.user(&m.nick).is_some_and(|u| self.is_local(u)))
            .map(|m| m.nick.clone())
            .collect();
        for target in targets {
            self.deliver(&target, line);
        }
    }

    fn relay_message(&mut self, source: &str, command: &str, params: &[String]) -> CommandOutcome {
        let (Some(target), Some(text)) = (params.first(), params.get(1)) else {
            return CommandOutcome::Failure;
        };
        let prefix = self.user(source).map(User::hostmask).unwrap_or_else(|| source.to_string());
        let line = format!(":{prefix} {command} {target} :{text}");
        let bare = target.trim_start_matches(['@', '%', '+']);
        if bare.starts_with('#') {
            if self.channel(bare).is_none() {
                return CommandOutcome::Failure;
            }
            self.deliver_to_channel(bare, source, &line);
            CommandOutcome::Success
        } else if bare.starts_with('$') {
            for nick in self.local_nicks() {
                self.deliver(&nick, &line);
            }
            CommandOutcome::Success
        } else {
            match self.user(bare) {
                Some(u) if self.is_local(u) => {
                    let nick = u.nick.clone();
                    self.deliver(&nick, &line);
                    CommandOutcome::Success
                }
                Some(_) => CommandOutcome::Success,
                None => CommandOutcome::Failure,
            }
        }
    }
}

impl EntityStore for MemoryStore {
    fn user(&self, nick: &str) -> Option<&User> {
        self.users.get(&irc_to_lower(nick))
    }

    fn user_mut(&mut self, nick: &str) -> Option<&mut User> {
        self.users.get_mut(&irc_to_lower(nick))
    }

    fn users(&self) -> Vec<&User> {
        let mut users: Vec<&User> = self.users.values().collect();
        users.sort_by(|a, b| a.nick.cmp(&b.nick));
        users
    }

    fn add_user(&mut self, user: User) {
        self.users.insert(irc_to_lower(&user.nick), user);
    }

    fn remove_user(&mut self, nick: &str, reason: &str) -> Option<User> {
        let user = self.users.remove(&irc_to_lower(nick))?;
        let line = format!(":{} QUIT :{}", user.hostmask(), reason);
        for chan in self.channels_of(nick) {
            self.deliver_to_channel(&chan, nick, &line);
            self.part(&chan, nick);
        }
        Some(user)
    }

    fn rename_user(&mut self, old: &str, new: &str, ts: i64) -> bool {
        let old_key = irc_to_lower(old);
        let new_key = irc_to_lower(new);
        if old_key != new_key && self.users.contains_key(&new_key) {
            return false;
        }
        let Some(mut user) = self.users.remove(&old_key) else {
            return false;
        };
        user.nick = new.to_string();
        user.age = ts;
        self.users.insert(new_key.clone(), user);
        for channel in self.channels.values_mut() {
            if let Some(mut member) = channel.members.remove(&old_key) {
                member.nick = new.to_string();
                channel.members.insert(new_key.clone(), member);
            }
        }
        true
    }

    fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&irc_to_lower(name))
    }

    fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(&irc_to_lower(name))
    }

    fn channels(&self) -> Vec<&Channel> {
        let mut channels: Vec<&Channel> = self.channels.values().collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        channels
    }

    fn create_channel(&mut self, name: &str, ts: i64) -> &mut Channel {
        self.channels
            .entry(irc_to_lower(name))
            .or_insert_with(|| Channel::new(name, ts))
    }

    fn remove_channel(&mut self, name: &str) -> Option<Channel> {
        self.channels.remove(&irc_to_lower(name))
    }

    fn xlines(&self) -> Vec<&XLine> {
        self.xlines.iter().collect()
    }

    fn add_xline(&mut self, line: XLine) -> bool {
        if self
            .xlines
            .iter()
            .any(|x| x.kind == line.kind && irc_eq(&x.mask, &line.mask))
        {
            return false;
        }
        self.xlines.push(line);
        true
    }

    fn remove_xline(&mut self, kind: XLineKind, mask: &str) -> bool {
        let before = self.xlines.len();
        self.xlines.retain(|x| !(x.kind == kind && irc_eq(&x.mask, mask)));
        self.xlines.len() != before
    }

    fn apply_xlines(&mut self, now: i64) -> Vec<(String, String)> {
        self.xlines.retain(|x| !x.is_expired(now));
        let mut hits = Vec::new();
        for nick in self.local_nicks() {
            let Some(user) = self.user(&nick) else {
                continue;
            };
            let exempt = self
                .xlines
                .iter()
                .any(|x| x.kind == XLineKind::E && x.matches(user));
            let ban = self.xlines.iter().find(|x| {
                x.kind != XLineKind::E && x.matches(user) && !(exempt && matches!(x.kind, XLineKind::G | XLineKind::K))
            });
            if let Some(ban) = ban {
                hits.push((nick.clone(), format!("{}-Lined: {}", ban.kind, ban.reason)));
            }
        }
        for (nick, reason) in &hits {
            self.remove_user(nick, reason);
        }
        hits
    }

    fn network_metadata(&self) -> Vec<(String, String)> {
        self.network_meta
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn set_network_metadata(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.network_meta.remove(key);
        } else {
            self.network_meta.insert(key.to_string(), value.to_string());
        }
    }

    fn execute_as(&mut self, nick: &str, command: &str, params: &[String], now: i64) -> CommandOutcome {
        if self.user(nick).is_none() {
            return CommandOutcome::Failure;
        }
        match command {
            "NICK" => match params.first() {
                Some(new) => {
                    let ts = params.get(1).and_then(|t| t.parse().ok()).unwrap_or(now);
                    if self.rename_user(nick, new, ts) {
                        CommandOutcome::Success
                    } else {
                        CommandOutcome::Failure
                    }
                }
                None => CommandOutcome::Failure,
            },
            "QUIT" => {
                let reason = params.first().map(String::as_str).unwrap_or("Client exited");
                self.remove_user(nick, reason);
                CommandOutcome::Success
            }
            "JOIN" => {
                let Some(chan) = params.first().filter(|c| c.starts_with('#')) else {
                    return CommandOutcome::Failure;
                };
                let ts = params.get(1).and_then(|t| t.parse().ok()).unwrap_or(now);
                self.create_channel(chan, ts)
                    .add_member(nick, MemberStatus::default());
                CommandOutcome::Success
            }
            "PART" => match params.first() {
                Some(chan) if self.part(chan, nick) => CommandOutcome::Success,
                _ => CommandOutcome::Failure,
            },
            "KICK" => {
                let (Some(chan), Some(victim)) = (params.first(), params.get(1)) else {
                    return CommandOutcome::Failure;
                };
                if self.part(chan, victim) {
                    CommandOutcome::Success
                } else {
                    CommandOutcome::Failure
                }
            }
            "AWAY" => {
                let away = params.first().filter(|m| !m.is_empty()).cloned();
                if let Some(user) = self.user_mut(nick) {
                    user.away = away;
                }
                CommandOutcome::Success
            }
            "PRIVMSG" | "NOTICE" => self.relay_message(nick, command, params),
            "MODE" => {
                let Some(target) = params.first() else {
                    return CommandOutcome::Failure;
                };
                let modes = params.get(1).map(String::as_str).unwrap_or("");
                if let Some(channel) = self.channel_mut(target) {
                    for change in parse_channel_modes(modes, params.get(2..).unwrap_or(&[])) {
                        channel.apply_mode(&change, nick, now);
                    }
                    CommandOutcome::Success
                } else if let Some(user) = self.user_mut(target) {
                    user.apply_modes(modes);
                    CommandOutcome::Success
                } else {
                    CommandOutcome::Failure
                }
            }
            "TOPIC" => {
                let (Some(chan), Some(text)) = (params.first(), params.get(1)) else {
                    return CommandOutcome::Failure;
                };
                match self.channel_mut(chan) {
                    Some(channel) => {
                        channel.topic = (!text.is_empty()).then(|| Topic {
                            text: text.clone(),
                            setter: nick.to_string(),
                            set_time: now,
                        });
                        CommandOutcome::Success
                    }
                    None => CommandOutcome::Failure,
                }
            }
            "INVITE" => {
                let (Some(target), Some(chan)) = (params.first(), params.get(1)) else {
                    return CommandOutcome::Failure;
                };
                match self.user(target) {
                    Some(u) if self.is_local(u) => {
                        let line = format!(":{nick} INVITE {} :{chan}", u.nick);
                        let target = u.nick.clone();
                        self.deliver(&target, &line);
                        CommandOutcome::Success
                    }
                    Some(_) => CommandOutcome::Success,
                    None => CommandOutcome::Failure,
                }
            }
            "WALLOPS" => {
                let Some(text) = params.first() else {
                    return CommandOutcome::Failure;
                };
                let line = format!(":{nick} WALLOPS :{text}");
                let targets: Vec<String> = self
                    .users
                    .values()
                    .filter(|u| self.is_local(u) && u.modes.contains(&'w'))
                    .map(|u| u.nick.clone())
                    .collect();
                for target in targets {
                    self.deliver(&target, &line);
                }
                CommandOutcome::Success
            }
            other => match (XLineKind::from_command(other), params.first()) {
                // A bare mask removes the line.
                (Some(kind), Some(mask)) if params.len() == 1 => {
                    if self.remove_xline(kind, mask) {
                        CommandOutcome::Success
                    } else {
                        CommandOutcome::Failure
                    }
                }
                _ => CommandOutcome::Invalid,
            },
        }
    }

    fn deliver(&mut self, nick: &str, line: &str) {
        self.deliveries.push_back(Delivery {
            target: nick.to_string(),
            line: line.to_string(),
        });
    }

    fn server_notice(&mut self, snomask: char, text: &str) {
        self.record_notice(snomask, text);
    }

    fn oper_notice(&mut self, text: &str) {
        self.record_notice('*', text);
    }

    fn mode_notice(&mut self, _modes: &str, text: &str) {
        self.record_notice('*', text);
    }
}
