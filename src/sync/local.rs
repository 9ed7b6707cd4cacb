//! Events that start on this server.
//!
//! The client-serving side calls these after a local user acts. Each one
//! updates the store and then tells the rest of the network, choosing the
//! narrowest route that reaches everyone who needs to know.

use slirc_wire::casemap::irc_eq;
use tracing::debug;

use crate::store::modes::{parse_channel_modes, stack_modes};
use crate::store::{EntityStore, MemberStatus, Topic, User, XLine, XLineKind};

use super::extension::MetadataTarget;
use super::manager::SyncManager;

impl<S: EntityStore> SyncManager<S> {
    fn us(&self) -> String {
        self.config.server.name.clone()
    }

    /// Introduction line for a user, as sent in bursts and on connect.
    pub(crate) fn intro_line(&self, user: &User) -> String {
        format!(
            ":{} NICK {} {} {} {} {} {} {} :{}",
            user.server,
            user.age,
            user.nick,
            user.host,
            user.dhost,
            user.ident,
            user.mode_string(),
            user.ip,
            user.gecos
        )
    }

    /// Write numerics to a user wherever it is. Remote users get them
    /// wrapped in `PUSH`.
    pub(crate) fn send_numerics(&mut self, nick: &str, lines: Vec<String>) {
        let us = self.us();
        for line in lines {
            if !self.deliver_local(nick, &format!(":{us} {line}")) {
                self.to_user(nick, &format!(":{us} PUSH {nick} ::{us} {line}"));
            }
        }
    }

    // ---- users -------------------------------------------------------------

    /// A user finished registering here.
    pub fn local_connect(&mut self, mut user: User) {
        user.server = self.us();
        let intro = self.intro_line(&user);
        self.add_user(user);
        self.to_all(&intro);
    }

    pub fn local_quit(&mut self, nick: &str, reason: &str) {
        let Some(user) = self.quit_user(nick, reason) else {
            return;
        };
        self.to_all(&format!(":{} QUIT :{reason}", user.nick));
    }

    /// Rename a user. Fails, changing nothing, when `new` belongs to
    /// someone else.
    pub fn local_nick(&mut self, old: &str, new: &str, ts: i64) -> bool {
        let Some(current) = self.store.user(old).map(|u| u.nick.clone()) else {
            return false;
        };
        if !self.store.rename_user(&current, new, ts) {
            return false;
        }
        self.to_all(&format!(":{current} NICK {new}"));
        true
    }

    pub fn local_kill(&mut self, source: &str, target: &str, reason: &str) {
        let Some(nick) = self.store.user(target).map(|u| u.nick.clone()) else {
            return;
        };
        self.to_all(&format!(":{source} KILL {nick} :{reason}"));
        self.quit_user(&nick, &format!("Killed ({source} ({reason}))"));
    }

    pub fn local_user_mode(&mut self, nick: &str, modes: &str) {
        let Some(user) = self.store.user_mut(nick) else {
            return;
        };
        user.apply_modes(modes);
        let nick = user.nick.clone();
        self.to_all(&format!(":{nick} MODE {nick} {modes}"));
    }

    /// Set or clear away status.
    pub fn local_away(&mut self, nick: &str, message: Option<&str>) {
        let Some(user) = self.store.user_mut(nick) else {
            return;
        };
        user.away = message.map(str::to_string);
        let line = match message {
            Some(text) => format!(":{} AWAY :{text}", user.nick),
            None => format!(":{} AWAY", user.nick),
        };
        self.to_all(&line);
    }

    pub fn local_oper(&mut self, nick: &str, oper_type: &str) {
        let Some(user) = self.store.user_mut(nick) else {
            return;
        };
        user.modes.insert('o');
        user.oper_type = Some(oper_type.to_string());
        let line = format!(":{} OPERTYPE {}", user.nick, oper_type.replace(' ', "_"));
        self.to_all(&line);
    }

    pub fn local_host(&mut self, nick: &str, host: &str) {
        let Some(user) = self.store.user_mut(nick) else {
            return;
        };
        user.dhost = host.to_string();
        let line = format!(":{} FHOST {host}", user.nick);
        self.to_all(&line);
    }

    pub fn local_gecos(&mut self, nick: &str, gecos: &str) {
        let Some(user) = self.store.user_mut(nick) else {
            return;
        };
        user.gecos = gecos.to_string();
        let line = format!(":{} FNAME :{gecos}", user.nick);
        self.to_all(&line);
    }

    pub fn local_wallops(&mut self, nick: &str, text: &str) {
        self.to_all(&format!(":{nick} WALLOPS :{text}"));
    }

    /// Invites only need to reach the invitee's server.
    pub fn local_invite(&mut self, source: &str, target: &str, chan: &str) {
        if !self.is_local_user(target) {
            self.to_user(target, &format!(":{source} INVITE {target} {chan}"));
        }
    }

    // ---- channels ----------------------------------------------------------

    /// A local user joined `chan`. The first member creates the channel
    /// network-wide with ops; later members join plainly.
    pub fn local_join(&mut self, nick: &str, chan: &str) {
        let Some(user) = self.store.user(nick) else {
            return;
        };
        let (nick, hostmask) = (user.nick.clone(), user.hostmask());
        let now = self.now();
        let us = self.us();
        let channel = self.store.create_channel(chan, now);
        if channel.member(&nick).is_some() {
            return;
        }
        let created = channel.members.is_empty();
        let status = if created { MemberStatus::OP } else { MemberStatus::default() };
        channel.add_member(&nick, status);
        let (name, ts) = (channel.name.clone(), channel.ts);

        self.deliver_channel(&name, &format!(":{hostmask} JOIN :{name}"));
        if created {
            self.to_all(&format!(":{us} FJOIN {name} {ts} :@,{nick}"));
            self.to_all(&format!(":{us} FMODE {name} {ts} +nt"));
        } else {
            self.to_all(&format!(":{nick} JOIN {name} {ts}"));
        }
    }

    pub fn local_part(&mut self, nick: &str, chan: &str, reason: &str) {
        if !self.store.part(chan, nick) {
            return;
        }
        self.to_all(&format!(":{nick} PART {chan} :{reason}"));
    }

    /// `source` is a user or a server name.
    pub fn local_kick(&mut self, source: &str, chan: &str, victim: &str, reason: &str) {
        if !self.store.part(chan, victim) {
            return;
        }
        self.to_all(&format!(":{source} KICK {chan} {victim} :{reason}"));
    }

    /// Apply a channel mode change and send it with the channel's timestamp.
    pub fn local_channel_mode(&mut self, source: &str, chan: &str, modes: &str, args: &[String]) {
        let now = self.now();
        let maxmodes = self.config.limits.maxmodes;
        let Some(channel) = self.store.channel_mut(chan) else {
            return;
        };
        let applied: Vec<_> = parse_channel_modes(modes, args)
            .into_iter()
            .filter(|change| channel.apply_mode(change, source, now))
            .collect();
        let (name, ts) = (channel.name.clone(), channel.ts);
        for modes in stack_modes(&applied, maxmodes) {
            self.to_all(&format!(":{source} FMODE {name} {ts} {modes}"));
        }
    }

    pub fn local_topic(&mut self, nick: &str, chan: &str, text: &str) {
        let now = self.now();
        let Some(channel) = self.store.channel_mut(chan) else {
            return;
        };
        channel.topic = (!text.is_empty()).then(|| Topic {
            text: text.to_string(),
            setter: nick.to_string(),
            set_time: now,
        });
        let name = channel.name.clone();
        self.to_all(&format!(":{nick} TOPIC {name} :{text}"));
    }

    /// `PRIVMSG` or `NOTICE` from a local user.
    ///
    /// Channel targets may carry a status prefix (`@#chan`) and reach only
    /// members holding it. Members in `exempt` were already told.
    pub fn local_message(&mut self, source: &str, command: &str, target: &str, text: &str, exempt: &[String]) {
        let line = format!(":{source} {command} {target} :{text}");
        let bare = target.trim_start_matches(['@', '%', '+']);
        if bare.starts_with('#') {
            let status = target.chars().next().filter(|c| matches!(c, '@' | '%' | '+'));
            self.to_channel(bare, status, exempt, None, &line);
        } else if bare.starts_with('$') {
            self.to_all(&line);
        } else if !self.is_local_user(bare) && !self.to_user(bare, &line) {
            debug!(target = %bare, "message for unknown user dropped");
        }
    }

    // ---- bans and metadata -------------------------------------------------

    /// Record a network ban set here and propagate it. K-lines stay local.
    pub fn local_xline_add(&mut self, xline: XLine) {
        let line = format!(
            ":{} ADDLINE {} {} {} {} {} :{}",
            self.us(),
            xline.kind,
            xline.mask,
            xline.setter,
            xline.set_time,
            xline.duration,
            xline.reason
        );
        let global = xline.kind.is_global();
        if !self.store.add_xline(xline) {
            return;
        }
        if global {
            self.to_all(&line);
        }
        self.enforce_xlines();
    }

    pub fn local_xline_remove(&mut self, source: &str, kind: XLineKind, mask: &str) {
        if self.store.remove_xline(kind, mask) && kind.is_global() {
            self.to_all(&format!(":{source} {} {mask}", kind.command()));
        }
    }

    /// Set metadata here and send it on. An empty value clears the key.
    pub fn local_metadata(&mut self, target: MetadataTarget<'_>, key: &str, value: &str) {
        let param = target.as_param().to_string();
        self.apply_metadata(&param, key, value);
        let us = self.us();
        self.to_all(&format!(":{us} METADATA {param} {key} :{value}"));
    }

    // ---- resync ------------------------------------------------------------

    /// Restate a channel's or user's full mode state to the network.
    pub fn sync_modes(&mut self, target: &str) {
        let us = self.us();
        if let Some(channel) = self.store.channel(target) {
            let (modes, params) = channel.modes.to_mode_string();
            let line = std::iter::once(modes).chain(params).collect::<Vec<_>>().join(" ");
            let line = format!(":{us} FMODE {} {} {line}", channel.name, channel.ts);
            self.to_all(&line);
        } else if let Some(user) = self.store.user(target) {
            let line = format!(":{us} FMODE {} {} {}", user.nick, user.age, user.mode_string());
            self.to_all(&line);
        }
    }

    pub fn sync_topic(&mut self, chan: &str) {
        let us = self.us();
        let Some(channel) = self.store.channel(chan) else {
            return;
        };
        let Some(topic) = &channel.topic else {
            return;
        };
        let line = format!(
            ":{us} FTOPIC {} {} {} :{}",
            channel.name, topic.set_time, topic.setter, topic.text
        );
        self.to_all(&line);
    }

    // ---- notices -----------------------------------------------------------

    pub fn send_oper_notice(&mut self, text: &str) {
        let us = self.us();
        self.to_all(&format!(":{us} OPERNOTICE :{text}"));
    }

    pub fn send_mode_notice(&mut self, modes: &str, text: &str) {
        let us = self.us();
        self.to_all(&format!(":{us} MODENOTICE {modes} :{text}"));
    }

    pub fn send_sno_notice(&mut self, snomask: char, text: &str) {
        let us = self.us();
        self.to_all(&format!(":{us} SNONOTICE {snomask} :{text}"));
    }

    /// Send a raw line to a user on another server.
    pub fn push(&mut self, nick: &str, line: &str) {
        if self.store.user(nick).is_some_and(|u| !irc_eq(&u.server, &self.config.server.name)) {
            let us = self.us();
            self.to_user(nick, &format!(":{us} PUSH {nick} :{line}"));
        }
    }
}
