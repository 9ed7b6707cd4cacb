//! CAPAB negotiation.
//!
//! Both ends advertise their protocol-affecting modules and fixed limits
//! before anything else is exchanged. Any difference aborts the link with
//! a reason naming what differs.

use std::collections::HashMap;

use crate::config::{Config, LimitsConfig};

/// Protocol revision spoken by this implementation.
pub const PROTOCOL_VERSION: u32 = 1103;

/// Longest `CAPAB MODULES` line we emit.
const MODULES_LINE_MAX: usize = 509;

/// What the peer has advertised so far.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    modules: String,
    keys: HashMap<String, String>,
}

impl Capabilities {
    /// `CAPAB START`: forget anything previously advertised.
    pub fn reset(&mut self) {
        self.modules.clear();
        self.keys.clear();
    }

    /// `CAPAB MODULES <csv>`. Several lines concatenate.
    pub fn add_modules(&mut self, csv: &str) {
        if !self.modules.is_empty() {
            self.modules.push(',');
        }
        self.modules.push_str(csv);
    }

    /// `CAPAB CAPABILITIES :K=V K=V ...`
    pub fn add_capabilities(&mut self, text: &str) {
        for item in text.split_whitespace() {
            if let Some((key, value)) = item.rsplit_once('=') {
                self.keys.insert(key.to_string(), value.to_string());
            }
        }
    }

    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    pub fn modules(&self) -> &str {
        &self.modules
    }
}

/// Sorted, comma-joined module list.
pub fn module_list(modules: &[String]) -> String {
    let mut sorted: Vec<&str> = modules.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

fn flag(on: bool) -> u8 {
    u8::from(on)
}

/// The full `CAPAB START .. END` sequence for this server.
pub fn capab_lines(config: &Config) -> Vec<String> {
    let mut lines = vec!["CAPAB START".to_string()];

    const PREFIX: &str = "CAPAB MODULES ";
    let mut line = PREFIX.to_string();
    for module in module_list(&config.sync.modules).split(',').filter(|m| !m.is_empty()) {
        if line.len() + module.len() + 1 > MODULES_LINE_MAX {
            lines.push(std::mem::replace(&mut line, PREFIX.to_string()));
        }
        if line.len() > PREFIX.len() {
            line.push(',');
        }
        line.push_str(module);
    }
    if line.len() > PREFIX.len() {
        lines.push(line);
    }

    let l = &config.limits;
    lines.push(format!(
        "CAPAB CAPABILITIES :NICKMAX={} HALFOP={} CHANMAX={} MAXMODES={} IDENTMAX={} MAXQUIT={} \
         MAXTOPIC={} MAXKICK={} MAXGECOS={} MAXAWAY={} IP6NATIVE={} IP6SUPPORT={} PROTOCOL={}",
        l.nickmax,
        flag(l.halfop),
        l.chanmax,
        l.maxmodes,
        l.identmax,
        l.maxquit,
        l.maxtopic,
        l.maxkick,
        l.maxgecos,
        l.maxaway,
        flag(l.ip6_native),
        flag(l.ip6_support),
        PROTOCOL_VERSION
    ));
    lines.push("CAPAB END".to_string());
    lines
}

/// Items of comma list `one` missing from `two`, each preceded by a space.
fn list_difference(one: &str, two: &str) -> String {
    let have: Vec<&str> = two.split(',').collect();
    one.split(',')
        .filter(|item| !item.is_empty() && !have.contains(item))
        .fold(String::new(), |mut acc, item| {
            acc.push(' ');
            acc.push_str(item);
            acc
        })
}

/// Check a completed advertisement against our own. Every check runs and
/// the last failure is the one reported.
pub fn negotiate(remote: &Capabilities, modules: &[String], limits: &LimitsConfig) -> Result<(), String> {
    let mut reason = None;
    let ours = module_list(modules);

    if !remote.modules.is_empty() && remote.modules != ours {
        let missing_here = list_difference(&remote.modules, &ours);
        let diff = if missing_here.is_empty() {
            format!("your server:{}", list_difference(&ours, &remote.modules))
        } else {
            format!("this server:{missing_here}")
        };
        reason = Some(if diff.len() == "this server:".len() {
            "Module list in CAPAB is not alphabetically ordered, cannot compare lists.".to_string()
        } else {
            format!("Modules loaded on these servers are not correctly matched, these modules are not loaded on {diff}")
        });
    }

    let ip6support = flag(limits.ip6_support).to_string();
    match remote.key("IP6SUPPORT") {
        None if limits.ip6_support => reason = Some("We don't both support linking to IPV6 servers".into()),
        Some(v) if v != ip6support => reason = Some("We don't both support linking to IPV6 servers".into()),
        _ => {}
    }
    if remote.key("IP6NATIVE") == Some("1") && !limits.ip6_support {
        reason = Some("The remote server is IPV6 native, and we don't support linking to IPV6 servers".into());
    }

    let differs = |key: &str, ours: usize| remote.key(key) != Some(ours.to_string().as_str());

    if differs("NICKMAX", limits.nickmax) {
        reason = Some("Maximum nickname lengths differ or remote nickname length not specified".into());
    }
    match remote.key("PROTOCOL") {
        Some(v) if v != PROTOCOL_VERSION.to_string() => {
            reason = Some(format!("Mismatched protocol versions {v} and {PROTOCOL_VERSION}"));
        }
        None => reason = Some("Protocol version not specified".into()),
        _ => {}
    }
    let halfop = flag(limits.halfop).to_string();
    match remote.key("HALFOP") {
        None if limits.halfop => {
            reason = Some("We don't both have halfop support enabled/disabled identically".into());
        }
        Some(v) if v != halfop => {
            reason = Some("We don't both have halfop support enabled/disabled identically".into());
        }
        _ => {}
    }

    let limit_checks: [(&str, usize, &str); 8] = [
        ("IDENTMAX", limits.identmax, "Maximum ident lengths differ or remote ident length not specified"),
        ("CHANMAX", limits.chanmax, "Maximum channel lengths differ or remote channel length not specified"),
        ("MAXMODES", limits.maxmodes, "Maximum modes per line differ or remote modes per line not specified"),
        ("MAXQUIT", limits.maxquit, "Maximum quit lengths differ or remote quit length not specified"),
        ("MAXTOPIC", limits.maxtopic, "Maximum topic lengths differ or remote topic length not specified"),
        ("MAXKICK", limits.maxkick, "Maximum kick lengths differ or remote kick length not specified"),
        (
            "MAXGECOS",
            limits.maxgecos,
            "Maximum GECOS (fullname) lengths differ or remote GECOS length not specified",
        ),
        (
            "MAXAWAY",
            limits.maxaway,
            "Maximum awaymessage lengths differ or remote awaymessage length not specified",
        ),
    ];
    for (key, value, text) in limit_checks {
        if differs(key, value) {
            reason = Some(text.to_string());
        }
    }

    match reason {
        Some(r) => Err(r),
        None => Ok(()),
    }
}
