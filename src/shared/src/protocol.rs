use anyhow::{Context, Result, bail};
use std::time::{SystemTime, UNIX_EPOCH};
use strum_macros::{AsRefStr, EnumIter, EnumString};
use wincode::{SchemaRead, SchemaWrite};

/// Lists larger than this are not carried inline, the receiver re-reads the block-list file.
pub const BROADCAST_MAX_SIZE: usize = 64;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, AsRefStr, EnumIter, EnumString, SchemaRead, SchemaWrite,
)]
pub enum Action {
    #[strum(serialize = "me.ranko0p.intent.action.NEW_ACTIVITY")]
    NewActivity,
    #[strum(serialize = "me.ranko0p.intent.action.RELOAD_LIST")]
    ReloadList,
    #[strum(serialize = "me.ranko0p.intent.action.RELOAD_RESULT")]
    ReloadResult,
    #[strum(serialize = "me.ranko0p.intent.action.IME")]
    ImeUpdate,
    #[strum(serialize = "me.ranko0p.intent.action.alive")]
    Alive,
    #[strum(serialize = "me.ranko0p.intent.action.ack")]
    AliveAck,
    #[strum(serialize = "me.ranko0p.intent.action.SERVER_PRINT")]
    DumpList,
    #[strum(serialize = "android.intent.action.ACTION_SHUTDOWN")]
    Shutdown,
}

/// Progress of a `RELOAD_LIST` request as reported by the privileged side.
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsRefStr, SchemaRead, SchemaWrite)]
pub enum LoadStatus {
    Start,
    Failed,
    Succeed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, SchemaRead, SchemaWrite)]
pub struct Extras {
    pub start_time: Option<u64>,
    pub package: Option<String>,
    pub list_size: Option<u64>,
    pub list: Option<Vec<String>>,
    pub status: Option<LoadStatus>,
}

/// What travels on the wire: an action, the package it is restricted to, and its extras.
#[derive(Debug, Clone, PartialEq, Eq, SchemaRead, SchemaWrite)]
pub struct Broadcast {
    pub action: Action,
    pub package: String,
    pub extras: Extras,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    NewActivity {
        start_time: u64,
        package: String,
    },
    ReloadList {
        start_time: u64,
        size: usize,
        list: Option<Vec<String>>,
    },
    ReloadResult(LoadStatus),
    ImeUpdate(String),
    Alive,
    AliveAck,
    DumpList,
    Shutdown,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|it| it.as_millis() as u64)
        .unwrap_or_default()
}

impl Message {
    pub fn new_activity(package: impl Into<String>) -> Self {
        Message::NewActivity {
            start_time: now_millis(),
            package: package.into(),
        }
    }

    /// Builds a reload request, dropping the inline list when it exceeds [BROADCAST_MAX_SIZE].
    pub fn reload_list(list: Vec<String>) -> Self {
        let size = list.len();

        Message::ReloadList {
            start_time: now_millis(),
            size,
            list: (size <= BROADCAST_MAX_SIZE).then_some(list),
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Message::NewActivity { .. } => Action::NewActivity,
            Message::ReloadList { .. } => Action::ReloadList,
            Message::ReloadResult(_) => Action::ReloadResult,
            Message::ImeUpdate(_) => Action::ImeUpdate,
            Message::Alive => Action::Alive,
            Message::AliveAck => Action::AliveAck,
            Message::DumpList => Action::DumpList,
            Message::Shutdown => Action::Shutdown,
        }
    }

    pub fn into_broadcast(self, package: &str) -> Broadcast {
        let action = self.action();
        let mut extras = Extras::default();

        match self {
            Message::NewActivity {
                start_time,
                package,
            } => {
                extras.start_time = Some(start_time);
                extras.package = Some(package);
            }
            Message::ReloadList {
                start_time,
                size,
                list,
            } => {
                extras.start_time = Some(start_time);
                extras.list_size = Some(size as u64);
                extras.list = list;
            }
            Message::ReloadResult(status) => extras.status = Some(status),
            Message::ImeUpdate(package) => extras.package = Some(package),
            Message::Alive | Message::AliveAck | Message::DumpList | Message::Shutdown => {}
        }

        Broadcast {
            action,
            package: package.into(),
            extras,
        }
    }
}

impl TryFrom<Broadcast> for Message {
    type Error = anyhow::Error;

    fn try_from(value: Broadcast) -> Result<Self> {
        let extras = value.extras;
        let action = value.action;

        let message = match action {
            Action::NewActivity => Message::NewActivity {
                start_time: extras.start_time.unwrap_or_default(),
                package: extras.package.context("NEW_ACTIVITY without package")?,
            },
            Action::ReloadList => {
                let Some(size) = extras.list_size else {
                    bail!("RELOAD_LIST without list size")
                };

                Message::ReloadList {
                    start_time: extras.start_time.unwrap_or_default(),
                    size: usize::try_from(size)?,
                    list: extras.list,
                }
            }
            Action::ReloadResult => {
                Message::ReloadResult(extras.status.context("RELOAD_RESULT without status")?)
            }
            Action::ImeUpdate => {
                Message::ImeUpdate(extras.package.context("IME_UPDATE without package")?)
            }
            Action::Alive => Message::Alive,
            Action::AliveAck => Message::AliveAck,
            Action::DumpList => Message::DumpList,
            Action::Shutdown => Message::Shutdown,
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn action_names_are_unique_and_parse_back() {
        let names: Vec<_> = Action::iter().map(|it| it.as_ref().to_string()).collect();

        for (index, name) in names.iter().enumerate() {
            assert!(!names[index + 1..].contains(name), "duplicate {name}");
            assert_eq!(Action::from_str(name).unwrap().as_ref(), name);
        }
    }

    #[test]
    fn small_list_travels_inline() {
        let list: Vec<String> = (0..BROADCAST_MAX_SIZE).map(|i| format!("com.app{i}")).collect();

        let Message::ReloadList { size, list: inline, .. } = Message::reload_list(list.clone())
        else {
            panic!("wrong variant")
        };

        assert_eq!(size, BROADCAST_MAX_SIZE);
        assert_eq!(inline, Some(list));
    }

    #[test]
    fn large_list_only_carries_size() {
        let list: Vec<String> = (0..=BROADCAST_MAX_SIZE).map(|i| format!("com.app{i}")).collect();

        let broadcast = Message::reload_list(list).into_broadcast("android");

        assert_eq!(broadcast.action, Action::ReloadList);
        assert_eq!(broadcast.extras.list_size, Some(BROADCAST_MAX_SIZE as u64 + 1));
        assert_eq!(broadcast.extras.list, None);
    }

    #[test]
    fn broadcast_converts_back_to_message() {
        let message = Message::ImeUpdate("com.example.ime".into());
        let broadcast = message.clone().into_broadcast("android");

        assert_eq!(broadcast.package, "android");
        assert_eq!(Message::try_from(broadcast).unwrap(), message);
    }

    #[test]
    fn missing_extras_are_rejected() {
        let broadcast = Broadcast {
            action: Action::ReloadResult,
            package: "me.ranko.autodark".into(),
            extras: Extras::default(),
        };

        assert!(Message::try_from(broadcast).is_err());
    }

    #[test]
    fn broadcast_survives_wire_encoding() {
        let broadcast = Message::reload_list(vec!["com.a".into(), "com.b".into()])
            .into_broadcast("android");

        let bytes = wincode::serialize(&broadcast).unwrap();
        let decoded: Broadcast = wincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded, broadcast);
    }
}
