//! Remote keys understood by the TV

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown remote key: {0}")]
pub struct UnknownKey(pub String);

macro_rules! remote_keys {
    ($($variant:ident => $wire:literal),+ $(,)?) => {
        /// A key on the TV remote
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum RemoteKey {
            $($variant),+
        }

        impl RemoteKey {
            pub const ALL: &'static [RemoteKey] = &[$(RemoteKey::$variant),+];

            /// Wire name, e.g. `KEY_HOME`
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(RemoteKey::$variant => $wire),+
                }
            }
        }
    };
}

remote_keys! {
    Power => "KEY_POWER",
    Up => "KEY_UP",
    Down => "KEY_DOWN",
    Left => "KEY_LEFT",
    Right => "KEY_RIGHT",
    Ok => "KEY_OK",
    Back => "KEY_BACK",
    Menu => "KEY_MENU",
    Home => "KEY_HOME",
    Exit => "KEY_EXIT",
    Info => "KEY_INFO",
    VolumeUp => "KEY_VOLUME_UP",
    VolumeDown => "KEY_VOLUME_DOWN",
    Mute => "KEY_MUTE",
    ChannelUp => "KEY_CHANNEL_UP",
    ChannelDown => "KEY_CHANNEL_DOWN",
    Play => "KEY_PLAY",
    Pause => "KEY_PAUSE",
    Stop => "KEY_STOP",
    FastForward => "KEY_FAST_FORWARD",
    Rewind => "KEY_REWIND",
    Red => "KEY_RED",
    Green => "KEY_GREEN",
    Yellow => "KEY_YELLOW",
    Blue => "KEY_BLUE",
    Num0 => "KEY_0",
    Num1 => "KEY_1",
    Num2 => "KEY_2",
    Num3 => "KEY_3",
    Num4 => "KEY_4",
    Num5 => "KEY_5",
    Num6 => "KEY_6",
    Num7 => "KEY_7",
    Num8 => "KEY_8",
    Num9 => "KEY_9",
    Subtitle => "KEY_SUBTITLE",
    Source => "KEY_SOURCE",
}

impl FromStr for RemoteKey {
    type Err = UnknownKey;

    /// Accepts `KEY_HOME`, `key_home` and `home` alike
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        let wire = if upper.starts_with("KEY_") {
            upper
        } else {
            format!("KEY_{}", upper)
        };

        RemoteKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == wire)
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!("KEY_HOME".parse::<RemoteKey>().unwrap(), RemoteKey::Home);
        assert_eq!("key_home".parse::<RemoteKey>().unwrap(), RemoteKey::Home);
        assert_eq!("home".parse::<RemoteKey>().unwrap(), RemoteKey::Home);
        assert_eq!(
            "fast forward".parse::<RemoteKey>().unwrap(),
            RemoteKey::FastForward
        );
        assert_eq!("7".parse::<RemoteKey>().unwrap(), RemoteKey::Num7);
    }

    #[test]
    fn test_unknown_key() {
        let err = "KEY_TELEPORT".parse::<RemoteKey>().unwrap_err();
        assert_eq!(err, UnknownKey("KEY_TELEPORT".to_string()));
        assert!("".parse::<RemoteKey>().is_err());
    }

    #[test]
    fn test_wire_names_unique() {
        let mut names: Vec<_> = RemoteKey::ALL.iter().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RemoteKey::ALL.len());
        assert!(names.iter().all(|n| n.starts_with("KEY_")));
    }
}
