//! Constants for the Vidaa TV integration

use std::time::Duration;

use vidaa_client::RemoteKey;
use vidaa_core::Platform;

pub const DOMAIN: &str = "vidaa_tv";
pub const MANUFACTURER: &str = "Hisense";

// Entry data keys
pub const CONF_HOST: &str = "host";
pub const CONF_PORT: &str = "port";
pub const CONF_MAC: &str = "mac";
pub const CONF_NAME: &str = "name";
pub const CONF_DEVICE_ID: &str = "device_id";
pub const CONF_MODEL: &str = "model";
pub const CONF_SW_VERSION: &str = "sw_version";
pub const CONF_PIN: &str = "pin";
pub const CONF_SCAN_INTERVAL: &str = "scan_interval";

pub const DEFAULT_PORT: u16 = vidaa_client::DEFAULT_PORT;
pub const DEFAULT_NAME: &str = "Vidaa TV";

/// Polling interval bounds in seconds
pub const DEFAULT_SCAN_INTERVAL: u64 = 30;
pub const MIN_SCAN_INTERVAL: u64 = 10;
pub const MAX_SCAN_INTERVAL: u64 = 300;
pub const SCAN_INTERVAL_STEP: u64 = 5;

pub const TIMEOUT_CONNECT: Duration = Duration::from_secs(10);
pub const TIMEOUT_COMMAND: Duration = Duration::from_secs(5);
pub const TIMEOUT_RECONNECT: Duration = Duration::from_secs(5);
pub const TIMEOUT_DEVICE_INFO: Duration = Duration::from_secs(5);
pub const TIMEOUT_STATE: Duration = Duration::from_secs(3);
pub const TIMEOUT_VOLUME: Duration = Duration::from_secs(1);
pub const TIMEOUT_AUTH: Duration = Duration::from_secs(10);

/// Time the TV needs to put the PIN on screen
pub const PIN_DISPLAY_DELAY: Duration = Duration::from_secs(1);

/// Auth-looking failures tolerated before asking for a re-pair
pub const AUTH_FAILURE_LIMIT: u32 = 3;

/// Pairing tokens, relative to the config directory
pub const TOKEN_FILE: &str = ".vidaa_tv_tokens.json";

pub const SERVICE_SEND_KEY: &str = "send_key";
pub const SERVICE_LAUNCH_APP: &str = "launch_app";
pub const ATTR_KEY: &str = "key";
pub const ATTR_APP: &str = "app";

pub const PLATFORMS: [Platform; 5] = Platform::ALL;

/// One remote button entity
#[derive(Debug, Clone, Copy)]
pub struct ButtonKey {
    pub key_id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub key: RemoteKey,
    pub enabled_default: bool,
}

const fn button(
    key_id: &'static str,
    name: &'static str,
    icon: &'static str,
    key: RemoteKey,
    enabled_default: bool,
) -> ButtonKey {
    ButtonKey {
        key_id,
        name,
        icon,
        key,
        enabled_default,
    }
}

pub const BUTTON_KEYS: [ButtonKey; 33] = [
    // Navigation
    button("up", "Up", "mdi:arrow-up", RemoteKey::Up, true),
    button("down", "Down", "mdi:arrow-down", RemoteKey::Down, true),
    button("left", "Left", "mdi:arrow-left", RemoteKey::Left, true),
    button("right", "Right", "mdi:arrow-right", RemoteKey::Right, true),
    button("ok", "OK", "mdi:checkbox-blank-circle", RemoteKey::Ok, true),
    button("back", "Back", "mdi:arrow-u-left-top", RemoteKey::Back, true),
    button("menu", "Menu", "mdi:menu", RemoteKey::Menu, true),
    button("home", "Home", "mdi:home", RemoteKey::Home, true),
    button("exit", "Exit", "mdi:close-box", RemoteKey::Exit, true),
    // Channels
    button("channel_up", "Channel Up", "mdi:arrow-up-bold", RemoteKey::ChannelUp, true),
    button("channel_down", "Channel Down", "mdi:arrow-down-bold", RemoteKey::ChannelDown, true),
    // Playback
    button("play", "Play", "mdi:play", RemoteKey::Play, true),
    button("pause", "Pause", "mdi:pause", RemoteKey::Pause, true),
    button("stop", "Stop", "mdi:stop", RemoteKey::Stop, true),
    button("fast_forward", "Fast Forward", "mdi:fast-forward", RemoteKey::FastForward, true),
    button("rewind", "Rewind", "mdi:rewind", RemoteKey::Rewind, true),
    button("info", "Info", "mdi:information", RemoteKey::Info, true),
    // Colour keys
    button("red", "Red", "mdi:card", RemoteKey::Red, false),
    button("green", "Green", "mdi:card", RemoteKey::Green, false),
    button("yellow", "Yellow", "mdi:card", RemoteKey::Yellow, false),
    button("blue", "Blue", "mdi:card", RemoteKey::Blue, false),
    // Digits
    button("0", "0", "mdi:numeric-0", RemoteKey::Num0, false),
    button("1", "1", "mdi:numeric-1", RemoteKey::Num1, false),
    button("2", "2", "mdi:numeric-2", RemoteKey::Num2, false),
    button("3", "3", "mdi:numeric-3", RemoteKey::Num3, false),
    button("4", "4", "mdi:numeric-4", RemoteKey::Num4, false),
    button("5", "5", "mdi:numeric-5", RemoteKey::Num5, false),
    button("6", "6", "mdi:numeric-6", RemoteKey::Num6, false),
    button("7", "7", "mdi:numeric-7", RemoteKey::Num7, false),
    button("8", "8", "mdi:numeric-8", RemoteKey::Num8, false),
    button("9", "9", "mdi:numeric-9", RemoteKey::Num9, false),
    button("subtitle", "Subtitle", "mdi:subtitles", RemoteKey::Subtitle, false),
    button("power", "Power", "mdi:power", RemoteKey::Power, true),
];
