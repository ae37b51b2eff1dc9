//! Built-in app catalog
//!
//! Maps the lower-cased app name reported by the TV to a display name.

pub struct CatalogApp {
    pub key: &'static str,
    pub name: &'static str,
}

pub const APPS: &[CatalogApp] = &[
    CatalogApp { key: "netflix", name: "Netflix" },
    CatalogApp { key: "youtube", name: "YouTube" },
    CatalogApp { key: "amazon", name: "Prime Video" },
    CatalogApp { key: "disney", name: "Disney+" },
    CatalogApp { key: "spotify", name: "Spotify" },
    CatalogApp { key: "plex", name: "Plex" },
    CatalogApp { key: "dazn", name: "DAZN" },
    CatalogApp { key: "rakuten", name: "Rakuten TV" },
    CatalogApp { key: "deezer", name: "Deezer" },
    CatalogApp { key: "tidal", name: "TIDAL" },
    CatalogApp { key: "twitch", name: "Twitch" },
    CatalogApp { key: "appletv", name: "Apple TV" },
];

pub fn lookup(key: &str) -> Option<&'static CatalogApp> {
    APPS.iter().find(|app| app.key == key)
}

/// Display name for an app reported by the TV
///
/// Unknown apps get their first letter upper-cased and the rest lower-cased.
pub fn display_name(reported: &str) -> String {
    let key = reported.to_lowercase();
    match lookup(&key) {
        Some(app) => app.name.to_string(),
        None => capitalize(reported),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        assert_eq!(display_name("Netflix"), "Netflix");
        assert_eq!(display_name("AMAZON"), "Prime Video");
        assert_eq!(display_name("youtube"), "YouTube");
    }

    #[test]
    fn test_unknown_app_capitalized() {
        assert_eq!(display_name("myCUSTOMapp"), "Mycustomapp");
        assert_eq!(display_name(""), "");
    }
}
