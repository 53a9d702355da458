//! Heuristic User-Agent classification
//!
//! Plain substring checks, first match wins. The browser order means Chrome
//! and every Chromium-derived agent report "Chrome", while other agents that
//! mention "Safari" (including Android WebViews without a Chrome token)
//! report "Safari". Edge is only reached when none of the earlier markers
//! appear.

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub device_type: &'static str,
    pub os: &'static str,
    pub browser: &'static str,
}

impl UserAgentInfo {
    fn unknown() -> Self {
        Self {
            device_type: UNKNOWN,
            os: UNKNOWN,
            browser: UNKNOWN,
        }
    }
}

const OS_MARKERS: &[(&[&str], &str)] = &[
    (&["windows"], "Windows"),
    (&["macintosh"], "Mac OS"),
    // Android agents also carry "Linux"
    (&["android"], "Android"),
    (&["linux"], "Linux"),
    (&["iphone", "ipad"], "iOS"),
];

const BROWSER_MARKERS: &[(&str, &str)] = &[
    ("chrome", "Chrome"),
    ("firefox", "Firefox"),
    ("safari", "Safari"),
    ("edge", "Edge"),
];

/// Classify a raw User-Agent header into device, OS and browser
pub fn parse(user_agent: &str) -> UserAgentInfo {
    if user_agent.is_empty() {
        return UserAgentInfo::unknown();
    }

    let ua = user_agent.to_lowercase();

    let device_type = if ua.contains("mobile") {
        "Mobile"
    } else if ua.contains("tablet") {
        "Tablet"
    } else {
        "PC"
    };

    let os = OS_MARKERS
        .iter()
        .find(|(markers, _)| markers.iter().any(|m| ua.contains(m)))
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN);

    let browser = BROWSER_MARKERS
        .iter()
        .find(|(marker, _)| ua.contains(marker))
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN);

    UserAgentInfo { device_type, os, browser }
}
