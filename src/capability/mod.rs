// Fetchline - Media Transfer Core
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Runtime capability detection
//!
//! Classifies the environment a transfer runs in into exactly one
//! [`DeliveryProfile`]. Classification only looks at static signals (user
//! agent, platform identifier, touch points, presence of the legacy save
//! API) and is deterministic for a fixed set of signals.
//!
//! # Classification order
//! 1. Legacy save API present, or an `MSIE`/`Trident` agent -> `legacy-blob-api`
//! 2. iOS device (including iPadOS reporting `MacIntel` with touch) -> `mobile-constrained-browser`
//! 3. Android or any other mobile agent -> `mobile-standard-browser`
//! 4. Desktop Safari -> `desktop-constrained-browser`
//! 5. Chrome, Firefox, Edge, or a native desktop host -> `desktop-standard-browser`
//! 6. Anything else -> `unknown`

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref IOS_RE: Regex = Regex::new(r"iPad|iPhone|iPod").unwrap();
    static ref ANDROID_RE: Regex = Regex::new(r"(?i)Android").unwrap();
    static ref MOBILE_RE: Regex =
        Regex::new(r"(?i)Android|webOS|iPhone|iPad|iPod|BlackBerry|IEMobile|Opera Mini").unwrap();
    static ref LEGACY_IE_RE: Regex = Regex::new(r"(?i)MSIE|Trident").unwrap();
    static ref DESKTOP_STANDARD_RE: Regex = Regex::new(r"(?i)Chrome|Chromium|Firefox|Edge?/").unwrap();
}

/// Host operating systems treated as a capable native desktop
const NATIVE_DESKTOP_PLATFORMS: &[&str] = &["linux", "macos", "windows", "freebsd", "netbsd", "openbsd"];

/// Discrete classification of the file-saving primitives a runtime offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryProfile {
    MobileConstrainedBrowser,
    MobileStandardBrowser,
    DesktopConstrainedBrowser,
    DesktopStandardBrowser,
    LegacyBlobApi,
    Unknown,
}

impl DeliveryProfile {
    pub const ALL: [DeliveryProfile; 6] = [
        DeliveryProfile::MobileConstrainedBrowser,
        DeliveryProfile::MobileStandardBrowser,
        DeliveryProfile::DesktopConstrainedBrowser,
        DeliveryProfile::DesktopStandardBrowser,
        DeliveryProfile::LegacyBlobApi,
        DeliveryProfile::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryProfile::MobileConstrainedBrowser => "mobile-constrained-browser",
            DeliveryProfile::MobileStandardBrowser => "mobile-standard-browser",
            DeliveryProfile::DesktopConstrainedBrowser => "desktop-constrained-browser",
            DeliveryProfile::DesktopStandardBrowser => "desktop-standard-browser",
            DeliveryProfile::LegacyBlobApi => "legacy-blob-api",
            DeliveryProfile::Unknown => "unknown",
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(
            self,
            DeliveryProfile::MobileConstrainedBrowser | DeliveryProfile::MobileStandardBrowser
        )
    }
}

impl fmt::Display for DeliveryProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DeliveryProfile::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Invalid delivery profile: {}", s))
    }
}

/// Static environment signals used for classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSignals {
    /// Browser user agent, empty for native hosts
    #[serde(default)]
    pub user_agent: String,

    /// Platform identifier (`navigator.platform` in a browser, OS name natively)
    #[serde(default)]
    pub platform: String,

    /// Maximum simultaneous touch points reported by the device
    #[serde(default)]
    pub max_touch_points: u32,

    /// Whether the legacy "save or open blob" API is available
    #[serde(default)]
    pub has_legacy_save_blob: bool,
}

impl EnvironmentSignals {
    /// Signals for a browser described by its user agent
    pub fn browser<S: Into<String>>(user_agent: S) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..Default::default()
        }
    }

    /// Signals describing the process this library runs in
    pub fn native_host() -> Self {
        Self {
            user_agent: String::new(),
            platform: std::env::consts::OS.to_string(),
            max_touch_points: 0,
            has_legacy_save_blob: false,
        }
    }

    fn is_ios(&self) -> bool {
        IOS_RE.is_match(&self.user_agent)
            || (self.platform == "MacIntel" && self.max_touch_points > 1)
    }

    /// Safari with neither "chrome" nor "android" anywhere before it
    fn is_safari(&self) -> bool {
        let ua = self.user_agent.to_ascii_lowercase();
        match ua.find("safari") {
            Some(index) => {
                let prefix = &ua[..index];
                !prefix.contains("chrome") && !prefix.contains("android")
            }
            None => false,
        }
    }

    fn is_native_desktop(&self) -> bool {
        self.user_agent.is_empty() && NATIVE_DESKTOP_PLATFORMS.contains(&self.platform.as_str())
    }
}

/// Classify signals into a delivery profile
pub fn detect(signals: &EnvironmentSignals) -> DeliveryProfile {
    let ua = signals.user_agent.as_str();

    if signals.is_ios() {
        return DeliveryProfile::MobileConstrainedBrowser;
    }
    if ANDROID_RE.is_match(ua) || MOBILE_RE.is_match(ua) {
        return DeliveryProfile::MobileStandardBrowser;
    }
    if signals.has_legacy_save_blob || LEGACY_IE_RE.is_match(ua) {
        return DeliveryProfile::LegacyBlobApi;
    }
    if signals.is_safari() {
        return DeliveryProfile::DesktopConstrainedBrowser;
    }
    if DESKTOP_STANDARD_RE.is_match(ua) || signals.is_native_desktop() {
        return DeliveryProfile::DesktopStandardBrowser;
    }

    DeliveryProfile::Unknown
}

/// Source of the delivery profile for the coordinator
pub trait CapabilityDetector: Send + Sync {
    fn detect(&self) -> DeliveryProfile;
}

impl CapabilityDetector for EnvironmentSignals {
    fn detect(&self) -> DeliveryProfile {
        detect(self)
    }
}

/// A fixed profile, for hosts that already know what they can do
impl CapabilityDetector for DeliveryProfile {
    fn detect(&self) -> DeliveryProfile {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const ANDROID_CHROME: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
    const FIREFOX_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const IE11: &str = "Mozilla/5.0 (Windows NT 10.0; Trident/7.0; rv:11.0) like Gecko";
    const WINDOWS_PHONE: &str = "Mozilla/5.0 (compatible; MSIE 10.0; Windows Phone 8.0; Trident/6.0; IEMobile/10.0; ARM; Touch; NOKIA; Lumia 920)";

    #[test]
    fn test_detect_browsers() {
        assert_eq!(detect(&EnvironmentSignals::browser(CHROME_WIN)), DeliveryProfile::DesktopStandardBrowser);
        assert_eq!(detect(&EnvironmentSignals::browser(FIREFOX_LINUX)), DeliveryProfile::DesktopStandardBrowser);
        assert_eq!(detect(&EnvironmentSignals::browser(SAFARI_MAC)), DeliveryProfile::DesktopConstrainedBrowser);
        assert_eq!(detect(&EnvironmentSignals::browser(IPHONE)), DeliveryProfile::MobileConstrainedBrowser);
        assert_eq!(detect(&EnvironmentSignals::browser(ANDROID_CHROME)), DeliveryProfile::MobileStandardBrowser);
        assert_eq!(detect(&EnvironmentSignals::browser(IE11)), DeliveryProfile::LegacyBlobApi);
    }

    #[test]
    fn test_ipad_desktop_mode() {
        let signals = EnvironmentSignals {
            user_agent: SAFARI_MAC.to_string(),
            platform: "MacIntel".to_string(),
            max_touch_points: 5,
            has_legacy_save_blob: false,
        };
        assert_eq!(detect(&signals), DeliveryProfile::MobileConstrainedBrowser);
    }

    #[test]
    fn test_legacy_api_wins() {
        let signals = EnvironmentSignals {
            has_legacy_save_blob: true,
            ..EnvironmentSignals::browser(CHROME_WIN)
        };
        assert_eq!(detect(&signals), DeliveryProfile::LegacyBlobApi);
    }

    #[test]
    fn test_mobile_checks_precede_legacy() {
        let signals = EnvironmentSignals {
            has_legacy_save_blob: true,
            ..EnvironmentSignals::browser(WINDOWS_PHONE)
        };
        assert_eq!(detect(&signals), DeliveryProfile::MobileStandardBrowser);
        assert_eq!(detect(&EnvironmentSignals::browser(WINDOWS_PHONE)), DeliveryProfile::MobileStandardBrowser);
    }

    #[test]
    fn test_unknown_environment() {
        assert_eq!(detect(&EnvironmentSignals::default()), DeliveryProfile::Unknown);
        assert_eq!(detect(&EnvironmentSignals::browser("curl/8.4.0")), DeliveryProfile::Unknown);
    }

    #[test]
    fn test_native_host_is_deterministic() {
        let signals = EnvironmentSignals {
            platform: "linux".to_string(),
            ..Default::default()
        };
        assert_eq!(detect(&signals), DeliveryProfile::DesktopStandardBrowser);
        assert_eq!(detect(&signals), detect(&signals.clone()));
    }

    #[test]
    fn test_profile_round_trips_through_str() {
        for profile in DeliveryProfile::ALL {
            assert_eq!(profile.as_str().parse::<DeliveryProfile>(), Ok(profile));
        }
        assert!("desktop".parse::<DeliveryProfile>().is_err());
    }
}
