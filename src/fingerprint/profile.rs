use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    Windows,
    MacOs,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Safari,
}

impl BrowserFamily {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserFamily::Chrome => "Chrome",
            BrowserFamily::Firefox => "Firefox",
            BrowserFamily::Safari => "Safari",
        }
    }
}

/// A coherent browser fingerprint: User-Agent plus the companion headers
/// that browser would actually send.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub accept: String,
    pub platform: Platform,
    pub browser: BrowserFamily,
    pub browser_version: String,
}

impl BrowserProfile {
    /// Baseline header set shared by every request the profile fronts.
    pub fn to_headers(&self) -> HashMap<String, String> {
        HashMap::from([
            ("User-Agent".to_string(), self.user_agent.clone()),
            ("Accept-Language".to_string(), self.accept_language.clone()),
            ("Accept-Encoding".to_string(), self.accept_encoding.clone()),
            ("Accept".to_string(), self.accept.clone()),
        ])
    }

    pub fn major_version(&self) -> &str {
        self.browser_version
            .split('.')
            .next()
            .unwrap_or(&self.browser_version)
    }
}
