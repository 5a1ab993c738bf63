use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Crawlers and link-preview fetchers, matched as lowercase substrings.
const BOT_SIGNATURES: &[&str] = &[
    "facebookexternalhit",
    "googlebot",
    "adsbot-google",
    "google-inspectiontool",
    "bingbot",
    "baiduspider",
    "yandexbot",
    "duckduckbot",
    "applebot",
    "slackbot",
    "discordbot",
    "twitterbot",
    "linkedinbot",
    "pinterestbot",
    "petalbot",
    "semrushbot",
    "ahrefsbot",
];

static MOBILE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(mobile|iphone|ipod|android|blackberry|iemobile|opera mini|phone)")
        .expect("mobile user agent pattern must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Bot,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "DESKTOP",
            DeviceType::Mobile => "MOBILE",
            DeviceType::Bot => "BOT",
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DESKTOP" => Ok(DeviceType::Desktop),
            "MOBILE" => Ok(DeviceType::Mobile),
            "BOT" => Ok(DeviceType::Bot),
            other => Err(format!("unknown device type: {other}")),
        }
    }
}

/// Bot signatures win over mobile tokens; anything unrecognised, including a
/// missing header, counts as desktop.
pub fn detect_device_type(user_agent: Option<&str>) -> DeviceType {
    let Some(user_agent) = user_agent.filter(|ua| !ua.is_empty()) else {
        return DeviceType::Desktop;
    };
    let normalized = user_agent.to_lowercase();

    if BOT_SIGNATURES
        .iter()
        .any(|signature| normalized.contains(signature))
    {
        return DeviceType::Bot;
    }

    if MOBILE_PATTERN.is_match(&normalized) {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}
