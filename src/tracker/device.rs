//! Coarse device descriptor from a user-agent string

use crate::domain::event::DeviceInfo;

const MOBILE_MARKERS: [&str; 8] =
    ["Android", "webOS", "iPhone", "iPad", "iPod", "BlackBerry", "IEMobile", "Opera Mini"];

fn browser(ua: &str) -> &'static str {
    // Edge and Chrome UAs both mention Safari; Edge also mentions Chrome
    if ua.contains("Edg") {
        "Edge"
    } else if ua.contains("Firefox") {
        "Firefox"
    } else if ua.contains("Chrome") {
        "Chrome"
    } else if ua.contains("Safari") {
        "Safari"
    } else {
        "Unknown"
    }
}

fn os(ua: &str) -> &'static str {
    if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else if ua.contains("Mac") {
        "macOS"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        "Unknown"
    }
}

pub fn device_info_from_user_agent(ua: &str, screen_size: Option<&str>) -> DeviceInfo {
    let lower = ua.to_ascii_lowercase();
    DeviceInfo {
        browser: Some(browser(ua).to_string()),
        os: Some(os(ua).to_string()),
        screen_size: screen_size.map(str::to_string),
        is_mobile: Some(MOBILE_MARKERS.iter().any(|m| lower.contains(&m.to_ascii_lowercase()))),
    }
}
