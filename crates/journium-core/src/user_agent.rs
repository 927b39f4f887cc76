// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Coarse user-agent classification.
//!
//! Every check is an ordered substring test and the first match wins. Order
//! matters: Edge and Opera carry the `Chrome` token, Chrome carries `Safari`,
//! iPadOS and iOS carry `Mac OS X`, and Android carries `Linux`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Browser {
	Edge,
	Opera,
	Firefox,
	Chrome,
	Safari,
	Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Os {
	Windows,
	#[serde(rename = "iOS")]
	Ios,
	#[serde(rename = "macOS")]
	MacOs,
	Android,
	Linux,
	Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
	Mobile,
	Tablet,
	Desktop,
}

const BROWSER_RULES: &[(&[&str], Browser)] = &[
	(&["Edg/", "Edge/", "EdgA/", "EdgiOS/"], Browser::Edge),
	(&["OPR/", "Opera"], Browser::Opera),
	(&["Firefox/", "FxiOS/"], Browser::Firefox),
	(&["Chrome/", "CriOS/", "Chromium/"], Browser::Chrome),
	(&["Safari/"], Browser::Safari),
];

const OS_RULES: &[(&[&str], Os)] = &[
	(&["Windows"], Os::Windows),
	(&["iPhone", "iPad", "iPod"], Os::Ios),
	(&["Mac OS X", "Macintosh"], Os::MacOs),
	(&["Android"], Os::Android),
	(&["Linux", "X11"], Os::Linux),
];

/// Browser, OS and device class derived from a user-agent string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentInfo {
	pub browser: Browser,
	pub os: Os,
	pub device_type: DeviceType,
}

impl UserAgentInfo {
	pub fn parse(user_agent: &str) -> Self {
		Self {
			browser: first_match(user_agent, BROWSER_RULES).unwrap_or(Browser::Unknown),
			os: first_match(user_agent, OS_RULES).unwrap_or(Os::Unknown),
			device_type: device_type(user_agent),
		}
	}

	pub fn browser_name(&self) -> &'static str {
		match self.browser {
			Browser::Edge => "Edge",
			Browser::Opera => "Opera",
			Browser::Firefox => "Firefox",
			Browser::Chrome => "Chrome",
			Browser::Safari => "Safari",
			Browser::Unknown => "Unknown",
		}
	}

	pub fn os_name(&self) -> &'static str {
		match self.os {
			Os::Windows => "Windows",
			Os::Ios => "iOS",
			Os::MacOs => "macOS",
			Os::Android => "Android",
			Os::Linux => "Linux",
			Os::Unknown => "Unknown",
		}
	}

	pub fn device_type_name(&self) -> &'static str {
		match self.device_type {
			DeviceType::Mobile => "mobile",
			DeviceType::Tablet => "tablet",
			DeviceType::Desktop => "desktop",
		}
	}
}

fn first_match<T: Copy>(user_agent: &str, rules: &[(&[&str], T)]) -> Option<T> {
	rules
		.iter()
		.find(|(tokens, _)| tokens.iter().any(|token| user_agent.contains(token)))
		.map(|(_, value)| *value)
}

fn device_type(user_agent: &str) -> DeviceType {
	if user_agent.contains("iPad") || user_agent.contains("Tablet") {
		DeviceType::Tablet
	} else if user_agent.contains("Mobi") || user_agent.contains("iPhone") {
		DeviceType::Mobile
	} else if user_agent.contains("Android") {
		// Android phones advertise "Mobile"; the rest are tablets.
		DeviceType::Tablet
	} else {
		DeviceType::Desktop
	}
}
