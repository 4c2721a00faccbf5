use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of persisted event kinds (spec.md §3: "kind values are
/// closed; insert rejected otherwise").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Console,
    Error,
    Network,
    Nav,
    Ui,
    ElementRef,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Console => "console",
            EventKind::Error => "error",
            EventKind::Network => "network",
            EventKind::Nav => "nav",
            EventKind::Ui => "ui",
            EventKind::ElementRef => "element_ref",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "console" => EventKind::Console,
            "error" => EventKind::Error,
            "network" => EventKind::Network,
            "nav" => EventKind::Nav,
            "ui" => EventKind::Ui,
            "element_ref" => EventKind::ElementRef,
            _ => return Err(()),
        })
    }
}

/// Maps a wire `eventType` string (spec.md §6) onto the closed, persisted
/// `EventKind` set (spec.md §4.1). The source carries two sibling mapping
/// tables of differing length; this follows the longer, canonical one (see
/// DESIGN.md's resolution of the kind-mapping open question): every UI
/// action kind collapses to `Ui`, unknown types fall back to `Ui` rather
/// than being rejected.
pub fn normalize_event_kind(wire_event_type: &str) -> EventKind {
    match wire_event_type {
        "navigation" => EventKind::Nav,
        "console" => EventKind::Console,
        "error" => EventKind::Error,
        "network" => EventKind::Network,
        "element_ref" => EventKind::ElementRef,
        "click" | "scroll" | "input" | "change" | "submit" | "focus" | "blur" | "keydown"
        | "custom" | "ui_snapshot" => EventKind::Ui,
        _ => EventKind::Ui,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkInitiator {
    Fetch,
    Xhr,
    Img,
    Script,
    Other,
}

impl NetworkInitiator {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkInitiator::Fetch => "fetch",
            NetworkInitiator::Xhr => "xhr",
            NetworkInitiator::Img => "img",
            NetworkInitiator::Script => "script",
            NetworkInitiator::Other => "other",
        }
    }

    /// Unknown initiator strings coerce to `Other` rather than erroring
    /// (used by ingest and by import, spec.md §4.4).
    pub fn parse_or_other(s: &str) -> Self {
        match s {
            "fetch" => NetworkInitiator::Fetch,
            "xhr" => NetworkInitiator::Xhr,
            "img" => NetworkInitiator::Img,
            "script" => NetworkInitiator::Script,
            _ => NetworkInitiator::Other,
        }
    }
}

impl fmt::Display for NetworkInitiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorClass {
    Timeout,
    Cors,
    Dns,
    Blocked,
    HttpError,
    Unknown,
}

impl NetworkErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkErrorClass::Timeout => "timeout",
            NetworkErrorClass::Cors => "cors",
            NetworkErrorClass::Dns => "dns",
            NetworkErrorClass::Blocked => "blocked",
            NetworkErrorClass::HttpError => "http_error",
            NetworkErrorClass::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "timeout" => NetworkErrorClass::Timeout,
            "cors" => NetworkErrorClass::Cors,
            "dns" => NetworkErrorClass::Dns,
            "blocked" => NetworkErrorClass::Blocked,
            "http_error" => NetworkErrorClass::HttpError,
            "unknown" => NetworkErrorClass::Unknown,
            _ => return None,
        })
    }
}

impl fmt::Display for NetworkErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotTrigger {
    Click,
    Manual,
    Navigation,
    Error,
}

impl SnapshotTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotTrigger::Click => "click",
            SnapshotTrigger::Manual => "manual",
            SnapshotTrigger::Navigation => "navigation",
            SnapshotTrigger::Error => "error",
        }
    }
}

impl fmt::Display for SnapshotTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SnapshotTrigger {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "click" => SnapshotTrigger::Click,
            "manual" => SnapshotTrigger::Manual,
            "navigation" => SnapshotTrigger::Navigation,
            "error" => SnapshotTrigger::Error,
            _ => return Err(()),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotMode {
    Dom,
    Png,
    Both,
}

impl SnapshotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotMode::Dom => "dom",
            SnapshotMode::Png => "png",
            SnapshotMode::Both => "both",
        }
    }
}

impl fmt::Display for SnapshotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SnapshotMode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "dom" => SnapshotMode::Dom,
            "png" => SnapshotMode::Png,
            "both" => SnapshotMode::Both,
            _ => return Err(()),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StyleMode {
    ComputedLite,
    ComputedFull,
}

impl StyleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleMode::ComputedLite => "computed-lite",
            StyleMode::ComputedFull => "computed-full",
        }
    }
}

impl fmt::Display for StyleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StyleMode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "computed-lite" => StyleMode::ComputedLite,
            "computed-full" => StyleMode::ComputedFull,
            _ => return Err(()),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    ManualStop,
    NetworkError,
    StaleTimeout,
    NormalClosure,
    AbnormalClose,
    Unknown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::ManualStop => "manual_stop",
            DisconnectReason::NetworkError => "network_error",
            DisconnectReason::StaleTimeout => "stale_timeout",
            DisconnectReason::NormalClosure => "normal_closure",
            DisconnectReason::AbnormalClose => "abnormal_close",
            DisconnectReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_kind_mapping_sends_all_ui_actions_to_ui() {
        for ty in ["click", "scroll", "input", "change", "submit", "focus", "blur", "keydown"] {
            assert_eq!(normalize_event_kind(ty), EventKind::Ui, "{ty}");
        }
    }

    #[test]
    fn unknown_wire_type_falls_back_to_ui() {
        assert_eq!(normalize_event_kind("totally_unrecognized"), EventKind::Ui);
    }

    #[test]
    fn navigation_maps_to_nav() {
        assert_eq!(normalize_event_kind("navigation"), EventKind::Nav);
    }

    #[test]
    fn initiator_unknown_coerces_to_other() {
        assert_eq!(NetworkInitiator::parse_or_other("beacon"), NetworkInitiator::Other);
    }

    #[test]
    fn event_kind_roundtrips_through_str() {
        for kind in [
            EventKind::Console,
            EventKind::Error,
            EventKind::Network,
            EventKind::Nav,
            EventKind::Ui,
            EventKind::ElementRef,
        ] {
            let s = kind.as_str();
            let parsed: EventKind = s.parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }
}
