use crate::error::{Result, YeelightError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Device identifier (the `id` header, e.g. `0x000000000015243f`)
pub type DeviceId = String;

/// Status line every announcement and discovery reply starts with
pub const ANNOUNCEMENT_STATUS_LINE: &str = "HTTP/1.1 200 OK";

const DEFAULT_DEVICE_NAME: &str = "Unknown Device";

/// Identity and capabilities of one device, parsed from its announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub id: DeviceId,

    /// Advertised location, `yeelight://host:port`
    pub location: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub firmware_version: String,

    /// Method names the device accepts
    #[serde(default)]
    pub support: Vec<String>,

    /// State at announcement time. Not kept in sync; query properties for live values.
    pub state: DeviceState,
}

/// State snapshot carried in the announcement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub power: bool,
    pub brightness: Option<u32>,
    pub color_mode: Option<String>,
    pub color_temperature: Option<u32>,
    pub rgb: Option<u32>,
    pub hue: Option<u32>,
    pub saturation: Option<u32>,
}

impl DeviceInfo {
    /// Parse a header-style announcement (discovery reply or advertisement)
    ///
    /// # Example
    ///
    /// ```
    /// use yeelight_lan::DeviceInfo;
    ///
    /// let info = DeviceInfo::from_announcement(
    ///     "HTTP/1.1 200 OK\r\nid: 123\r\nlocation: yeelight://192.168.1.10:55443\r\n\
    ///      model: color\r\nfw_ver: 18\r\npower: on\r\n",
    /// ).unwrap();
    /// assert_eq!(info.host, "192.168.1.10");
    /// assert_eq!(info.port, 55443);
    /// assert!(info.state.power);
    /// ```
    pub fn from_announcement(text: &str) -> Result<Self> {
        let mut lines = text.lines();

        let status = lines.next().unwrap_or_default().trim_end();
        if status != ANNOUNCEMENT_STATUS_LINE {
            return Err(YeelightError::InvalidAnnouncement(format!(
                "expected '{}', got '{}'",
                ANNOUNCEMENT_STATUS_LINE, status
            )));
        }

        let headers = parse_headers(lines);
        let header = |key: &str| headers.get(key).map(String::as_str);

        let id = required(header("id"), "id")?;
        let location = required(header("location"), "location")?;
        let (host, port) = parse_location(&location)?;
        let model = required(header("model"), "model")?;
        let firmware_version = required(header("fw_ver"), "fw_ver")?;

        let support = header("support")
            .map(|s| {
                s.split([',', ' '])
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let state = DeviceState {
            power: header("power") == Some("on"),
            brightness: header("bright").and_then(|v| v.parse().ok()),
            color_mode: header("color_mode").map(str::to_string),
            color_temperature: header("ct").and_then(|v| v.parse().ok()),
            rgb: header("rgb").and_then(|v| v.parse().ok()),
            hue: header("hue").and_then(|v| v.parse().ok()),
            saturation: header("sat").and_then(|v| v.parse().ok()),
        };

        Ok(Self {
            name: header("name").unwrap_or(DEFAULT_DEVICE_NAME).to_string(),
            id,
            location,
            host,
            port,
            model,
            firmware_version,
            support,
            state,
        })
    }

    /// Whether the device advertised support for `method`
    pub fn supports(&self, method: &str) -> bool {
        self.support.iter().any(|m| m == method)
    }

    /// `host:port` of the command stream
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Human-readable label used in logs and errors
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.id)
    }
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        headers.insert(key.to_ascii_lowercase(), value.to_string());
    }
    headers
}

fn required(value: Option<&str>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| YeelightError::InvalidAnnouncement(format!("missing required field '{}'", field)))
}

/// Split `scheme://host:port` into host and port
fn parse_location(location: &str) -> Result<(String, u16)> {
    let invalid = || YeelightError::InvalidAnnouncement(format!("malformed location '{}'", location));

    let (_, authority) = location.split_once("://").ok_or_else(invalid)?;
    let authority = authority.trim_end_matches('/');
    let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;

    if host.is_empty() || port == 0 {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}

/// Transition effect for state-changing commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    #[default]
    Smooth,
    Sudden,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Smooth => "smooth",
            Effect::Sudden => "sudden",
        }
    }
}

/// Effect and duration applied to a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub effect: Effect,
    /// Duration in milliseconds; ignored by the device for `Sudden`
    pub duration_ms: u32,
}

impl Default for Transition {
    fn default() -> Self {
        Self {
            effect: Effect::Smooth,
            duration_ms: 500,
        }
    }
}

impl Transition {
    pub fn sudden() -> Self {
        Self {
            effect: Effect::Sudden,
            ..Self::default()
        }
    }

    pub fn smooth(duration_ms: u32) -> Self {
        Self {
            effect: Effect::Smooth,
            duration_ms,
        }
    }
}

/// Mode the light switches into when powered on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    #[default]
    Normal,
    Ct,
    Rgb,
    Hsv,
    Flow,
    Night,
}

impl PowerMode {
    /// Numeric code sent on the wire
    pub fn code(&self) -> u8 {
        match self {
            PowerMode::Normal => 0,
            PowerMode::Ct => 1,
            PowerMode::Rgb => 2,
            PowerMode::Hsv => 3,
            PowerMode::Flow => 4,
            PowerMode::Night => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANNOUNCEMENT: &str = "HTTP/1.1 200 OK\r\nid: 123\r\nlocation: yeelight://192.168.1.10:55443\r\nmodel: color\r\nfw_ver: 18\r\nsupport: set_power,get_prop\r\npower: on\r\nbright: 80\r\n";

    #[test]
    fn test_parse_announcement() {
        let info = DeviceInfo::from_announcement(ANNOUNCEMENT).unwrap();
        assert_eq!(info.id, "123");
        assert_eq!(info.host, "192.168.1.10");
        assert_eq!(info.port, 55443);
        assert_eq!(info.model, "color");
        assert_eq!(info.firmware_version, "18");
        assert_eq!(info.name, "Unknown Device");
        assert_eq!(info.support, vec!["set_power", "get_prop"]);
        assert!(info.state.power);
        assert_eq!(info.state.brightness, Some(80));
        assert_eq!(info.state.color_temperature, None);
        assert_eq!(info.state.rgb, None);
        assert!(info.supports("get_prop"));
        assert!(!info.supports("set_rgb"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let first = DeviceInfo::from_announcement(ANNOUNCEMENT).unwrap();
        let second = DeviceInfo::from_announcement(ANNOUNCEMENT).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_real_discovery_reply() {
        let reply = "HTTP/1.1 200 OK\r\n\
            Cache-Control: max-age=3600\r\n\
            Date: \r\n\
            Ext: \r\n\
            Location: yeelight://192.168.1.239:55443\r\n\
            Server: POSIX UPnP/1.0 YGLC/1\r\n\
            id: 0x000000000015243f\r\n\
            model: color\r\n\
            fw_ver: 18\r\n\
            support: get_prop set_default set_power toggle set_bright start_cf stop_cf set_scene\r\n\
            power: off\r\n\
            bright: 100\r\n\
            color_mode: 2\r\n\
            ct: 4000\r\n\
            rgb: 16711680\r\n\
            hue: 100\r\n\
            sat: 35\r\n\
            name: bedroom\r\n";
        let info = DeviceInfo::from_announcement(reply).unwrap();
        assert_eq!(info.id, "0x000000000015243f");
        assert_eq!(info.name, "bedroom");
        assert_eq!(info.address(), "192.168.1.239:55443");
        assert!(!info.state.power);
        assert_eq!(info.state.color_mode.as_deref(), Some("2"));
        assert_eq!(info.state.rgb, Some(16711680));
        assert_eq!(info.state.saturation, Some(35));
        assert!(info.supports("set_scene"));
        assert_eq!(info.support.len(), 8);
    }

    #[test]
    fn test_wrong_status_line() {
        let text = ANNOUNCEMENT.replace("HTTP/1.1 200 OK", "NOTIFY * HTTP/1.1");
        assert!(matches!(
            DeviceInfo::from_announcement(&text),
            Err(YeelightError::InvalidAnnouncement(_))
        ));
    }

    #[test]
    fn test_missing_required_fields() {
        for field in ["id: 123\r\n", "model: color\r\n", "fw_ver: 18\r\n", "location: yeelight://192.168.1.10:55443\r\n"] {
            let text = ANNOUNCEMENT.replace(field, "");
            assert!(
                DeviceInfo::from_announcement(&text).is_err(),
                "parse should fail without {}",
                field.trim()
            );
        }
    }

    #[test]
    fn test_malformed_location() {
        for location in ["192.168.1.10:55443", "yeelight://192.168.1.10", "yeelight://:55443", "yeelight://host:0", "yeelight://host:abc"] {
            let text = ANNOUNCEMENT.replace("yeelight://192.168.1.10:55443", location);
            assert!(DeviceInfo::from_announcement(&text).is_err(), "{} should be rejected", location);
        }
    }

    #[test]
    fn test_power_mode_codes() {
        assert_eq!(PowerMode::default().code(), 0);
        assert_eq!(PowerMode::Night.code(), 5);
        assert_eq!(Effect::default().as_str(), "smooth");
        assert_eq!(Transition::default().duration_ms, 500);
        assert_eq!(Transition::sudden().effect, Effect::Sudden);
    }
}
