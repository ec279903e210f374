use crate::config::Config;
use crate::connection::Connection;
use crate::error::{Result, YeelightError};
use crate::protocol::{Method, Request, Response};
use crate::types::{DeviceInfo, PowerMode, Transition};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Largest 24-bit RGB value
pub const MAX_RGB: u32 = 0xFF_FFFF;

/// Accepted color temperature range in Kelvin
pub const COLOR_TEMPERATURE_RANGE: std::ops::RangeInclusive<u16> = 1700..=6500;

/// A single light: its descriptor plus the connection used to command it
///
/// Cloning a `Device` is cheap; clones share the same connection.
///
/// # Example
///
/// ```no_run
/// use yeelight_lan::{Config, Device, Transition};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let announcement = b"HTTP/1.1 200 OK\r\nid: 0x1\r\nlocation: yeelight://192.168.1.10:55443\r\n\
///         model: color\r\nfw_ver: 18\r\n";
///     let device = Device::from_announcement(announcement, Config::default())?;
///     device.connect().await?;
///     device.set_power(true, Transition::default(), Default::default()).await?;
///     device.set_rgb(0xFF0000, Transition::default()).await?;
///     let props = device.get_properties(&["power", "bright"]).await?;
///     println!("{:?}", props);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Device {
    info: Arc<DeviceInfo>,
    connection: Arc<Connection>,
    health_timeout: Duration,
}

impl Device {
    /// Create a device from an already parsed descriptor. No connection is made.
    pub fn new(info: DeviceInfo, config: Config) -> Self {
        let health_timeout = config.health_timeout();
        let connection = Connection::new(&info, config);
        tracing::debug!("Device initialized for {} at {}", info.label(), info.address());

        Self {
            info: Arc::new(info),
            connection: Arc::new(connection),
            health_timeout,
        }
    }

    /// Parse a raw announcement payload and create a device from it
    pub fn from_announcement(data: &[u8], config: Config) -> Result<Self> {
        let text = String::from_utf8_lossy(data);
        let info = DeviceInfo::from_announcement(&text)?;
        Ok(Self::new(info, config))
    }

    /// Get the parsed descriptor
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Get the device id
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Get the underlying connection
    pub fn connection(&self) -> Arc<Connection> {
        self.connection.clone()
    }

    /// Open a fresh stream to the device, replacing any existing one
    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    /// Close the stream; outstanding requests fail with `ConnectionClosed`
    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    /// Whether a live stream is currently open
    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// Check liveness with a short `get_prop power` round trip
    ///
    /// Any reply, including an error object, counts as healthy.
    pub async fn is_healthy(&self) -> bool {
        let request = Request::new(Method::GetProp, vec![json!("power")]);
        match self
            .connection
            .send_request_with_timeout(request, self.health_timeout)
            .await
        {
            Ok(_) => true,
            // an error object is still an answer
            Err(YeelightError::Device { .. }) => true,
            Err(e) => {
                tracing::debug!("Health check failed for {}: {}", self.info.label(), e);
                false
            }
        }
    }

    /// Send an arbitrary method with raw parameters
    pub async fn send_command(&self, method: Method, params: Vec<Value>) -> Result<Response> {
        self.connection.send_request(Request::new(method, params)).await
    }

    /// Query properties by name
    ///
    /// The device answers with one value per requested name. Values are mapped
    /// back by position; empty or null values (unsupported properties) are left
    /// out of the result.
    pub async fn get_properties<S: AsRef<str>>(&self, names: &[S]) -> Result<BTreeMap<String, Value>> {
        if names.is_empty() {
            return Err(YeelightError::InvalidParameter(
                "At least one property must be specified".to_string(),
            ));
        }

        let params = names.iter().map(|n| json!(n.as_ref())).collect();
        let response = self.send_command(Method::GetProp, params).await?;

        Ok(map_properties(names, response.result.as_deref().unwrap_or_default()))
    }

    /// Switch the light on or off
    pub async fn set_power(&self, on: bool, transition: Transition, mode: PowerMode) -> Result<()> {
        let params = vec![
            json!(if on { "on" } else { "off" }),
            json!(transition.effect.as_str()),
            json!(transition.duration_ms),
            json!(mode.code()),
        ];
        self.send_command(Method::SetPower, params).await?;
        Ok(())
    }

    /// Set the color as a 24-bit RGB value (`0xRRGGBB`)
    pub async fn set_rgb(&self, rgb: u32, transition: Transition) -> Result<()> {
        if rgb > MAX_RGB {
            return Err(YeelightError::InvalidParameter(format!(
                "RGB value must be between 0 and {}, got {}",
                MAX_RGB, rgb
            )));
        }

        let params = vec![
            json!(rgb),
            json!(transition.effect.as_str()),
            json!(transition.duration_ms),
        ];
        self.send_command(Method::SetRgb, params).await?;
        Ok(())
    }

    /// Set hue (0-359) and saturation (0-100)
    pub async fn set_hsv(&self, hue: u16, sat: u8, transition: Transition) -> Result<()> {
        if hue > 359 {
            return Err(YeelightError::InvalidParameter(format!(
                "Hue must be between 0 and 359, got {}",
                hue
            )));
        }
        if sat > 100 {
            return Err(YeelightError::InvalidParameter(format!(
                "Saturation must be between 0 and 100, got {}",
                sat
            )));
        }

        let params = vec![
            json!(hue),
            json!(sat),
            json!(transition.effect.as_str()),
            json!(transition.duration_ms),
        ];
        self.send_command(Method::SetHsv, params).await?;
        Ok(())
    }

    /// Set brightness in percent (1-100)
    pub async fn set_brightness(&self, bright: u8, transition: Transition) -> Result<()> {
        if !(1..=100).contains(&bright) {
            return Err(YeelightError::InvalidParameter(format!(
                "Brightness must be between 1 and 100, got {}",
                bright
            )));
        }

        let params = vec![
            json!(bright),
            json!(transition.effect.as_str()),
            json!(transition.duration_ms),
        ];
        self.send_command(Method::SetBright, params).await?;
        Ok(())
    }

    /// Set white color temperature in Kelvin (1700-6500)
    pub async fn set_color_temperature(&self, kelvin: u16, transition: Transition) -> Result<()> {
        if !COLOR_TEMPERATURE_RANGE.contains(&kelvin) {
            return Err(YeelightError::InvalidParameter(format!(
                "Color temperature must be between {} and {}, got {}",
                COLOR_TEMPERATURE_RANGE.start(),
                COLOR_TEMPERATURE_RANGE.end(),
                kelvin
            )));
        }

        let params = vec![
            json!(kelvin),
            json!(transition.effect.as_str()),
            json!(transition.duration_ms),
        ];
        self.send_command(Method::SetCtAbx, params).await?;
        Ok(())
    }

    /// Toggle power
    pub async fn toggle(&self) -> Result<()> {
        self.send_command(Method::Toggle, vec![]).await?;
        Ok(())
    }

    /// Store the current state as the power-on default
    pub async fn set_default(&self) -> Result<()> {
        self.send_command(Method::SetDefault, vec![]).await?;
        Ok(())
    }

    /// Rename the device
    pub async fn set_name(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(YeelightError::InvalidParameter("Name must not be empty".to_string()));
        }
        self.send_command(Method::SetName, vec![json!(name)]).await?;
        Ok(())
    }
}

/// Pair requested names with result values by position
fn map_properties<S: AsRef<str>>(names: &[S], values: &[Value]) -> BTreeMap<String, Value> {
    names
        .iter()
        .zip(values)
        .filter(|(_, value)| !matches!(value, Value::Null) && value.as_str() != Some(""))
        .map(|(name, value)| (name.as_ref().to_string(), value.clone()))
        .collect()
}
