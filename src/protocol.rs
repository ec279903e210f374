use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id linking a request to its reply
pub type RequestId = u32;

/// Line terminator required by the device for every request
pub const LINE_TERMINATOR: &str = "\r\n";

/// Command request sent over the device stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub method: Method,
    pub params: Vec<Value>,
}

/// Reply (or unsolicited notification) received from the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Set on notifications (`props`), which carry no id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DeviceError>,
}

/// Error object returned by the device in place of a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Device methods
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    GetProp,
    SetCtAbx,
    SetRgb,
    SetHsv,
    SetBright,
    SetPower,
    Toggle,
    SetDefault,
    StartCf,
    StopCf,
    SetScene,
    CronAdd,
    CronGet,
    CronDel,
    SetAdjust,
    SetMusic,
    SetName,
    BgSetRgb,
    BgSetHsv,
    BgSetCtAbx,
    BgStartCf,
    BgStopCf,
    BgSetScene,
    BgSetDefault,
    BgSetPower,
    BgSetBright,
    BgSetAdjust,
    BgToggle,
    DevToggle,
    AdjustBright,
    AdjustCt,
    AdjustColor,
    BgAdjustBright,
    BgAdjustCt,
}

impl Method {
    /// Wire name of the method, as advertised in the `support` header
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GetProp => "get_prop",
            Method::SetCtAbx => "set_ct_abx",
            Method::SetRgb => "set_rgb",
            Method::SetHsv => "set_hsv",
            Method::SetBright => "set_bright",
            Method::SetPower => "set_power",
            Method::Toggle => "toggle",
            Method::SetDefault => "set_default",
            Method::StartCf => "start_cf",
            Method::StopCf => "stop_cf",
            Method::SetScene => "set_scene",
            Method::CronAdd => "cron_add",
            Method::CronGet => "cron_get",
            Method::CronDel => "cron_del",
            Method::SetAdjust => "set_adjust",
            Method::SetMusic => "set_music",
            Method::SetName => "set_name",
            Method::BgSetRgb => "bg_set_rgb",
            Method::BgSetHsv => "bg_set_hsv",
            Method::BgSetCtAbx => "bg_set_ct_abx",
            Method::BgStartCf => "bg_start_cf",
            Method::BgStopCf => "bg_stop_cf",
            Method::BgSetScene => "bg_set_scene",
            Method::BgSetDefault => "bg_set_default",
            Method::BgSetPower => "bg_set_power",
            Method::BgSetBright => "bg_set_bright",
            Method::BgSetAdjust => "bg_set_adjust",
            Method::BgToggle => "bg_toggle",
            Method::DevToggle => "dev_toggle",
            Method::AdjustBright => "adjust_bright",
            Method::AdjustCt => "adjust_ct",
            Method::AdjustColor => "adjust_color",
            Method::BgAdjustBright => "bg_adjust_bright",
            Method::BgAdjustCt => "bg_adjust_ct",
        }
    }
}

impl Request {
    /// Create a new request; the id is assigned when the request is sent
    pub fn new(method: Method, params: Vec<Value>) -> Self {
        Self {
            id: 0,
            method,
            params,
        }
    }

    /// Serialize to a single CRLF-terminated line
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push_str(LINE_TERMINATOR);
        Ok(line)
    }
}

/// Longest partial frame kept while waiting for a line terminator
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Reassembles newline-delimited frames across socket reads
///
/// Bytes are buffered until a `\n` is seen; every complete line is yielded
/// trimmed, and blank lines are discarded. A trailing partial line stays
/// buffered for the next read unless it grows past [`MAX_FRAME_LEN`], in which
/// case it is discarded.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line it finishes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let frame: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&frame);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }

        if self.buf.len() > MAX_FRAME_LEN {
            tracing::warn!("Dropping {} bytes without a line terminator", self.buf.len());
            self.buf.clear();
        }
        lines
    }

    /// Number of bytes waiting for a line terminator
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}
