//! Rust library for discovering and controlling Yeelight smart lights on the LAN
//!
//! This library provides an async API for the Yeelight inter-operation
//! protocol. It supports:
//!
//! - Multicast discovery on every local IPv4 interface
//! - One persistent TCP connection per device with correlated requests
//! - Typed commands (power, RGB, HSV, brightness, color temperature, toggle)
//! - Property queries
//! - A registry of devices keyed by id, with bulk connect and health filtering
//!
//! # Quick Start
//!
//! ```no_run
//! use yeelight_lan::{Config, DeviceRegistry, Transition};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = DeviceRegistry::new(Config::default());
//!     let found = registry.discover_and_register().await?;
//!     println!("Found {} light(s)", found);
//!
//!     for device in registry.connect_all(false).await?.values() {
//!         device.set_brightness(50, Transition::default()).await?;
//!         let props = device.get_properties(&["power", "bright"]).await?;
//!         println!("{}: {:?}", device.info().label(), props);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Direct Connection
//!
//! A device can also be built from an announcement received out of band:
//!
//! ```no_run
//! use yeelight_lan::{Config, Device};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let announcement = b"HTTP/1.1 200 OK\r\nid: 0x1\r\nlocation: yeelight://192.168.1.10:55443\r\n\
//!         model: color\r\nfw_ver: 18\r\n";
//!     let device = Device::from_announcement(announcement, Config::default())?;
//!     device.toggle().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Registry**: devices keyed by id, bulk operations
//! - **Discovery**: `M-SEARCH` over UDP multicast (239.255.255.250:1982)
//! - **Device**: typed commands and parameter validation
//! - **Connection**: stream ownership, pending request table, reply dispatch
//! - **Protocol**: JSON request/response structures and line framing
//! - **Types**: device descriptor and command parameter types

mod config;
mod connection;
mod device;
mod discovery;
mod error;
mod protocol;
mod registry;
mod types;

// Public exports
pub use config::Config;
pub use connection::Connection;
pub use device::{Device, COLOR_TEMPERATURE_RANGE, MAX_RGB};
pub use discovery::{DiscoveredDevices, Discovery, DISCOVERY_PORT, MULTICAST_GROUP, SEARCH_QUERY};
pub use error::{Result, YeelightError};
pub use protocol::{DeviceError, LineBuffer, Method, Request, RequestId, Response, MAX_FRAME_LEN};
pub use registry::DeviceRegistry;
pub use types::{DeviceId, DeviceInfo, DeviceState, Effect, PowerMode, Transition};
