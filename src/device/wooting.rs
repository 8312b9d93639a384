//! Wooting keyboard transport over USB HID feature reports.

use hidapi::HidApi;
use hidapi::HidDevice;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;

use super::DeviceError;
use super::DeviceLink;
use super::GET_CURRENT_KEYBOARD_PROFILE_INDEX;
use crate::domain::ProfileIndex;

/// Vendor id of first-generation keyboards (Wooting One/Two).
const LEGACY_VENDOR_ID: u16 = 0x03EB;
const LEGACY_PRODUCT_IDS: [u16; 2] = [0xFF01, 0xFF02];

/// Vendor id of the v2 interface keyboards.
const VENDOR_ID: u16 = 0x31E3;

/// Usage page of the configuration interface.
const CONFIG_USAGE_PAGE: u16 = 0x1337;

/// Feature command report length.
const COMMAND_SIZE: usize = 8;

/// Response buffer length for queries.
const RESPONSE_SIZE: usize = 256;

const RESPONSE_TIMEOUT_MS: i32 = 1000;

/// Magic word prefixing every command (0xDAD0, little endian).
const MAGIC: [u8; 2] = [0xD0, 0xDA];

/// Connected Wooting keyboard.
pub struct WootingDevice {
    device: Mutex<Option<HidDevice>>,
    v2_interface: bool,
    // Held so the HID library stays initialised while the handle is open.
    _api: Mutex<HidApi>,
}

impl WootingDevice {
    /// Open the first Wooting keyboard exposing the configuration interface.
    pub fn open() -> Result<Self, DeviceError> {
        let api = HidApi::new()?;

        let info = api
            .device_list()
            .find(|d| is_wooting(d.vendor_id(), d.product_id()) && d.usage_page() == CONFIG_USAGE_PAGE)
            .ok_or(DeviceError::NotConnected)?;

        info!(
            "Found keyboard: {} {} (VID: 0x{:04X}, PID: 0x{:04X})",
            info.manufacturer_string().unwrap_or("Unknown"),
            info.product_string().unwrap_or("Unknown"),
            info.vendor_id(),
            info.product_id()
        );

        let v2_interface = info.vendor_id() == VENDOR_ID;
        let device = info.open_device(&api)?;

        Ok(Self {
            device: Mutex::new(Some(device)),
            v2_interface,
            _api: Mutex::new(api),
        })
    }
}

impl DeviceLink for WootingDevice {
    fn is_connected(&self) -> bool {
        self.device.lock().is_some()
    }

    fn send_feature(&self, command: u8, profile_arg: u8) -> Result<(), DeviceError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(DeviceError::NotConnected)?;

        debug!("Feature command {} (arg {})", command, profile_arg);
        device.send_feature_report(&command_report(command, profile_arg))?;
        Ok(())
    }

    fn read_active_profile(&self) -> Result<ProfileIndex, DeviceError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(DeviceError::NotConnected)?;

        device.send_feature_report(&command_report(GET_CURRENT_KEYBOARD_PROFILE_INDEX, 0))?;

        let mut buf = [0u8; RESPONSE_SIZE];
        let read = device.read_timeout(&mut buf, RESPONSE_TIMEOUT_MS)?;
        if read != RESPONSE_SIZE {
            return Err(DeviceError::BadResponse(format!(
                "profile query returned {read} bytes, expected {RESPONSE_SIZE}"
            )));
        }

        parse_profile_response(&buf, self.v2_interface)
    }

    fn release(&self) {
        if self.device.lock().take().is_some() {
            info!("Released keyboard handle");
        }
    }
}

fn is_wooting(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == VENDOR_ID || (vendor_id == LEGACY_VENDOR_ID && LEGACY_PRODUCT_IDS.contains(&product_id))
}

/// `[report id, magic, magic, command, arg, 0, 0, 0]`
fn command_report(command: u8, arg: u8) -> [u8; COMMAND_SIZE] {
    [0, MAGIC[0], MAGIC[1], command, arg, 0, 0, 0]
}

/// The profile byte sits one position later on the v2 interface.
fn parse_profile_response(buf: &[u8], v2_interface: bool) -> Result<ProfileIndex, DeviceError> {
    let offset = if v2_interface { 5 } else { 4 };
    let raw = *buf
        .get(offset)
        .ok_or_else(|| DeviceError::BadResponse("response too short".to_string()))?;

    ProfileIndex::new(raw).map_err(|e| DeviceError::BadResponse(e.to_string()))
}
