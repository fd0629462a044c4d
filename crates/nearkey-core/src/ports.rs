//! Port traits for the external collaborators.
//!
//! The pipeline consumes keys, connection state, and battery bytes; it never
//! owns them. Production wires these to the persistent device database and
//! the connection manager, tests to the in-memory doubles in
//! `nearkey-harness`.

use std::fmt;

use nearkey_crypto::AccountKey;

/// A 6-byte Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress(pub [u8; 6]);

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Read access to the persistent account key store.
pub trait KeyStore {
    /// Every stored account key, in stable store order.
    fn all_account_keys(&self) -> Vec<AccountKey>;

    /// The account key associated with a paired device, if any.
    fn key_for_device(&self, device: DeviceAddress) -> Option<AccountKey>;

    /// Paired devices in store order, lowest index first.
    ///
    /// Drives the first-boot default selection of the in-use key.
    fn paired_devices(&self) -> Vec<DeviceAddress>;
}

/// Read access to the connection and audio-routing state.
pub trait ConnectionTracker {
    /// Whether the device currently has a connection.
    fn is_connected(&self, device: DeviceAddress) -> bool;

    /// All currently connected handsets.
    fn connected_handsets(&self) -> Vec<DeviceAddress>;

    /// The handset currently holding the audio stream, if any.
    fn audio_routed_to(&self) -> Option<DeviceAddress>;

    /// Connection state byte for the connection status block.
    fn connection_state(&self) -> u8;

    /// Connected-device bitmap for the connection status block.
    fn connected_bitmap(&self) -> u8;
}

/// Read access to the battery status bytes.
pub trait BatteryStatus {
    /// Current battery status bytes, possibly empty.
    fn current_bytes(&self) -> Vec<u8>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_address_displays_as_colon_separated_hex() {
        let addr = DeviceAddress([0xA0, 0x0B, 0xC1, 0x00, 0xFF, 0x7E]);
        assert_eq!(addr.to_string(), "A0:0B:C1:00:FF:7E");
    }
}
