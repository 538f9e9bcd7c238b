//! Controllable devices and the `<device> <on|off>` command grammar.
//!
//! The device set is closed: each name maps 1:1 to a broker topic from the
//! configuration, and the router only ever dispatches validated members.

use std::fmt;

/// A controllable device known to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Lampu1,
    Lampu2,
    Stopkontak1,
    Stopkontak2,
}

impl Device {
    /// All devices, in menu order.
    pub const ALL: [Device; 4] = [
        Device::Lampu1,
        Device::Lampu2,
        Device::Stopkontak1,
        Device::Stopkontak2,
    ];

    /// Canonical lowercase name as typed by users.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Device::Lampu1 => "lampu1",
            Device::Lampu2 => "lampu2",
            Device::Stopkontak1 => "stopkontak1",
            Device::Stopkontak2 => "stopkontak2",
        }
    }

    /// Parse a device name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Device> {
        match s.to_ascii_lowercase().as_str() {
            "lampu1" => Some(Device::Lampu1),
            "lampu2" => Some(Device::Lampu2),
            "stopkontak1" => Some(Device::Stopkontak1),
            "stopkontak2" => Some(Device::Stopkontak2),
            _ => None,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// On/off action for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAction {
    On,
    Off,
}

impl SwitchAction {
    /// The literal broker payload for this action.
    #[must_use]
    pub fn payload(self) -> &'static str {
        match self {
            SwitchAction::On => "ON",
            SwitchAction::Off => "OFF",
        }
    }

    /// Parse an action, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<SwitchAction> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Some(SwitchAction::On),
            "off" => Some(SwitchAction::Off),
            _ => None,
        }
    }
}

impl fmt::Display for SwitchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload())
    }
}

/// A validated device command, consumed immediately by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCommand {
    pub device: Device,
    pub action: SwitchAction,
}

impl DeviceCommand {
    /// Parse the manual grammar `<device> <on|off>`: exactly two tokens,
    /// both members of their closed sets.
    #[must_use]
    pub fn parse(text: &str) -> Option<DeviceCommand> {
        let mut tokens = text.split_whitespace();
        let device = Device::parse(tokens.next()?)?;
        let action = SwitchAction::parse(tokens.next()?)?;
        if tokens.next().is_some() {
            return None;
        }
        Some(DeviceCommand { device, action })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn parses_known_devices() {
        assert_eq!(Device::parse("lampu1"), Some(Device::Lampu1));
        assert_eq!(Device::parse("STOPKONTAK2"), Some(Device::Stopkontak2));
        assert_eq!(Device::parse("lampu9"), None);
    }

    #[test]
    fn parses_manual_grammar() {
        let cmd = DeviceCommand::parse("lampu1 on").unwrap();
        assert_eq!(cmd.device, Device::Lampu1);
        assert_eq!(cmd.action, SwitchAction::On);

        let cmd = DeviceCommand::parse("stopkontak1 OFF").unwrap();
        assert_eq!(cmd.device, Device::Stopkontak1);
        assert_eq!(cmd.action, SwitchAction::Off);
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(DeviceCommand::parse("lampu1").is_none());
        assert!(DeviceCommand::parse("lampu1 on extra").is_none());
        assert!(DeviceCommand::parse("lampu9 on").is_none());
        assert!(DeviceCommand::parse("lampu1 toggle").is_none());
        assert!(DeviceCommand::parse("").is_none());
    }

    #[test]
    fn payload_is_literal_on_off() {
        assert_eq!(SwitchAction::On.payload(), "ON");
        assert_eq!(SwitchAction::Off.payload(), "OFF");
    }
}
