//! SLMP device codes and the fixed device-name decoding table.
//!
//! Mirrors `SLMP::Command::convert_device_name` from the reference
//! implementation: a fixed string table for the plain device codes, a
//! special case for the four CPU-buffer extensions (`U3E0..U3E3`), and a
//! `U` + 2-3 hex digit fallback for arbitrary start-I/O addressed modules.

/// A MELSEC device memory code, as carried on the wire (one byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Device {
    Sm = 0x91,
    Sd = 0xA9,
    X = 0x9C,
    Y = 0x9D,
    M = 0x90,
    L = 0x92,
    F = 0x93,
    V = 0x94,
    B = 0xA0,
    D = 0xA8,
    W = 0xB4,
    Ts = 0xC1,
    Tc = 0xC0,
    Tn = 0xC2,
    Sb = 0xA1,
    Sw = 0xB5,
    Dx = 0xA2,
    Dy = 0xA3,
    Z = 0xCC,
    R = 0xAF,
    Zr = 0xB0,
    /// Buffer-memory / module access device, always paired with a
    /// [`DeviceExtension`] other than `None`.
    G = 0x00AB,
}

impl Device {
    pub fn code(self) -> u8 {
        self as u16 as u8
    }
}

/// Selects which CPU (multi-CPU systems) or start-I/O module a `G` device
/// access targets. `None` means "no extension" and uses the plain 3-byte
/// head / 1-byte device addressing instead of the extended form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceExtension {
    None,
    CpuNo1,
    CpuNo2,
    CpuNo3,
    CpuNo4,
    /// Arbitrary start I/O number (`Un`), carried as the raw 16-bit value.
    StartIo(u16),
}

impl DeviceExtension {
    /// The 16-bit value placed on the wire for this extension.
    pub fn wire_value(self) -> u16 {
        match self {
            DeviceExtension::None => 0x0100,
            DeviceExtension::CpuNo1 => 0x03E0,
            DeviceExtension::CpuNo2 => 0x03E1,
            DeviceExtension::CpuNo3 => 0x03E2,
            DeviceExtension::CpuNo4 => 0x03E3,
            DeviceExtension::StartIo(v) => v,
        }
    }

    /// The access-kind byte that follows the extension in an extended
    /// device-memory frame: `0xFA` for the CPU buffer, `0xF8` for an
    /// arbitrary module.
    pub fn access_kind(self) -> u8 {
        match self {
            DeviceExtension::CpuNo1
            | DeviceExtension::CpuNo2
            | DeviceExtension::CpuNo3
            | DeviceExtension::CpuNo4 => 0xFA,
            _ => 0xF8,
        }
    }

    pub fn is_none(self) -> bool {
        matches!(self, DeviceExtension::None)
    }
}

/// Decode a device name string (as it appears in a schema's
/// `ReadCommand.Device` field) into a `(Device, DeviceExtension)` pair.
///
/// Returns `None` for anything not in the fixed table — the caller treats
/// this as a configuration error (the binding is skipped, per spec §4.4).
pub fn decode_device_name(name: &str) -> Option<(Device, DeviceExtension)> {
    let plain = match name {
        "SM" => Some(Device::Sm),
        "SD" => Some(Device::Sd),
        "X" => Some(Device::X),
        "Y" => Some(Device::Y),
        "M" => Some(Device::M),
        "L" => Some(Device::L),
        "F" => Some(Device::F),
        "V" => Some(Device::V),
        "B" => Some(Device::B),
        "D" => Some(Device::D),
        "W" => Some(Device::W),
        "TS" => Some(Device::Ts),
        "TC" => Some(Device::Tc),
        "TN" => Some(Device::Tn),
        "SB" => Some(Device::Sb),
        "SW" => Some(Device::Sw),
        "DX" => Some(Device::Dx),
        "DY" => Some(Device::Dy),
        "Z" => Some(Device::Z),
        "R" => Some(Device::R),
        "ZR" => Some(Device::Zr),
        _ => None,
    };
    if let Some(device) = plain {
        return Some((device, DeviceExtension::None));
    }

    match name {
        "U3E0" => return Some((Device::G, DeviceExtension::CpuNo1)),
        "U3E1" => return Some((Device::G, DeviceExtension::CpuNo2)),
        "U3E2" => return Some((Device::G, DeviceExtension::CpuNo3)),
        "U3E3" => return Some((Device::G, DeviceExtension::CpuNo4)),
        _ => {}
    }

    if let Some(hex) = name.strip_prefix('U') {
        if (2..=3).contains(&hex.len()) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            if let Ok(start_io) = u16::from_str_radix(hex, 16) {
                return Some((Device::G, DeviceExtension::StartIo(start_io)));
            }
        }
    }

    None
}
