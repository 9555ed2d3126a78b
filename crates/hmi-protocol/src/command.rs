//! Command text encoding
//!
//! Commands are plain ASCII: `<verb> <arg1>,<arg2>,...` or assignments such
//! as `t0.txt="hello"`. An object reference may be qualified by its page
//! (`main.t0`) and an attribute is selected with `.` (`t0.val`).
//!
//! The 3-byte terminator is appended by [`encode`] only; command text never
//! carries it.

use std::fmt;

use crate::error::ParseError;
use crate::framing::{TERMINATOR, TERMINATOR_BYTE};

/// Size of the device EEPROM in bytes
pub const EEPROM_SIZE: u32 = 1024;

/// Highest waveform channel number
pub const MAX_WAVEFORM_CHANNEL: u8 = 3;

/// Channel number that addresses every channel of a waveform in `cle`
pub const ALL_CHANNELS: u8 = 255;

/// Highest backlight level accepted by `dim`
pub const MAX_BRIGHTNESS: u8 = 100;

/// Longest auto-sleep timeout accepted by `thsp`, in seconds
pub const MAX_SLEEP_SECONDS: u16 = 65535;

/// Shortest non-zero auto-sleep timeout accepted by `thsp`, in seconds
pub const MIN_SLEEP_SECONDS: u16 = 3;

/// Append the terminator to command text
///
/// Fails if the text is not ASCII, since a `0xFF` byte would corrupt framing.
pub fn encode(text: &str) -> Result<Vec<u8>, ParseError> {
    if !text.is_ascii() {
        return Err(ParseError::InvalidArgument(format!(
            "command is not ASCII: {:?}",
            text
        )));
    }
    debug_assert!(!text.as_bytes().contains(&TERMINATOR_BYTE));

    let mut out = Vec::with_capacity(text.len() + TERMINATOR.len());
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(&TERMINATOR);
    Ok(out)
}

/// Quote a string value, escaping embedded quotes and backslashes
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Reference to a component, optionally qualified by page name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectRef {
    pub page: Option<String>,
    pub name: String,
}

impl ObjectRef {
    /// Component on the current page
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            page: None,
            name: name.into(),
        }
    }

    /// Component on a named page
    pub fn on_page(page: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            page: Some(page.into()),
            name: name.into(),
        }
    }

    /// `object.attr`
    pub fn attr(&self, attr: &str) -> String {
        format!("{}.{}", self, attr)
    }

    fn validate(&self) -> Result<(), ParseError> {
        validate_identifier(&self.name)?;
        if let Some(page) = &self.page {
            validate_identifier(page)?;
        }
        Ok(())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.page {
            Some(page) => write!(f, "{}.{}", page, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl From<&str> for ObjectRef {
    /// Parses `name` or `page.name`
    fn from(value: &str) -> Self {
        match value.split_once('.') {
            Some((page, name)) => Self::on_page(page, name),
            None => Self::new(value),
        }
    }
}

/// Page selector for the `page` command
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PageRef {
    Id(u8),
    Name(String),
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<u8> for PageRef {
    fn from(id: u8) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for PageRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

fn validate_identifier(name: &str) -> Result<(), ParseError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '[' || c == ']');
    if valid {
        Ok(())
    } else {
        Err(ParseError::InvalidArgument(format!(
            "invalid object name: {:?}",
            name
        )))
    }
}

fn validate_attr(attr: &str) -> Result<(), ParseError> {
    if !attr.is_empty() && attr.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ParseError::InvalidArgument(format!(
            "invalid attribute: {:?}",
            attr
        )))
    }
}

fn validate_waveform(channel: u8) -> Result<(), ParseError> {
    if channel > MAX_WAVEFORM_CHANNEL {
        return Err(ParseError::InvalidArgument(format!(
            "waveform channel {} out of range 0..={}",
            channel, MAX_WAVEFORM_CHANNEL
        )));
    }
    Ok(())
}

fn validate_eeprom_range(address: u32, length: u32) -> Result<(), ParseError> {
    if length == 0 {
        return Err(ParseError::InvalidArgument("EEPROM length is zero".into()));
    }
    match address.checked_add(length) {
        Some(end) if end <= EEPROM_SIZE => Ok(()),
        _ => Err(ParseError::InvalidArgument(format!(
            "EEPROM range {}+{} exceeds {} bytes",
            address, length, EEPROM_SIZE
        ))),
    }
}

/// Device commands understood by the convenience API
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// `obj.txt="text"`
    SetText { object: ObjectRef, text: String },
    /// `get obj.txt`
    GetText { object: ObjectRef },
    /// `obj.val=n`
    SetValue { object: ObjectRef, value: i32 },
    /// `get obj.val`
    GetValue { object: ObjectRef },
    /// `obj.attr=n`
    SetAttribute {
        object: ObjectRef,
        attr: String,
        value: i32,
    },
    /// `get obj.attr`
    GetAttribute { object: ObjectRef, attr: String },
    /// `page n`
    Page(PageRef),
    /// `sendme`
    SendMe,
    /// `ref obj`
    Refresh { object: ObjectRef },
    /// `vis obj,0|1`
    Visible { object: ObjectRef, visible: bool },
    /// `click obj,0|1`
    Click { object: ObjectRef, press: bool },
    /// `dim=n`
    Brightness(u8),
    /// `sleep=0|1`
    Sleep(bool),
    /// `thup=0|1`
    TouchWake(bool),
    /// `thsp=n`
    AutoSleep { seconds: u16 },
    /// `bkcmd=n`
    ResponseLevel(u8),
    /// `rest`
    Reset,
    /// `rept addr,len`
    EepromRead { address: u32, length: u32 },
    /// `wept addr,len`
    EepromWrite { address: u32, length: u32 },
    /// `add id,ch,val`
    WaveformAdd { id: u8, channel: u8, value: u8 },
    /// `addt id,ch,len`
    WaveformStream { id: u8, channel: u8, length: u32 },
    /// `cle id,ch`
    WaveformClear { id: u8, channel: u8 },
}

impl Command {
    /// Check arguments before anything is sent
    pub fn validate(&self) -> Result<(), ParseError> {
        match self {
            Self::SetText { object, text } => {
                object.validate()?;
                if !text.is_ascii() {
                    return Err(ParseError::InvalidArgument(format!(
                        "text is not ASCII: {:?}",
                        text
                    )));
                }
                Ok(())
            }
            Self::GetText { object }
            | Self::SetValue { object, .. }
            | Self::GetValue { object }
            | Self::Refresh { object }
            | Self::Visible { object, .. }
            | Self::Click { object, .. } => object.validate(),
            Self::SetAttribute { object, attr, .. } | Self::GetAttribute { object, attr } => {
                object.validate()?;
                validate_attr(attr)
            }
            Self::Page(PageRef::Name(name)) => validate_identifier(name),
            Self::Page(PageRef::Id(_)) => Ok(()),
            Self::Brightness(level) if *level > MAX_BRIGHTNESS => Err(ParseError::InvalidArgument(
                format!("brightness {} out of range 0..={}", level, MAX_BRIGHTNESS),
            )),
            Self::AutoSleep { seconds } if *seconds != 0 && *seconds < MIN_SLEEP_SECONDS => {
                Err(ParseError::InvalidArgument(format!(
                    "auto-sleep {}s below minimum {}s",
                    seconds, MIN_SLEEP_SECONDS
                )))
            }
            Self::ResponseLevel(level) if *level > 3 => Err(ParseError::InvalidArgument(format!(
                "response level {} out of range 0..=3",
                level
            ))),
            Self::EepromRead { address, length } | Self::EepromWrite { address, length } => {
                validate_eeprom_range(*address, *length)
            }
            Self::WaveformAdd { channel, .. } => validate_waveform(*channel),
            Self::WaveformStream { channel, length, .. } => {
                validate_waveform(*channel)?;
                if *length == 0 {
                    return Err(ParseError::InvalidArgument(
                        "waveform stream length is zero".into(),
                    ));
                }
                Ok(())
            }
            Self::WaveformClear { channel, .. } if *channel != ALL_CHANNELS => {
                validate_waveform(*channel)
            }
            _ => Ok(()),
        }
    }

    /// Command text without terminator
    pub fn to_text(&self) -> String {
        match self {
            Self::SetText { object, text } => format!("{}={}", object.attr("txt"), quote(text)),
            Self::GetText { object } => format!("get {}", object.attr("txt")),
            Self::SetValue { object, value } => format!("{}={}", object.attr("val"), value),
            Self::GetValue { object } => format!("get {}", object.attr("val")),
            Self::SetAttribute {
                object,
                attr,
                value,
            } => format!("{}={}", object.attr(attr), value),
            Self::GetAttribute { object, attr } => format!("get {}", object.attr(attr)),
            Self::Page(page) => format!("page {}", page),
            Self::SendMe => "sendme".to_string(),
            Self::Refresh { object } => format!("ref {}", object),
            Self::Visible { object, visible } => format!("vis {},{}", object, u8::from(*visible)),
            Self::Click { object, press } => format!("click {},{}", object, u8::from(*press)),
            Self::Brightness(level) => format!("dim={}", level),
            Self::Sleep(on) => format!("sleep={}", u8::from(*on)),
            Self::TouchWake(on) => format!("thup={}", u8::from(*on)),
            Self::AutoSleep { seconds } => format!("thsp={}", seconds),
            Self::ResponseLevel(level) => format!("bkcmd={}", level),
            Self::Reset => "rest".to_string(),
            Self::EepromRead { address, length } => format!("rept {},{}", address, length),
            Self::EepromWrite { address, length } => format!("wept {},{}", address, length),
            Self::WaveformAdd { id, channel, value } => {
                format!("add {},{},{}", id, channel, value)
            }
            Self::WaveformStream { id, channel, length } => {
                format!("addt {},{},{}", id, channel, length)
            }
            Self::WaveformClear { id, channel } => format!("cle {},{}", id, channel),
        }
    }

    /// Validate and encode to wire bytes, terminator included
    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        self.validate()?;
        encode(&self.to_text())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}
