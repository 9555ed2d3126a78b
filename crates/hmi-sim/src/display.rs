//! Virtual display
//!
//! Plays the device side of the protocol: accepts terminated ASCII commands,
//! keeps page, component, EEPROM and waveform state, and queues the exact
//! wire replies a real panel would send. Touch and sleep activity can be
//! injected to produce unsolicited events.

use std::collections::{HashMap, VecDeque};

use hmi_protocol::code::codes;
use hmi_protocol::command::{ALL_CHANNELS, EEPROM_SIZE, MAX_WAVEFORM_CHANNEL};
use hmi_protocol::{
    find_message_length, CoordinateEvent, DeviceState, DisplayEvent, ResultCode, TouchAction,
    TouchEvent, TERMINATOR,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A component defined in the configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentConfig {
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: i32,
}

impl ComponentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: String::new(),
            value: 0,
        }
    }
}

/// A page defined in the configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageConfig {
    pub name: String,
    pub components: Vec<ComponentConfig>,
}

/// Configuration for creating a virtual display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualDisplayConfig {
    /// Display name/identifier
    pub id: String,
    /// Pages in id order
    pub pages: Vec<PageConfig>,
    /// Initial backlight level
    pub brightness: u8,
    /// Silence after `rest` before the startup notification (ms)
    pub reset_delay_ms: u64,
}

impl Default for VirtualDisplayConfig {
    fn default() -> Self {
        Self {
            id: "Virtual Display".to_string(),
            pages: vec![
                PageConfig {
                    name: "main".to_string(),
                    components: vec![
                        ComponentConfig::new("b0"),
                        ComponentConfig {
                            text: "hello".to_string(),
                            ..ComponentConfig::new("t0")
                        },
                        ComponentConfig {
                            value: 50,
                            ..ComponentConfig::new("n0")
                        },
                    ],
                },
                PageConfig {
                    name: "settings".to_string(),
                    components: vec![ComponentConfig::new("h0"), ComponentConfig::new("b1")],
                },
            ],
            brightness: 100,
            reset_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone)]
struct Component {
    name: String,
    text: String,
    visible: bool,
    attrs: HashMap<String, i32>,
}

impl Component {
    fn from_config(config: &ComponentConfig) -> Self {
        let mut attrs = HashMap::new();
        attrs.insert("val".to_string(), config.value);
        Self {
            name: config.name.clone(),
            text: config.text.clone(),
            visible: true,
            attrs,
        }
    }
}

#[derive(Debug, Clone)]
struct Page {
    name: String,
    components: Vec<Component>,
}

/// Where the bytes of a transparent data transfer land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransparentTarget {
    Eeprom { address: usize },
    Waveform { id: u8, channel: u8 },
}

#[derive(Debug)]
struct Transfer {
    target: TransparentTarget,
    remaining: usize,
    data: Vec<u8>,
}

/// Simulated display panel
#[derive(Debug)]
pub struct VirtualDisplay {
    config: VirtualDisplayConfig,
    pages: Vec<Page>,
    current_page: u8,
    brightness: u8,
    sleeping: bool,
    touch_wake: bool,
    auto_sleep_secs: u16,
    /// `bkcmd` level: 0 silent, 1 success only, 2 failures only, 3 all
    response_level: u8,
    eeprom: Vec<u8>,
    waveforms: HashMap<(u8, u8), Vec<u8>>,
    input: Vec<u8>,
    transfer: Option<Transfer>,
    reset_requested: bool,
    pending_output: VecDeque<Vec<u8>>,
    /// Commands received (for test verification)
    received_commands: Vec<String>,
}

impl VirtualDisplay {
    /// Create a display with the default page layout
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_config(VirtualDisplayConfig {
            id: id.into(),
            ..VirtualDisplayConfig::default()
        })
    }

    /// Create a display from configuration
    pub fn from_config(config: VirtualDisplayConfig) -> Self {
        let pages = config
            .pages
            .iter()
            .map(|page| Page {
                name: page.name.clone(),
                components: page.components.iter().map(Component::from_config).collect(),
            })
            .collect();
        Self {
            brightness: config.brightness.min(100),
            config,
            pages,
            current_page: 0,
            sleeping: false,
            touch_wake: true,
            auto_sleep_secs: 0,
            response_level: 3,
            eeprom: vec![0u8; EEPROM_SIZE as usize],
            waveforms: HashMap::new(),
            input: Vec::new(),
            transfer: None,
            reset_requested: false,
            pending_output: VecDeque::new(),
            received_commands: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &VirtualDisplayConfig {
        &self.config
    }

    pub fn current_page(&self) -> u8 {
        self.current_page
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn auto_sleep_secs(&self) -> u16 {
        self.auto_sleep_secs
    }

    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    /// Samples stored for a waveform channel
    pub fn waveform(&self, id: u8, channel: u8) -> &[u8] {
        self.waveforms
            .get(&(id, channel))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Text of a component, looked up by `name` or `page.name`
    pub fn text(&self, object: &str) -> Option<&str> {
        let (page, index) = self.resolve(object)?;
        Some(&self.pages[page].components[index].text)
    }

    /// Numeric attribute of a component
    pub fn attribute(&self, object: &str, attr: &str) -> Option<i32> {
        let (page, index) = self.resolve(object)?;
        self.pages[page].components[index].attrs.get(attr).copied()
    }

    pub fn is_visible(&self, object: &str) -> Option<bool> {
        let (page, index) = self.resolve(object)?;
        Some(self.pages[page].components[index].visible)
    }

    /// Commands received so far, without terminators
    pub fn received_commands(&self) -> &[String] {
        &self.received_commands
    }

    /// True while a transparent data transfer is being received
    pub fn in_transparent_mode(&self) -> bool {
        self.transfer.is_some()
    }

    /// Take the reset request raised by `rest`, if any
    pub fn take_reset_request(&mut self) -> bool {
        std::mem::take(&mut self.reset_requested)
    }

    /// Restore power-on state and announce startup
    ///
    /// EEPROM contents survive a reset.
    pub fn complete_reset(&mut self) {
        let eeprom = std::mem::take(&mut self.eeprom);
        let received = std::mem::take(&mut self.received_commands);
        *self = Self::from_config(self.config.clone());
        self.eeprom = eeprom;
        self.received_commands = received;

        self.queue_event(DisplayEvent::DeviceState(DeviceState::Startup));
        self.queue_event(DisplayEvent::DeviceState(DeviceState::Ready));
    }

    /// Get next pending output bytes
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }

    /// Queue a touch on a component of the current page
    ///
    /// Returns false if the component does not exist.
    pub fn touch(&mut self, component: &str, action: TouchAction) -> bool {
        let page = self.current_page as usize;
        let Some(index) = self
            .pages
            .get(page)
            .and_then(|p| p.components.iter().position(|c| c.name == component))
        else {
            return false;
        };
        self.queue_event(DisplayEvent::Touch(TouchEvent {
            page_id: self.current_page,
            component_id: index as u8,
            action,
        }));
        true
    }

    /// Queue a raw coordinate touch. Touching a sleeping panel wakes it
    /// when touch wake is enabled.
    pub fn touch_at(&mut self, x: u16, y: u16, action: TouchAction) {
        let exited_sleep = self.sleeping;
        if exited_sleep && self.touch_wake {
            self.sleeping = false;
        }
        self.queue_event(DisplayEvent::Coordinate(CoordinateEvent {
            x,
            y,
            action,
            exited_sleep,
        }));
    }

    /// Enter or leave automatic sleep, announcing the change
    pub fn set_sleeping(&mut self, sleeping: bool) {
        if self.sleeping == sleeping {
            return;
        }
        self.sleeping = sleeping;
        let state = if sleeping {
            DeviceState::AutoSleep
        } else {
            DeviceState::AutoWake
        };
        self.queue_event(DisplayEvent::DeviceState(state));
    }

    /// Queue arbitrary bytes
    pub fn emit(&mut self, bytes: Vec<u8>) {
        self.pending_output.push_back(bytes);
    }

    fn queue_event(&mut self, event: DisplayEvent) {
        self.pending_output.push_back(event.encode());
    }

    /// Process bytes received from the host
    pub fn process_bytes(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            if let Some(transfer) = self.transfer.as_mut() {
                let take = transfer.remaining.min(data.len());
                transfer.data.extend_from_slice(&data[..take]);
                transfer.remaining -= take;
                data = &data[take..];
                if transfer.remaining == 0 {
                    self.finish_transfer();
                }
                continue;
            }

            self.input.extend_from_slice(data);
            data = &[];
            while let Some(len) = find_message_length(&self.input) {
                let frame: Vec<u8> = self.input.drain(..len).collect();
                let text = String::from_utf8_lossy(&frame[..len - TERMINATOR.len()]).into_owned();
                self.handle_command(&text);

                // Bytes after a transparent data command belong to the transfer
                if self.transfer.is_some() && !self.input.is_empty() {
                    let rest = std::mem::take(&mut self.input);
                    self.process_bytes(&rest);
                    return;
                }
            }
        }
    }

    fn finish_transfer(&mut self) {
        let Some(transfer) = self.transfer.take() else {
            return;
        };
        match transfer.target {
            TransparentTarget::Eeprom { address } => {
                self.eeprom[address..address + transfer.data.len()].copy_from_slice(&transfer.data);
            }
            TransparentTarget::Waveform { id, channel } => {
                self.waveforms
                    .entry((id, channel))
                    .or_default()
                    .extend_from_slice(&transfer.data);
            }
        }
        debug!(
            "Virtual display {} finished transparent transfer of {} bytes",
            self.config.id,
            transfer.data.len()
        );
        self.emit(vec![codes::TRANSPARENT_FINISHED, 0xFF, 0xFF, 0xFF]);
    }

    fn handle_command(&mut self, text: &str) {
        debug!("Virtual display {} command {:?}", self.config.id, text);
        self.received_commands.push(text.to_string());

        let (verb, args) = match text.split_once(' ') {
            Some((verb, args)) => (verb, args.trim()),
            None => (text, ""),
        };

        match verb {
            "get" => self.cmd_get(args),
            "page" => self.cmd_page(args),
            "sendme" => {
                let id = self.current_page;
                self.emit(vec![codes::PAGE_ID, id, 0xFF, 0xFF, 0xFF]);
            }
            "ref" => {
                let found = self.resolve(args).is_some();
                self.reply_found(found, ResultCode::InvalidComponent);
            }
            "vis" => self.cmd_visible(args),
            "click" => {
                let found = split_args(args)
                    .first()
                    .is_some_and(|name| self.resolve(name).is_some());
                self.reply_found(found, ResultCode::InvalidComponent);
            }
            "rest" => {
                self.reset_requested = true;
            }
            "rept" => self.cmd_eeprom_read(args),
            "wept" => self.cmd_eeprom_write(args),
            "add" => self.cmd_waveform_add(args),
            "addt" => self.cmd_waveform_stream(args),
            "cle" => self.cmd_waveform_clear(args),
            _ => match text.split_once('=') {
                Some((target, value)) => self.cmd_assign(target, value),
                None => self.reply(ResultCode::InvalidInstruction),
            },
        }
    }

    fn cmd_get(&mut self, args: &str) {
        let Some((object, attr)) = args.rsplit_once('.') else {
            return self.reply(ResultCode::InvalidVariable);
        };
        let Some((page, index)) = self.resolve(object) else {
            return self.reply(ResultCode::InvalidVariable);
        };
        let component = &self.pages[page].components[index];
        if attr == "txt" {
            let mut out = vec![codes::STRING_DATA];
            out.extend_from_slice(component.text.as_bytes());
            out.extend_from_slice(&TERMINATOR);
            self.emit(out);
            return;
        }
        match component.attrs.get(attr).copied() {
            Some(value) => {
                let mut out = vec![codes::NUMBER_DATA];
                out.extend_from_slice(&value.to_le_bytes());
                out.extend_from_slice(&TERMINATOR);
                self.emit(out);
            }
            None => self.reply(ResultCode::InvalidVariable),
        }
    }

    fn cmd_assign(&mut self, target: &str, value: &str) {
        match target {
            "dim" => match value.parse::<u8>() {
                Ok(level) if level <= 100 => {
                    self.brightness = level;
                    self.reply(ResultCode::Success);
                }
                _ => self.reply(ResultCode::InvalidVariableOperation),
            },
            "sleep" => match value {
                "0" | "1" => {
                    self.sleeping = value == "1";
                    self.reply(ResultCode::Success);
                }
                _ => self.reply(ResultCode::InvalidVariableOperation),
            },
            "thup" => match value {
                "0" | "1" => {
                    self.touch_wake = value == "1";
                    self.reply(ResultCode::Success);
                }
                _ => self.reply(ResultCode::InvalidVariableOperation),
            },
            "thsp" => match value.parse::<u16>() {
                Ok(seconds) => {
                    self.auto_sleep_secs = seconds;
                    self.reply(ResultCode::Success);
                }
                Err(_) => self.reply(ResultCode::InvalidVariableOperation),
            },
            "bkcmd" => match value.parse::<u8>() {
                Ok(level) if level <= 3 => {
                    self.response_level = level;
                    self.reply(ResultCode::Success);
                }
                _ => self.reply(ResultCode::InvalidVariableOperation),
            },
            _ => self.assign_attribute(target, value),
        }
    }

    fn assign_attribute(&mut self, target: &str, value: &str) {
        let Some((object, attr)) = target.rsplit_once('.') else {
            return self.reply(ResultCode::InvalidVariable);
        };
        let Some((page, index)) = self.resolve(object) else {
            return self.reply(ResultCode::InvalidVariable);
        };
        let component = &mut self.pages[page].components[index];

        if attr == "txt" {
            match unquote(value) {
                Some(text) => {
                    component.text = text;
                    self.reply(ResultCode::Success);
                }
                None => self.reply(ResultCode::InvalidVariableOperation),
            }
            return;
        }
        match value.parse::<i32>() {
            Ok(number) => {
                component.attrs.insert(attr.to_string(), number);
                self.reply(ResultCode::Success);
            }
            Err(_) => self.reply(ResultCode::InvalidVariableOperation),
        }
    }

    fn cmd_page(&mut self, args: &str) {
        let page = match args.parse::<usize>() {
            Ok(id) => (id < self.pages.len()).then_some(id),
            Err(_) => self.pages.iter().position(|p| p.name == args),
        };
        match page {
            Some(id) => {
                self.current_page = id as u8;
                self.reply(ResultCode::Success);
            }
            None => self.reply(ResultCode::InvalidPage),
        }
    }

    fn cmd_visible(&mut self, args: &str) {
        let parts = split_args(args);
        let (Some(name), Some(flag)) = (parts.first(), parts.get(1)) else {
            return self.reply(ResultCode::InvalidParameterCount);
        };
        let Some((page, index)) = self.resolve(name) else {
            return self.reply(ResultCode::InvalidComponent);
        };
        self.pages[page].components[index].visible = *flag != "0";
        self.reply(ResultCode::Success);
    }

    fn cmd_eeprom_read(&mut self, args: &str) {
        match eeprom_range(args) {
            Some((address, length)) => {
                let bytes = self.eeprom[address..address + length].to_vec();
                self.emit(bytes);
            }
            None => self.reply(ResultCode::EepromFailed),
        }
    }

    fn cmd_eeprom_write(&mut self, args: &str) {
        match eeprom_range(args) {
            Some((address, length)) => {
                self.start_transfer(TransparentTarget::Eeprom { address }, length)
            }
            None => self.reply(ResultCode::EepromFailed),
        }
    }

    fn cmd_waveform_add(&mut self, args: &str) {
        let numbers = parse_numbers(args);
        let [id, channel, value] = numbers.as_slice() else {
            return self.reply(ResultCode::InvalidParameterCount);
        };
        match (u8::try_from(*id), waveform_channel(*channel), u8::try_from(*value)) {
            (Ok(id), Some(channel), Ok(value)) => {
                self.waveforms.entry((id, channel)).or_default().push(value);
                self.reply(ResultCode::Success);
            }
            _ => self.reply(ResultCode::InvalidWaveform),
        }
    }

    fn cmd_waveform_stream(&mut self, args: &str) {
        let numbers = parse_numbers(args);
        let [id, channel, length] = numbers.as_slice() else {
            return self.reply(ResultCode::InvalidParameterCount);
        };
        match (u8::try_from(*id), waveform_channel(*channel)) {
            (Ok(id), Some(channel)) if *length > 0 => {
                self.start_transfer(TransparentTarget::Waveform { id, channel }, *length as usize)
            }
            _ => self.reply(ResultCode::InvalidWaveform),
        }
    }

    fn cmd_waveform_clear(&mut self, args: &str) {
        let numbers = parse_numbers(args);
        let [id, channel] = numbers.as_slice() else {
            return self.reply(ResultCode::InvalidParameterCount);
        };
        let Ok(id) = u8::try_from(*id) else {
            return self.reply(ResultCode::InvalidWaveform);
        };
        if *channel == u32::from(ALL_CHANNELS) {
            self.waveforms.retain(|(wave, _), _| *wave != id);
            return self.reply(ResultCode::Success);
        }
        match waveform_channel(*channel) {
            Some(channel) => {
                self.waveforms.remove(&(id, channel));
                self.reply(ResultCode::Success);
            }
            None => self.reply(ResultCode::InvalidWaveform),
        }
    }

    fn start_transfer(&mut self, target: TransparentTarget, length: usize) {
        debug!(
            "Virtual display {} ready for {} transparent bytes",
            self.config.id, length
        );
        self.transfer = Some(Transfer {
            target,
            remaining: length,
            data: Vec::with_capacity(length),
        });
        self.emit(vec![codes::TRANSPARENT_READY, 0xFF, 0xFF, 0xFF]);
    }

    /// Queue an instruction result, subject to the `bkcmd` level
    fn reply(&mut self, code: ResultCode) {
        let send = match self.response_level {
            0 => false,
            1 => code.is_success(),
            2 => !code.is_success(),
            _ => true,
        };
        if !code.is_success() {
            warn!("Virtual display {} rejecting command: {}", self.config.id, code);
        }
        if send {
            self.emit(vec![u8::from(code), 0xFF, 0xFF, 0xFF]);
        }
    }

    fn reply_found(&mut self, found: bool, error: ResultCode) {
        self.reply(if found { ResultCode::Success } else { error });
    }

    /// Find a component by `name` on the current page or by `page.name`
    fn resolve(&self, object: &str) -> Option<(usize, usize)> {
        let (page, name) = match object.split_once('.') {
            Some((page, name)) => (self.pages.iter().position(|p| p.name == page)?, name),
            None => (self.current_page as usize, object),
        };
        let index = self
            .pages
            .get(page)?
            .components
            .iter()
            .position(|c| c.name == name)?;
        Some((page, index))
    }
}

fn split_args(args: &str) -> Vec<&str> {
    args.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn parse_numbers(args: &str) -> Vec<u32> {
    let parts = split_args(args);
    let numbers: Vec<u32> = parts.iter().filter_map(|p| p.parse().ok()).collect();
    if numbers.len() == parts.len() {
        numbers
    } else {
        Vec::new()
    }
}

fn waveform_channel(channel: u32) -> Option<u8> {
    u8::try_from(channel)
        .ok()
        .filter(|c| *c <= MAX_WAVEFORM_CHANNEL)
}

fn eeprom_range(args: &str) -> Option<(usize, usize)> {
    let numbers = parse_numbers(args);
    let [address, length] = numbers.as_slice() else {
        return None;
    };
    let end = address.checked_add(*length)?;
    (*length > 0 && end <= EEPROM_SIZE).then_some((*address as usize, *length as usize))
}

/// Strip quotes and undo `\"`, `\\` and `\r` escapes
fn unquote(value: &str) -> Option<String> {
    let inner = value.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next()? {
                'r' => out.push('\r'),
                other => out.push(other),
            }
        } else {
            out.push(ch);
        }
    }
    Some(out)
}
