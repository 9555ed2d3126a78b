//! Convenience command API
//!
//! Thin wrappers that build a [`Command`], pick the reply parser, and unpack
//! the [`Response`]. Device rejections come back as
//! [`LinkError::Device`] so callers can match on the specific code.

use hmi_protocol::{Command, ObjectRef, PageRef, Response, ResponseParser};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::engine::HmiLink;
use crate::error::LinkError;

impl<T> HmiLink<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Validate and send a typed command
    pub async fn execute(
        &self,
        command: &Command,
        parser: ResponseParser,
    ) -> Result<Response, LinkError> {
        command.validate()?;
        self.send(&command.to_text(), parser).await
    }

    async fn execute_ack(&self, command: Command) -> Result<(), LinkError> {
        match self.execute(&command, ResponseParser::Ack).await? {
            Response::Result(_) => Ok(()),
            other => Err(unexpected(ResponseParser::Ack, other)),
        }
    }

    /// Set a component's `txt` attribute
    pub async fn set_text(&self, object: impl Into<ObjectRef>, text: &str) -> Result<(), LinkError> {
        self.execute_ack(Command::SetText {
            object: object.into(),
            text: text.to_string(),
        })
        .await
    }

    /// Read a component's `txt` attribute
    ///
    /// `capacity` bounds the reply, including one byte for the terminating
    /// NUL; a longer string is an error rather than being truncated.
    pub async fn get_text(
        &self,
        object: impl Into<ObjectRef>,
        capacity: usize,
    ) -> Result<String, LinkError> {
        let parser = ResponseParser::Text { capacity };
        let command = Command::GetText {
            object: object.into(),
        };
        match self.execute(&command, parser).await? {
            Response::Text(text) => Ok(text),
            other => Err(unexpected(parser, other)),
        }
    }

    /// Set a component's `val` attribute
    pub async fn set_value(&self, object: impl Into<ObjectRef>, value: i32) -> Result<(), LinkError> {
        self.execute_ack(Command::SetValue {
            object: object.into(),
            value,
        })
        .await
    }

    /// Read a component's `val` attribute
    pub async fn get_value(&self, object: impl Into<ObjectRef>) -> Result<i32, LinkError> {
        self.get_number(Command::GetValue {
            object: object.into(),
        })
        .await
    }

    /// Set any numeric attribute
    pub async fn set_attribute(
        &self,
        object: impl Into<ObjectRef>,
        attr: &str,
        value: i32,
    ) -> Result<(), LinkError> {
        self.execute_ack(Command::SetAttribute {
            object: object.into(),
            attr: attr.to_string(),
            value,
        })
        .await
    }

    /// Read any numeric attribute
    pub async fn get_attribute(
        &self,
        object: impl Into<ObjectRef>,
        attr: &str,
    ) -> Result<i32, LinkError> {
        self.get_number(Command::GetAttribute {
            object: object.into(),
            attr: attr.to_string(),
        })
        .await
    }

    async fn get_number(&self, command: Command) -> Result<i32, LinkError> {
        match self.execute(&command, ResponseParser::Number).await? {
            Response::Number(value) => Ok(value),
            other => Err(unexpected(ResponseParser::Number, other)),
        }
    }

    /// Switch to a page by id or name
    pub async fn show_page(&self, page: impl Into<PageRef>) -> Result<(), LinkError> {
        self.execute_ack(Command::Page(page.into())).await
    }

    /// Id of the page currently shown
    pub async fn current_page(&self) -> Result<u8, LinkError> {
        match self.execute(&Command::SendMe, ResponseParser::PageId).await? {
            Response::PageId(id) => Ok(id),
            other => Err(unexpected(ResponseParser::PageId, other)),
        }
    }

    /// Redraw a component
    pub async fn refresh(&self, object: impl Into<ObjectRef>) -> Result<(), LinkError> {
        self.execute_ack(Command::Refresh {
            object: object.into(),
        })
        .await
    }

    pub async fn set_visible(
        &self,
        object: impl Into<ObjectRef>,
        visible: bool,
    ) -> Result<(), LinkError> {
        self.execute_ack(Command::Visible {
            object: object.into(),
            visible,
        })
        .await
    }

    /// Trigger a component's press or release handler on the device
    pub async fn click(&self, object: impl Into<ObjectRef>, press: bool) -> Result<(), LinkError> {
        self.execute_ack(Command::Click {
            object: object.into(),
            press,
        })
        .await
    }

    /// Backlight level, 0 to 100
    pub async fn set_brightness(&self, level: u8) -> Result<(), LinkError> {
        self.execute_ack(Command::Brightness(level)).await
    }

    pub async fn sleep(&self, on: bool) -> Result<(), LinkError> {
        self.execute_ack(Command::Sleep(on)).await
    }

    /// Whether a touch wakes the display from sleep
    pub async fn set_touch_wake(&self, enabled: bool) -> Result<(), LinkError> {
        self.execute_ack(Command::TouchWake(enabled)).await
    }

    /// Sleep after this many seconds without touch; 0 disables
    pub async fn set_auto_sleep(&self, seconds: u16) -> Result<(), LinkError> {
        self.execute_ack(Command::AutoSleep { seconds }).await
    }

    /// Reset the display
    ///
    /// The device does not answer a successful reset, so a timeout is the
    /// success path here and only here.
    pub async fn reset(&self) -> Result<(), LinkError> {
        match self.execute(&Command::Reset, ResponseParser::Ack).await {
            Ok(_) => Ok(()),
            Err(LinkError::Timeout) => {
                debug!("No reply to reset, treating as success");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Read `length` bytes of EEPROM starting at `address`
    pub async fn eeprom_read(&self, address: u32, length: u32) -> Result<Vec<u8>, LinkError> {
        let parser = ResponseParser::Raw {
            length: length as usize,
        };
        match self
            .execute(&Command::EepromRead { address, length }, parser)
            .await?
        {
            Response::Raw(bytes) => Ok(bytes),
            other => Err(unexpected(parser, other)),
        }
    }

    /// Write `data` to EEPROM starting at `address`
    pub async fn eeprom_write(&self, address: u32, data: &[u8]) -> Result<(), LinkError> {
        let command = Command::EepromWrite {
            address,
            length: transparent_len(data)?,
        };
        self.transfer(&command, data).await
    }

    /// Append one sample to a waveform channel
    pub async fn waveform_add(&self, id: u8, channel: u8, value: u8) -> Result<(), LinkError> {
        self.execute_ack(Command::WaveformAdd { id, channel, value })
            .await
    }

    /// Append a block of samples to a waveform channel
    pub async fn waveform_stream(&self, id: u8, channel: u8, data: &[u8]) -> Result<(), LinkError> {
        let command = Command::WaveformStream {
            id,
            channel,
            length: transparent_len(data)?,
        };
        self.transfer(&command, data).await
    }

    /// Clear a waveform channel, or every channel with
    /// [`ALL_CHANNELS`](hmi_protocol::command::ALL_CHANNELS)
    pub async fn waveform_clear(&self, id: u8, channel: u8) -> Result<(), LinkError> {
        self.execute_ack(Command::WaveformClear { id, channel })
            .await
    }

    /// Run a whole transparent data exchange for `command`
    async fn transfer(&self, command: &Command, data: &[u8]) -> Result<(), LinkError> {
        command.validate()?;
        self.begin_transparent_data(data.len(), &command.to_text())
            .await?;
        if let Err(e) = self.write_transparent_data(data).await {
            let _ = self.abort_transparent_data().await;
            return Err(e);
        }
        self.end_transparent_data().await
    }
}

fn transparent_len(data: &[u8]) -> Result<u32, LinkError> {
    u32::try_from(data.len())
        .map_err(|_| LinkError::InvalidArgument(format!("{} bytes is too long", data.len())))
}

fn unexpected(parser: ResponseParser, actual: Response) -> LinkError {
    LinkError::UnexpectedResponse {
        expected: parser.name(),
        actual,
    }
}
