//! Serial backend: a tty device opened as a file and put into raw mode.
//!
//! Timeouts ride on termios VMIN=0/VTIME, so a read that returns zero bytes
//! means "the window elapsed", not end of stream. Serial devices have no
//! meaningful EOF; unplugging the adapter surfaces as a read error instead.

#![allow(missing_docs)]

use crate::core::config::TransportConfig;
use crate::core::errors::{Result, ScrError};
use crate::transport::{LineBuffer, LineRead, LineSource};

#[cfg(unix)]
mod unix_impl {
    use std::fs::{File, OpenOptions};
    use std::io::Read;
    use std::os::fd::AsFd;

    use nix::sys::termios::{
        self, BaudRate, LocalFlags, SetArg, SpecialCharacterIndices, Termios,
    };

    use super::{LineBuffer, LineRead, LineSource, Result, ScrError, TransportConfig};

    /// Map a numeric baud rate onto the termios constant. Rates the kernel
    /// interface does not name are rejected up front.
    pub(super) fn baud_constant(baud: u32) -> Result<BaudRate> {
        let rate = match baud {
            1_200 => BaudRate::B1200,
            2_400 => BaudRate::B2400,
            4_800 => BaudRate::B4800,
            9_600 => BaudRate::B9600,
            19_200 => BaudRate::B19200,
            38_400 => BaudRate::B38400,
            57_600 => BaudRate::B57600,
            115_200 => BaudRate::B115200,
            230_400 => BaudRate::B230400,
            other => return Err(ScrError::UnsupportedBaud { baud: other }),
        };
        Ok(rate)
    }

    /// VTIME is measured in deciseconds and stored in a u8.
    pub(super) fn vtime_deciseconds(read_timeout_ms: u64) -> u8 {
        u8::try_from((read_timeout_ms / 100).clamp(1, 255)).unwrap_or(255)
    }

    #[derive(Debug)]
    pub struct SerialLineSource {
        file: File,
        port: String,
        buffer: LineBuffer,
    }

    impl SerialLineSource {
        pub fn open(cfg: &TransportConfig) -> Result<Self> {
            let rate = baud_constant(cfg.baud)?;

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&cfg.port)
                .map_err(|error| ScrError::TransportOpen {
                    port: cfg.port.clone(),
                    details: error.to_string(),
                })?;

            configure_tty(&file, rate, vtime_deciseconds(cfg.read_timeout_ms)).map_err(
                |error| ScrError::TransportOpen {
                    port: cfg.port.clone(),
                    details: format!("termios setup: {error}"),
                },
            )?;

            Ok(Self {
                file,
                port: cfg.port.clone(),
                buffer: LineBuffer::new(),
            })
        }
    }

    fn configure_tty(file: &File, rate: BaudRate, vtime: u8) -> nix::Result<()> {
        let fd = file.as_fd();
        let mut tty: Termios = termios::tcgetattr(fd)?;

        termios::cfmakeraw(&mut tty);
        termios::cfsetspeed(&mut tty, rate)?;
        tty.local_flags.remove(LocalFlags::ECHO);

        // VMIN=0 with VTIME>0: read blocks up to VTIME then returns what it
        // has, possibly nothing.
        tty.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        tty.control_chars[SpecialCharacterIndices::VTIME as usize] = vtime;

        termios::tcsetattr(fd, SetArg::TCSANOW, &tty)?;
        termios::tcflush(fd, termios::FlushArg::TCIOFLUSH)?;
        Ok(())
    }

    impl LineSource for SerialLineSource {
        fn read_line(&mut self) -> Result<LineRead> {
            loop {
                if let Some(line) = self.buffer.next_line() {
                    return Ok(LineRead::Line(line));
                }

                let mut chunk = [0u8; 512];
                match self.file.read(&mut chunk) {
                    // Zero bytes on a VMIN=0 tty means the window elapsed.
                    Ok(0) => return Ok(LineRead::Timeout),
                    Ok(n) => self.buffer.push(&chunk[..n]),
                    Err(error) => {
                        return Err(ScrError::TransportRead {
                            port: self.port.clone(),
                            source: error,
                        });
                    }
                }
            }
        }

        fn describe(&self) -> String {
            self.port.clone()
        }
    }
}

#[cfg(unix)]
pub use unix_impl::SerialLineSource;

#[cfg(not(unix))]
#[derive(Debug)]
pub struct SerialLineSource;

#[cfg(not(unix))]
impl SerialLineSource {
    pub fn open(cfg: &TransportConfig) -> Result<Self> {
        Err(ScrError::TransportOpen {
            port: cfg.port.clone(),
            details: "serial devices are only supported on unix".to_string(),
        })
    }
}

#[cfg(not(unix))]
impl LineSource for SerialLineSource {
    fn read_line(&mut self) -> Result<LineRead> {
        unreachable!("SerialLineSource cannot be constructed on this platform")
    }

    fn describe(&self) -> String {
        String::new()
    }
}
