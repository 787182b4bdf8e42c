//! UART link for serial-attached radio modules

use crate::HalError;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

/// Byte transport between the host and a module
pub trait SerialLink: Send {
    /// Open the underlying device. Calling it on an open link is a no-op.
    fn open(&mut self) -> Result<(), HalError>;

    /// Bytes waiting in the receive buffer
    fn bytes_available(&mut self) -> Result<usize, HalError>;

    /// Read what is available, up to `buf.len()`. Returns 0 on read timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, HalError>;

    fn write_all(&mut self, data: &[u8]) -> Result<(), HalError>;
}

/// Linux tty in raw 8N1 mode
pub struct SerialPort {
    port: String,
    baud: u32,
    file: Option<File>,
}

impl SerialPort {
    /// Describe a port; nothing is opened until [`SerialLink::open`]
    pub fn new(port: &str, baud: u32) -> Self {
        Self {
            port: port.to_string(),
            baud,
            file: None,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn file(&mut self) -> Result<&mut File, HalError> {
        self.file
            .as_mut()
            .ok_or_else(|| HalError::DeviceNotFound(format!("{} not open", self.port)))
    }

    #[cfg(target_os = "linux")]
    fn configure(file: &File, baud: u32) -> Result<(), HalError> {
        use std::os::unix::io::AsRawFd;

        let baud_const = match baud {
            9600 => libc::B9600,
            19200 => libc::B19200,
            38400 => libc::B38400,
            57600 => libc::B57600,
            115200 => libc::B115200,
            other => {
                return Err(HalError::InvalidConfig(format!("Unsupported baud rate {}", other)));
            }
        };

        let fd = file.as_raw_fd();
        // SAFETY: fd is owned by `file` for the duration of this call and the
        // termios struct is fully initialised by tcgetattr before use.
        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &mut termios) != 0 {
                return Err(std::io::Error::last_os_error().into());
            }

            libc::cfmakeraw(&mut termios);
            libc::cfsetispeed(&mut termios, baud_const);
            libc::cfsetospeed(&mut termios, baud_const);

            // 8N1
            termios.c_cflag &= !libc::CSIZE;
            termios.c_cflag |= libc::CS8;
            termios.c_cflag &= !libc::PARENB;
            termios.c_cflag &= !libc::CSTOPB;
            termios.c_cflag |= libc::CLOCAL | libc::CREAD;

            // Non-blocking reads with a 100 ms inter-byte timeout
            termios.c_cc[libc::VMIN] = 0;
            termios.c_cc[libc::VTIME] = 1;

            if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            libc::tcflush(fd, libc::TCIOFLUSH);
        }

        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn configure(_file: &File, _baud: u32) -> Result<(), HalError> {
        Err(HalError::Unsupported("serial ports are only supported on Linux".to_string()))
    }
}

impl SerialLink for SerialPort {
    fn open(&mut self) -> Result<(), HalError> {
        if self.file.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.port)
            .map_err(|e| HalError::DeviceNotFound(format!("{}: {}", self.port, e)))?;

        Self::configure(&file, self.baud)?;
        tracing::debug!("Opened {} at {} baud", self.port, self.baud);

        self.file = Some(file);
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn bytes_available(&mut self) -> Result<usize, HalError> {
        use std::os::unix::io::AsRawFd;

        let fd = self.file()?.as_raw_fd();
        let mut count: libc::c_int = 0;
        // SAFETY: FIONREAD writes a single c_int through the pointer.
        let ret = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut count) };
        if ret < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(count.max(0) as usize)
    }

    #[cfg(not(target_os = "linux"))]
    fn bytes_available(&mut self) -> Result<usize, HalError> {
        self.file()?;
        Err(HalError::Unsupported("serial ports are only supported on Linux".to_string()))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, HalError> {
        Ok(self.file()?.read(buf)?)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), HalError> {
        let file = self.file()?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_is_opened_lazily() {
        let mut port = SerialPort::new("/dev/lorascope-missing-tty", 9600);
        assert!(!port.is_open());
        assert!(matches!(port.read(&mut [0u8; 4]), Err(HalError::DeviceNotFound(_))));
        assert!(matches!(port.open(), Err(HalError::DeviceNotFound(_))));
    }
}
