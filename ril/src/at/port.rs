use std::{
    fmt,
    io::{self, Read, Write},
    net::{Ipv4Addr, Shutdown, TcpStream},
    os::unix::net::UnixStream,
    path::PathBuf,
    time::Duration,
};

use serialport::{SerialPort as _, TTYPort};

const BAUD_RATE: u32 = 115_200;

/// A connected byte stream to the modem's AT interface.
pub trait Port: Read + Write + Send {
    /// Second handle on the same descriptor, given to the reader thread.
    fn try_clone_port(&self) -> io::Result<Box<dyn Port>>;

    /// Bounds how long a read blocks so the reader can notice a close.
    fn set_poll_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Unblocks a reader stuck on this descriptor, where the kind supports it.
    fn shutdown(&self) -> io::Result<()>;
}

impl Port for UnixStream {
    fn try_clone_port(&self) -> io::Result<Box<dyn Port>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn set_poll_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }

    fn shutdown(&self) -> io::Result<()> {
        UnixStream::shutdown(self, Shutdown::Both)
    }
}

impl Port for TcpStream {
    fn try_clone_port(&self) -> io::Result<Box<dyn Port>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn set_poll_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

impl Port for TTYPort {
    fn try_clone_port(&self) -> io::Result<Box<dyn Port>> {
        Ok(Box::new(self.try_clone_native()?))
    }

    fn set_poll_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        Ok(self.set_timeout(timeout)?)
    }

    fn shutdown(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Where the modem's AT interface is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP port on the loopback interface, typically an emulator.
    Loopback(u16),
    /// UNIX domain socket path.
    LocalSocket(PathBuf),
    /// Serial tty, opened read/write in raw mode.
    Serial(PathBuf),
}

impl Endpoint {
    pub fn open(&self) -> io::Result<Box<dyn Port>> {
        match self {
            Self::Loopback(port) => {
                let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, *port))?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            Self::LocalSocket(path) => Ok(Box::new(UnixStream::connect(path)?)),
            Self::Serial(path) => {
                // open_native applies raw termios: no echo, no canonical mode.
                let mut tty = serialport::new(path.to_string_lossy(), BAUD_RATE)
                    .open_native()?;
                tty.set_exclusive(false)?;
                Ok(Box::new(tty))
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loopback(port) => write!(f, "tcp://127.0.0.1:{port}"),
            Self::LocalSocket(path) => write!(f, "unix://{}", path.display()),
            Self::Serial(path) => write!(f, "{}", path.display()),
        }
    }
}
