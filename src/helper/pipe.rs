use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// A connected duplex byte stream to the helper.
pub trait PipeStream: Read + Write + Send {}

impl<T: Read + Write + Send> PipeStream for T {}

/// Opens connections to a named endpoint.
pub trait PipeConnector: Send + Sync {
    fn connect(&self, name: &str) -> io::Result<Box<dyn PipeStream>>;

    /// Block until the endpoint may accept a connection, at most `timeout`.
    /// Returns false if it never became available.
    fn wait_for_pipe(&self, name: &str, timeout: Duration) -> bool {
        let _ = name;
        std::thread::sleep(timeout.min(Duration::from_millis(250)));
        true
    }
}

/// `ERROR_PIPE_BUSY`: every server instance is serving another client.
const ERROR_PIPE_BUSY: i32 = 231;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn is_pipe_busy(err: &io::Error) -> bool {
    err.raw_os_error() == Some(ERROR_PIPE_BUSY)
}

/// Connects to `\\.\pipe\<name>` on Windows and to a Unix socket named
/// `<name>` in the temp directory elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamedPipeConnector;

impl NamedPipeConnector {
    #[cfg(windows)]
    pub fn endpoint(name: &str) -> std::path::PathBuf {
        std::path::PathBuf::from(format!(r"\\.\pipe\{name}"))
    }

    #[cfg(not(windows))]
    pub fn endpoint(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(name)
    }
}

impl PipeConnector for NamedPipeConnector {
    #[cfg(windows)]
    fn connect(&self, name: &str) -> io::Result<Box<dyn PipeStream>> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(Self::endpoint(name))?;
        Ok(Box::new(file))
    }

    #[cfg(unix)]
    fn connect(&self, name: &str) -> io::Result<Box<dyn PipeStream>> {
        let stream = std::os::unix::net::UnixStream::connect(Self::endpoint(name))?;
        Ok(Box::new(stream))
    }

    #[cfg(not(any(windows, unix)))]
    fn connect(&self, _name: &str) -> io::Result<Box<dyn PipeStream>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "named pipes are not available on this platform",
        ))
    }

    /// `WaitNamedPipeW` until an instance is free. A pipe that does not exist
    /// yet fails the call at once, so that case is polled.
    #[cfg(windows)]
    fn wait_for_pipe(&self, name: &str, timeout: Duration) -> bool {
        use windows::core::HSTRING;
        use windows::Win32::System::Pipes::WaitNamedPipeW;

        let endpoint = HSTRING::from(Self::endpoint(name).as_os_str());
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            // 0 and u32::MAX select the server default and an infinite wait.
            let millis = remaining.as_millis().clamp(1, u128::from(u32::MAX - 1)) as u32;
            if unsafe { WaitNamedPipeW(&endpoint, millis) }.is_ok() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL.min(remaining));
        }
    }

    #[cfg(not(windows))]
    fn wait_for_pipe(&self, name: &str, timeout: Duration) -> bool {
        let endpoint = Self::endpoint(name);
        let deadline = Instant::now() + timeout;
        loop {
            if endpoint.exists() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_pipe_is_recognized_by_os_code() {
        assert!(is_pipe_busy(&io::Error::from_raw_os_error(231)));
        assert!(!is_pipe_busy(&io::Error::from_raw_os_error(2)));
        assert!(!is_pipe_busy(&io::Error::new(io::ErrorKind::Other, "x")));
    }

    #[test]
    fn missing_endpoint_times_out() {
        let connector = NamedPipeConnector;
        assert!(!connector.wait_for_pipe("sapi-tts-bridge-no-such-pipe", Duration::from_millis(60)));
        assert!(connector.connect("sapi-tts-bridge-no-such-pipe").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn listening_endpoint_is_available() {
        let name = format!("sapi-tts-bridge-wait-{}", std::process::id());
        let path = NamedPipeConnector::endpoint(&name);
        let _ = std::fs::remove_file(&path);
        let _listener = std::os::unix::net::UnixListener::bind(&path).unwrap();

        let connector = NamedPipeConnector;
        assert!(connector.wait_for_pipe(&name, Duration::from_millis(200)));
        assert!(connector.connect(&name).is_ok());
        std::fs::remove_file(&path).unwrap();
    }
}
