//! Plain-FTP report drop (blocking `suppaftp` session, one per run).

use std::fmt;
use std::net::ToSocketAddrs;
use std::time::Duration;

use chrono::{DateTime, Utc};
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tracing::{debug, info, warn};

use crate::{RemoteFileSource, SourceError};

#[derive(Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub directory: String,
    pub timeout: Duration,
}

impl fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("directory", &self.directory)
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct FtpFileSource {
    stream: Option<FtpStream>,
}

impl FtpFileSource {
    /// Connects, logs in, switches to binary mode and enters the report directory.
    pub fn connect(config: &FtpConfig) -> Result<Self, SourceError> {
        let addr_label = format!("{}:{}", config.host, config.port);
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|err| SourceError::Unavailable(format!("resolving {addr_label}: {err}")))?
            .next()
            .ok_or_else(|| SourceError::Unavailable(format!("no address for {addr_label}")))?;

        info!(addr = %addr_label, "connecting to ftp");
        let mut stream =
            FtpStream::connect_timeout(addr, config.timeout).map_err(|source| SourceError::Connect {
                addr: addr_label.clone(),
                source,
            })?;

        let tcp = stream.get_ref();
        if let Err(err) = tcp
            .set_read_timeout(Some(config.timeout))
            .and_then(|_| tcp.set_write_timeout(Some(config.timeout)))
        {
            warn!(error = %err, "could not set ftp socket timeouts");
        }

        stream.login(config.user.as_str(), config.password.as_str())?;
        stream.transfer_type(FileType::Binary)?;
        stream.cwd(config.directory.as_str())?;
        debug!(directory = %config.directory, "ftp session ready");

        Ok(Self {
            stream: Some(stream),
        })
    }

    fn stream(&mut self) -> Result<&mut FtpStream, SourceError> {
        self.stream
            .as_mut()
            .ok_or_else(|| SourceError::Unavailable("ftp session already closed".to_string()))
    }
}

/// Name column of a `LIST` line: its last whitespace-separated token.
pub fn name_from_list_line(line: &str) -> Option<&str> {
    line.split_whitespace().last()
}

impl RemoteFileSource for FtpFileSource {
    fn list_names(&mut self) -> Result<Vec<String>, SourceError> {
        let stream = self.stream()?;
        match stream.nlst(None) {
            Ok(names) => Ok(names),
            Err(err) => {
                warn!(error = %err, "NLST failed; falling back to LIST");
                let lines = stream.list(None)?;
                Ok(lines
                    .iter()
                    .filter_map(|line| name_from_list_line(line))
                    .map(str::to_string)
                    .collect())
            }
        }
    }

    fn size(&mut self, name: &str) -> Result<u64, SourceError> {
        Ok(self.stream()?.size(name)? as u64)
    }

    fn modified_at(&mut self, name: &str) -> Option<DateTime<Utc>> {
        let stream = self.stream().ok()?;
        match stream.mdtm(name) {
            Ok(naive) => Some(naive.and_utc()),
            Err(err) => {
                debug!(name, error = %err, "MDTM unavailable");
                None
            }
        }
    }

    fn retrieve(&mut self, name: &str) -> Result<Vec<u8>, SourceError> {
        let cursor = self.stream()?.retr_as_buffer(name)?;
        Ok(cursor.into_inner())
    }

    fn close(&mut self) -> Result<(), SourceError> {
        if let Some(mut stream) = self.stream.take() {
            stream.quit()?;
        }
        Ok(())
    }
}

impl Drop for FtpFileSource {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.quit();
        }
    }
}
