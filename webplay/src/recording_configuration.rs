use std::{
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
};

pub const DEFAULT_CONTENT_TYPES: [&str; 2] = ["text/html", "application/x-www-form-urlencoded"];

#[derive(Debug, Clone)]
pub struct RecordingConfiguration {
    port: u16,
    bind_address: IpAddr,
    app_address: String,
    output_file: PathBuf,
    stop_file: Option<PathBuf>,
    included_content_types: Vec<String>,
    indent: bool,
}

impl RecordingConfiguration {
    /// Records the traffic between clients on `port` and the application at `app_address`
    /// (`host:port`) into `output_file`. Port 0 picks a free port.
    pub fn new<S: Into<String>, P: Into<PathBuf>>(port: u16, app_address: S, output_file: P) -> Self {
        Self {
            port,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            app_address: app_address.into(),
            output_file: output_file.into(),
            stop_file: None,
            included_content_types: DEFAULT_CONTENT_TYPES.iter().map(|s| s.to_string()).collect(),
            indent: true,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_bind_address(&mut self, bind_address: IpAddr) {
        self.bind_address = bind_address;
    }

    pub fn bind_address(&self) -> IpAddr {
        self.bind_address
    }

    pub fn app_address(&self) -> &str {
        &self.app_address
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Stops the recording once `stop_file` is created or modified.
    pub fn set_stop_file<P: Into<PathBuf>>(&mut self, stop_file: P) {
        self.stop_file = Some(stop_file.into());
    }

    pub fn stop_file(&self) -> Option<&Path> {
        self.stop_file.as_deref()
    }

    /// Replaces the MIME types whose traffic gets payloads and assertions recorded.
    pub fn set_included_content_types<I, S>(&mut self, content_types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included_content_types = content_types.into_iter().map(Into::into).collect();
    }

    pub fn included_content_types(&self) -> &[String] {
        &self.included_content_types
    }

    /// Exact, case-sensitive match against the included MIME types.
    pub fn includes(&self, mime: &str) -> bool {
        self.included_content_types
            .iter()
            .any(|included| included == mime)
    }

    pub fn set_indent(&mut self, indent: bool) {
        self.indent = indent;
    }

    pub fn indent(&self) -> bool {
        self.indent
    }
}
