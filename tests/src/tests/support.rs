use std::{
    collections::HashMap,
    fs,
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Once,
    },
    thread::{self, JoinHandle},
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use webplay::{Recording, RecordingConfiguration, Scenario};

static INIT_LOGGING: Once = Once::new();

pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub const FORM_PAGE: &str = "<html><body><form method=\"post\" action=\"/save\">\
    <input name=\"f\" value=\"v\">\
    <textarea name=\"t\">hi</textarea>\
    </form></body></html>";

#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Route {
    pub fn new(status: u16, content_type: &str, body: &[u8]) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            body: body.to_vec(),
        }
    }

    pub fn html(body: &str) -> Self {
        Self::new(200, "text/html; charset=UTF-8", body.as_bytes())
    }
}

/// A minimal HTTP/1.1 application answering one request per connection.
pub struct FixtureApp {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FixtureApp {
    pub fn start(routes: Vec<(&str, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(Mutex::new(
            routes
                .into_iter()
                .map(|(path, route)| (path.to_string(), route))
                .collect::<HashMap<_, _>>(),
        ));
        let received = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = thread::spawn({
            let routes = routes.clone();
            let received = received.clone();
            let shutdown = shutdown.clone();

            move || {
                for stream in listener.incoming() {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Ok(stream) = stream {
                        serve(stream, &routes, &received);
                    }
                }
            }
        });

        Self {
            addr,
            routes,
            received,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_route(&self, path: &str, route: Route) {
        self.routes.lock().unwrap().insert(path.to_string(), route);
    }

    /// The raw bytes of every request received so far.
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for FixtureApp {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(
    stream: TcpStream,
    routes: &Mutex<HashMap<String, Route>>,
    received: &Mutex<Vec<Vec<u8>>>,
) {
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(stream) => stream,
        Err(_) => return,
    });
    let (raw, path) = match read_message(&mut reader) {
        Some(message) => message,
        None => return,
    };
    received.lock().unwrap().push(raw);

    let path = path.split('?').next().unwrap_or_default().to_string();
    let route = routes
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .unwrap_or_else(|| Route::new(404, "text/plain", b"not found"));

    let mut response = format!(
        "HTTP/1.1 {} Fixture\r\nContent-Length: {}\r\nConnection: close\r\n",
        route.status,
        route.body.len()
    );
    if !route.content_type.is_empty() {
        response.push_str(&format!("Content-Type: {}\r\n", route.content_type));
    }
    if route.status == 302 {
        response.push_str("Location: /\r\n");
    }
    response.push_str("\r\n");

    let mut stream = stream;
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(&route.body);
    let _ = stream.flush();
}

/// Reads one HTTP message, returning its raw bytes and the second token of its start line.
pub fn read_message<R: BufRead>(reader: &mut R) -> Option<(Vec<u8>, String)> {
    let mut raw = Vec::new();
    let mut content_length: usize = 0;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        raw.extend_from_slice(line.as_bytes());
        if line == "\r\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok()?;
            }
        }
    }

    let mut body = Vec::new();
    reader.take(content_length as u64).read_to_end(&mut body).ok()?;
    if body.len() != content_length {
        return None;
    }
    raw.extend_from_slice(&body);

    let head = String::from_utf8_lossy(&raw).to_string();
    let target = head.split_whitespace().nth(1)?.to_string();

    Some((raw, target))
}

/// Sends `request` on a fresh connection and returns the raw response.
pub fn send(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    stream.flush().unwrap();

    let mut reader = BufReader::new(stream);
    let (raw, _) = read_message(&mut reader).expect("no response");

    String::from_utf8_lossy(&raw).into_owned()
}

pub fn get(addr: SocketAddr, path: &str) -> String {
    send(
        addr,
        &format!(
            "GET {} HTTP/1.1\r\nHost: localhost:{}\r\nAccept: text/html\r\n\r\n",
            path,
            addr.port()
        ),
    )
}

/// A recording in a scratch directory, proxying to `app`.
pub struct RecordingFixture {
    pub recording: Recording,
    pub directory: TempDir,
}

impl RecordingFixture {
    pub fn start(app: &FixtureApp) -> Self {
        Self::start_with(app, |_| {})
    }

    pub fn start_with<F: FnOnce(&mut RecordingConfiguration)>(app: &FixtureApp, configure: F) -> Self {
        init_logging();

        let directory = tempfile::tempdir().unwrap();
        let mut configuration =
            RecordingConfiguration::new(0, app.addr().to_string(), directory.path().join("scenario.xml"));
        configure(&mut configuration);

        let recording = Recording::open(configuration).unwrap();
        recording.start().unwrap();

        Self {
            recording,
            directory,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.recording.local_addr()
    }

    pub fn scenario_path(&self) -> PathBuf {
        self.recording.configuration().output_file().to_path_buf()
    }

    pub fn stop(&self) -> Scenario {
        self.recording.stop().unwrap();
        Scenario::load(self.scenario_path()).unwrap()
    }

    pub fn scenario_text(&self) -> String {
        read_to_string(&self.scenario_path())
    }
}

pub fn read_to_string(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}
