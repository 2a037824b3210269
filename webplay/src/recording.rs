use crate::{
    data::TestRequest,
    error::Error,
    frame::{self, Frame},
    html,
    recording_configuration::RecordingConfiguration,
    scenario::encoder::ScenarioEncoder,
};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    ffi::OsString,
    fs::File,
    io::{self, BufWriter, Write},
    net::{self, SocketAddr},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::{TcpListener, TcpStream},
    runtime::{self, Runtime},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RecordingState {
    Idle,
    Listening,
    Accepted,
    Forwarding,
    Stopping,
    Stopped,
}

impl Default for RecordingState {
    fn default() -> Self {
        RecordingState::Idle
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum StopSignal {
    Requested,
    StopFile,
    Finished,
}

type SharedState = Arc<Mutex<RecordingState>>;

fn set_state(state: &SharedState, new_state: RecordingState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = new_state;
}

/// A recording proxy between HTTP clients and the application under test.
///
/// Every request passing through is appended to the scenario file, together with assertions on
/// the form fields of the response. Recording runs on two threads: one forwards the traffic,
/// the other waits for a stop signal and cancels the first.
pub struct Recording {
    configuration: Arc<RecordingConfiguration>,
    local_addr: SocketAddr,
    listener: Mutex<Option<net::TcpListener>>,
    state: SharedState,
    started: AtomicBool,
    stop_sender: Mutex<Option<Sender<StopSignal>>>,
    watch_thread: Mutex<Option<JoinHandle<Result<(), Error>>>>,
}

impl Recording {
    /// Binds the listening socket. Clients may connect from now on, but nothing is forwarded
    /// before [`Recording::start`].
    pub fn open(configuration: RecordingConfiguration) -> Result<Self, Error> {
        let listener = net::TcpListener::bind((configuration.bind_address(), configuration.port()))?;
        let local_addr = listener.local_addr()?;

        info!("Recording on http://localhost:{}/", local_addr.port());

        Ok(Self {
            configuration: Arc::new(configuration),
            local_addr,
            listener: Mutex::new(Some(listener)),
            state: Arc::new(Mutex::new(RecordingState::Listening)),
            started: AtomicBool::new(false),
            stop_sender: Mutex::new(None),
            watch_thread: Mutex::new(None),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn configuration(&self) -> &RecordingConfiguration {
        &self.configuration
    }

    pub fn state(&self) -> RecordingState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts forwarding. A recording can only be started once.
    pub fn start(&self) -> Result<(), Error> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }

        let listener = self.listener.lock()?.take().ok_or(Error::AlreadyRunning)?;
        listener.set_nonblocking(true)?;

        let output = BufWriter::new(File::create(self.configuration.output_file())?);
        let encoder = if self.configuration.indent() {
            ScenarioEncoder::with_indent(output)
        } else {
            ScenarioEncoder::new(output)
        };
        let runtime = runtime::Builder::new_current_thread().enable_all().build()?;

        let (sender, receiver) = mpsc::channel();
        let watcher = match self.configuration.stop_file() {
            Some(stop_file) => Some(watch_stop_file(stop_file, sender.clone())?),
            None => None,
        };

        let token = CancellationToken::new();
        let forwarding_thread = thread::Builder::new()
            .name("webplay-recorder".into())
            .spawn({
                let configuration = self.configuration.clone();
                let state = self.state.clone();
                let token = token.clone();
                let finished = sender.clone();

                move || {
                    let result = record(
                        &configuration,
                        runtime,
                        listener,
                        encoder,
                        &token,
                        &state,
                    );
                    let _ = finished.send(StopSignal::Finished);
                    result
                }
            })?;

        let watch_thread = thread::Builder::new()
            .name("webplay-stop-watch".into())
            .spawn({
                let state = self.state.clone();

                move || wait_for_stop(receiver, watcher, token, forwarding_thread, &state)
            })?;

        *self.stop_sender.lock()? = Some(sender);
        *self.watch_thread.lock()? = Some(watch_thread);

        Ok(())
    }

    /// Stops the recording and blocks until the scenario file has been completed.
    ///
    /// Stopping a recording that is stopped already, or has never been started, does nothing.
    pub fn stop(&self) -> Result<(), Error> {
        if let Some(sender) = self.stop_sender.lock()?.as_ref() {
            let _ = sender.send(StopSignal::Requested);
        }

        self.join_watch_thread()
    }

    /// Blocks until the stop file is modified and the scenario file has been completed.
    pub fn wait_till_stop(&self) -> Result<(), Error> {
        if self.configuration.stop_file().is_none() {
            return Err(Error::InvalidState("no stop file is configured"));
        }
        if !self.started.load(Ordering::SeqCst) {
            return Err(Error::InvalidState("the recording has not been started"));
        }

        self.join_watch_thread()
    }

    fn join_watch_thread(&self) -> Result<(), Error> {
        // The lock is held while joining so that concurrent callers return after the cleanup.
        let mut watch_thread = self.watch_thread.lock()?;

        match watch_thread.take() {
            Some(handle) => handle.join().map_err(|_| Error::ThreadPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Recording failed: {}", e);
        }
    }
}

fn watch_stop_file(stop_file: &Path, sender: Sender<StopSignal>) -> Result<RecommendedWatcher, Error> {
    let directory = stop_file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name: Option<OsString> = stop_file.file_name().map(Into::into);

    let mut watcher = RecommendedWatcher::new(
        move |event: Result<Event, notify::Error>| match event {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                    && event
                        .paths
                        .iter()
                        .any(|path| path.file_name() == file_name.as_deref())
                {
                    debug!("Stop file has been modified");
                    let _ = sender.send(StopSignal::StopFile);
                }
            }
            Err(err) => error!("Error occurred while watching the stop file: {}", err),
        },
        notify::Config::default(),
    )?;

    watcher.watch(directory, RecursiveMode::NonRecursive)?;

    Ok(watcher)
}

fn wait_for_stop(
    receiver: Receiver<StopSignal>,
    watcher: Option<RecommendedWatcher>,
    token: CancellationToken,
    forwarding_thread: JoinHandle<Result<(), Error>>,
    state: &SharedState,
) -> Result<(), Error> {
    let signal = receiver.recv().unwrap_or(StopSignal::Requested);
    debug!(?signal, "stopping the recording");
    drop(watcher);

    set_state(state, RecordingState::Stopping);
    token.cancel();

    let result = forwarding_thread
        .join()
        .map_err(|_| Error::ThreadPanicked)
        .and_then(|result| result);

    set_state(state, RecordingState::Stopped);
    info!("Recording stopped");

    result
}

fn record<W: Write>(
    configuration: &RecordingConfiguration,
    runtime: Runtime,
    listener: net::TcpListener,
    mut encoder: ScenarioEncoder<W>,
    token: &CancellationToken,
    state: &SharedState,
) -> Result<(), Error> {
    let result: Result<(), Error> = runtime.block_on(async {
        encoder.begin()?;
        let listener = TcpListener::from_std(listener)?;

        tokio::select! {
            result = forward_all(configuration, &listener, &mut encoder, state) => result,
            _ = token.cancelled() => Ok(()),
        }
    });

    // The document is completed on every exit path.
    encoder.end()?;

    if let Err(e) = &result {
        error!("Forwarding failed: {}", e);
    }

    result
}

async fn forward_all<W: Write>(
    configuration: &RecordingConfiguration,
    listener: &TcpListener,
    encoder: &mut ScenarioEncoder<W>,
    state: &SharedState,
) -> Result<(), Error> {
    loop {
        set_state(state, RecordingState::Listening);
        let (client, peer) = listener.accept().await?;
        set_state(state, RecordingState::Accepted);
        debug!(%peer, "client connected");

        match forward_connection(configuration, client, encoder, state).await {
            Ok(()) => debug!(%peer, "client disconnected"),
            Err(Error::MalformedFrame(message)) => {
                warn!(%peer, "Dropping the connection: {}", message);
            }
            Err(Error::IoError(e)) if is_connection_lost(&e) => {
                warn!(%peer, "Lost the connection: {}", e);
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_connection_lost(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

async fn forward_connection<W: Write>(
    configuration: &RecordingConfiguration,
    mut client: TcpStream,
    encoder: &mut ScenarioEncoder<W>,
    state: &SharedState,
) -> Result<(), Error> {
    let (client_read, mut client_write) = client.split();
    let mut client_read = BufReader::new(client_read);

    loop {
        if client_read.fill_buf().await?.is_empty() {
            return Ok(());
        }
        set_state(state, RecordingState::Forwarding);

        let mut upstream = TcpStream::connect(configuration.app_address()).await?;
        let (upstream_read, mut upstream_write) = upstream.split();
        let mut upstream_read = BufReader::new(upstream_read);

        let request = match frame::read_frame(&mut client_read, &mut upstream_write).await? {
            Some(request) => request,
            None => return Ok(()),
        };
        let request_included = configuration.includes(request.mime());
        let adder = encoder
            .cursor()?
            .request(&test_request(&request, request_included))?;

        let response = frame::read_frame(&mut upstream_read, &mut client_write)
            .await?
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "the application closed the connection without a response",
                )
            })?;
        debug!(
            method = %request.method,
            path = %request.path,
            status = %response.path,
            "forwarded request"
        );

        if configuration.includes(response.mime()) || request_included {
            let mut adder = adder;
            for assertion in html::form_field_assertions(&response.body_text()) {
                adder = adder.assertion(&assertion)?;
            }
        }

        set_state(state, RecordingState::Accepted);
    }
}

fn test_request(request: &Frame, with_payload: bool) -> TestRequest {
    TestRequest {
        url_path: request.path.clone(),
        method: request.method.clone(),
        headers: request.headers.clone(),
        payload: if with_payload {
            Some(request.body_text().into_owned())
        } else {
            None
        },
    }
}
