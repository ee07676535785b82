// src/session.rs
//
// Session coordinator. Opens the channels, runs one blocking read loop per
// channel, the async input loop and the single-writer sink, and drives
// shutdown: stop signal, join read loops, stop input, drain sink, close
// channels.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::io::input::{run_input, Dispatch, InputContext, InputOutcome};
use crate::io::relay::RelayState;
use crate::io::serial::{spawn_channel_reader, ReaderContext, SerialChannel};
use crate::io::sink::Sink;
use crate::io::{Direction, HextermError, HextermResult, Role, SinkEvent, SinkSender, StopSignal};
use crate::settings::Settings;

/// The open channels of a session
pub enum Channels {
    Single(SerialChannel),
    Mitm { dce: SerialChannel, dte: SerialChannel },
}

/// Operator-side streams
pub struct SessionIo {
    pub input: Box<dyn AsyncBufRead + Send + Unpin>,
    /// Shown in parse and I/O error reports
    pub input_name: String,
    pub console: Box<dyn Write + Send>,
    pub log: Option<Box<dyn Write + Send>>,
}

// ============================================================================
// Setup
// ============================================================================

/// Open the primary port, plus the DTE peer in MITM mode.
pub fn open_channels(settings: &Settings) -> HextermResult<Channels> {
    let timeout = settings.tuning.read_timeout();
    match &settings.peer {
        None => Ok(Channels::Single(SerialChannel::open(&settings.port, Role::Dce, timeout)?)),
        Some(peer) => {
            let dce = SerialChannel::open(&settings.port, Role::Dce, timeout)?;
            let dte = SerialChannel::open(peer, Role::Dte, timeout)?;
            Ok(Channels::Mitm { dce, dte })
        }
    }
}

/// Open the script (or stdin), the console and the log file.
pub async fn open_io(settings: &Settings) -> HextermResult<SessionIo> {
    let (input, input_name): (Box<dyn AsyncBufRead + Send + Unpin>, String) = match &settings.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| HextermError::file(path, e))?;
            (Box::new(BufReader::new(file)), path.display().to_string())
        }
        None => (Box::new(BufReader::new(tokio::io::stdin())), "stdin".to_string()),
    };

    let log: Option<Box<dyn Write + Send>> = match &settings.output {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| HextermError::file(path, e))?;
            tlog!("[session] Logging messages to {}", path.display());
            Some(Box::new(std::io::BufWriter::new(file)))
        }
        None => None,
    };

    Ok(SessionIo {
        input,
        input_name,
        console: Box::new(std::io::stdout()),
        log,
    })
}

/// Open everything from `settings` and run until shutdown.
pub async fn run_session(settings: Arc<Settings>) -> HextermResult<()> {
    let io = open_io(&settings).await?;
    let channels = open_channels(&settings)?;
    run_with(settings, channels, io).await
}

// ============================================================================
// Supervision
// ============================================================================

fn start_reader(
    channel: &mut SerialChannel,
    direction: Direction,
    relay: Option<&RelayState>,
    settings: &Arc<Settings>,
    sink: &SinkSender,
    stop: &StopSignal,
) -> HextermResult<JoinHandle<HextermResult<()>>> {
    let reader = channel
        .take_reader()
        .ok_or_else(|| HextermError::config(format!("read half of {} already taken", channel.port())))?;
    let ctx = ReaderContext {
        port: channel.port().to_string(),
        direction,
        settings: settings.clone(),
        forward: relay.map(|r| r.forwarder_for(channel.role())),
        sink: sink.clone(),
        stop: stop.clone(),
    };
    Ok(spawn_channel_reader(reader, ctx))
}

fn task_failed(what: &str, err: tokio::task::JoinError) -> HextermError {
    HextermError::port_io(what, std::io::Error::other(format!("task failed: {}", err)))
}

/// Run a session over already-open channels and operator streams.
///
/// Returns the first fatal error, after every loop has exited and the sink
/// has drained.
pub async fn run_with(settings: Arc<Settings>, mut channels: Channels, io: SessionIo) -> HextermResult<()> {
    let stop = StopSignal::new();
    let (sink_tx, sink_rx) = mpsc::channel(settings.tuning.queue_capacity);
    let sink_task = Sink::new(io.console, io.log, settings.tuning.max_message_len).spawn(sink_rx);

    let mut readers = Vec::new();
    let (dispatch, relay, banner) = match &mut channels {
        Channels::Single(channel) => {
            readers.push((
                channel.port().to_string(),
                start_reader(channel, Direction::Received, None, &settings, &sink_tx, &stop)?,
            ));
            let banner = format!("{} open, {}; type help for commands", settings.port, settings.codec);
            (Dispatch::Single(channel.writer()), None, banner)
        }
        Channels::Mitm { dce, dte } => {
            let relay = Arc::new(RelayState::new(dce, dte, settings.forwarding)?);
            relay.start()?;
            for channel in [dce, dte] {
                let direction = Direction::relayed_from(channel.role());
                readers.push((
                    channel.port().to_string(),
                    start_reader(channel, direction, Some(&*relay), &settings, &sink_tx, &stop)?,
                ));
            }
            let banner = format!(
                "relaying DTE {} <-> DCE {}, forwarding {}; type help for commands",
                settings.peer.as_ref().map(|p| p.name.as_str()).unwrap_or("?"),
                settings.port.name,
                if relay.forwarding() { "on" } else { "off" }
            );
            (Dispatch::Relay(relay.clone()), Some(relay), banner)
        }
    };
    let _ = sink_tx.send(SinkEvent::Notice(banner)).await;

    let input_ctx = InputContext {
        source: io.input_name,
        settings: settings.clone(),
        dispatch,
        sink: sink_tx.clone(),
        stop: stop.clone(),
    };
    let mut input_task = tokio::spawn(run_input(io.input, input_ctx));
    let mut input_done = false;
    let mut first_error: Option<HextermError> = None;

    loop {
        tokio::select! {
            _ = stop.wait() => {
                tlog!("[session] Stop signal raised");
                break;
            }
            joined = &mut input_task, if !input_done => {
                input_done = true;
                match joined {
                    Ok(Ok(InputOutcome::EndOfInput)) if settings.is_mitm() => {
                        let _ = sink_tx
                            .send(SinkEvent::Notice("end of input; relay keeps running until Ctrl-C".to_string()))
                            .await;
                    }
                    Ok(Ok(outcome)) => {
                        tlog!("[session] Input finished: {:?}", outcome);
                        break;
                    }
                    Ok(Err(e)) => {
                        first_error = Some(e);
                        break;
                    }
                    Err(e) => {
                        first_error = Some(task_failed("input", e));
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tlog!("[session] Interrupted");
                break;
            }
        }
    }

    // Every loop observes this within one read timeout and flushes
    stop.trigger();

    for (port, handle) in readers {
        let result = handle.await.unwrap_or_else(|e| Err(task_failed(&port, e)));
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }

    if !input_done {
        match input_task.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(task_failed("input", e));
            }
        }
    }

    if let Some(relay) = &relay {
        relay.close();
    }

    // Last sender gone: the sink drains and exits
    drop(sink_tx);
    if let Err(e) = sink_task.await {
        tlog!("[session] Sink task failed: {}", e);
    }

    drop(relay);
    drop(channels);
    tlog!("[session] Closed");

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
