//! Line-oriented remote for an Amplifier backend.
//!
//! Reads commands from stdin, prints session changes as they arrive.
//! Set `AMPLIFIER_BACKEND_URL` to point at a backend other than
//! `ws://localhost:9090/ws`, and `RUST_LOG` to adjust log output.

use amplifier::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ---------------------------------------------------------------------------
// Input parsing
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Input {
    Host,
    Scan,
    Connect(String),
    File(String),
    Play,
    Pause,
    Stop,
    Volume(i32),
    Disconnect,
    Reconnect,
    Status,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  host                 start hosting
  scan                 look for hosts
  connect <host:port>  join a host
  file <path>          load an audio file
  play | pause | stop
  volume <0-100>
  disconnect           leave the network and drop the backend link
  reconnect            reconnect to the backend
  status               print the current state
  quit";

fn parse_line(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "host" => Input::Host,
        "scan" => Input::Scan,
        "connect" if !rest.is_empty() => Input::Connect(rest.to_string()),
        "connect" => return Err("usage: connect <host:port>".into()),
        "file" if !rest.is_empty() => Input::File(rest.to_string()),
        "file" => return Err("usage: file <path>".into()),
        "play" => Input::Play,
        "pause" => Input::Pause,
        "stop" => Input::Stop,
        "volume" | "vol" => match rest.parse() {
            Ok(level) => Input::Volume(level),
            Err(_) => return Err("usage: volume <0-100>".into()),
        },
        "disconnect" => Input::Disconnect,
        "reconnect" => Input::Reconnect,
        "status" | "state" => Input::Status,
        "help" | "?" | "" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(format!("unknown command: {other} (try 'help')")),
    };
    Ok(input)
}

fn execute(client: &Client, input: Input) -> Result<(), ClientError> {
    match input {
        Input::Host => client.become_host(),
        Input::Scan => client.scan_devices(),
        Input::Connect(address) => client.connect_device(&address),
        Input::File(path) => client.select_file(&path),
        Input::Play => client.play(),
        Input::Pause => client.pause(),
        Input::Stop => client.stop(),
        Input::Volume(level) => client.set_volume(level),
        Input::Disconnect => client.disconnect_all(),
        Input::Reconnect => client.reconnect(),
        Input::Status => {
            print_state(&client.state());
            Ok(())
        }
        Input::Help => {
            println!("{HELP}");
            Ok(())
        }
        Input::Quit => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn describe(change: &Change) -> Option<String> {
    let line = match change {
        Change::Status(status) => format!("status: {status}"),
        Change::Role(role) => format!("role: {role:?}"),
        Change::Device(device) => format!(
            "device: {} at {} ({:?})",
            device.name, device.address, device.state
        ),
        Change::DevicesCleared => "devices cleared".to_string(),
        Change::Joined(name) => format!("joined: {name}"),
        Change::Playback(phase) => format!("playback: {phase:?}"),
        Change::Progress(fraction) => format!("progress: {:.0}%", fraction * 100.0),
        Change::Volume(level) => format!("volume: {level}"),
        Change::TrackLoaded { name, duration } => match duration {
            Some(secs) => format!("track: {name} ({secs:.1}s)"),
            None => format!("track: {name}"),
        },
        Change::HostAddress(Some(address)) => format!("hosting at {address}"),
        Change::HostAddress(None) => "no longer hosting".to_string(),
        Change::Activity(message) => format!("* {message}"),
        // Printed from the Phase notification.
        Change::ConnectionPhase(_) => return None,
    };
    Some(line)
}

fn print_notification(notification: &Notification) {
    match notification {
        Notification::Phase(phase) => println!("[backend] {phase}"),
        Notification::State { changes, .. } => {
            for line in changes.iter().filter_map(describe) {
                println!("  {line}");
            }
        }
        Notification::ReconnectScheduled { attempt, delay } => {
            println!("[backend] reconnecting in {delay:?} (attempt {attempt})");
        }
        Notification::ReconnectAbandoned { attempts } => {
            println!("[backend] gave up after {attempts} attempts; type 'reconnect' to retry");
        }
    }
}

fn print_state(state: &SessionState) {
    println!("backend:  {}", state.connection_phase);
    println!("status:   {}", state.status);
    println!("role:     {:?}", state.role);
    println!("playback: {:?} {:.0}%", state.playback, state.progress_fraction * 100.0);
    println!("volume:   {}", state.volume_percent);
    if let Some(track) = &state.loaded_track_name {
        println!("track:    {track}");
    }
    for device in state.discovered.values() {
        println!("device:   {} at {} ({:?})", device.name, device.address, device.state);
    }
    if !state.joined.is_empty() {
        println!("joined:   {}", state.joined.join(", "));
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ClientConfig::default();
    if let Ok(url) = std::env::var("AMPLIFIER_BACKEND_URL") {
        config = config.with_backend_url(url);
    }

    let (client, mut notifications) = Client::open(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            notification = notifications.recv() => match notification {
                Some(notification) => print_notification(&notification),
                None => break,
            },
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to read stdin");
                        break;
                    }
                };
                match parse_line(&line) {
                    Ok(Input::Quit) => break,
                    Ok(input) => {
                        if let Err(e) = execute(&client, input) {
                            println!("error: {e}");
                        }
                    }
                    Err(message) => println!("{message}"),
                }
            }
        }
    }

    client.close().await;
}
