use std::fs;
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use loide::app::run::{Frame, channel};
use loide::app::session::Session;
use loide::app::tabs::MemoryBufferFactory;
use loide::domain::model::TabId;
use loide::infra::config::Config;
use loide::infra::socket::WebSocketTransport;
use predicates::prelude::*;
use serde_json::{Value, json};
use tungstenite::Message;

const CATALOG: &str = include_str!("fixtures/languages.json");
const PROJECT: &str = include_str!("fixtures/project.json");

/// Serve one connection, answering the catalog request and every run with `model`.
fn spawn_solver(model: &'static str) -> (String, JoinHandle<Vec<Frame>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind solver");
    let url = format!("ws://{}", listener.local_addr().expect("local addr"));
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept client");
        let mut socket = tungstenite::accept(stream).expect("websocket handshake");
        let mut received = Vec::new();
        loop {
            let text = match socket.read() {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            let frame: Frame = serde_json::from_str(text.as_str()).expect("client frame");
            let reply = match frame.event.as_str() {
                channel::GET_LANGUAGES => {
                    Frame::new(channel::LANGUAGES, Some(Value::String(CATALOG.into())))
                }
                channel::RUN => Frame::new(
                    channel::OUTPUT,
                    Some(json!({"model": model, "error": ""})),
                ),
                _ => continue,
            };
            received.push(frame);
            let reply = serde_json::to_string(&reply).expect("encode reply");
            if socket.send(Message::text(reply)).is_err() {
                break;
            }
        }
        received
    });
    (url, handle)
}

fn pump_until(session: &mut Session, done: impl Fn(&Session) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(session) {
        assert!(Instant::now() < deadline, "solver did not answer in time");
        session.pump();
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn session_runs_over_websocket() {
    let (url, solver) = spawn_solver("{a}");
    let transport = WebSocketTransport::new(&url).unwrap();
    let mut session = Session::new(
        &Config::default(),
        Box::new(transport),
        Box::new(MemoryBufferFactory),
    );

    session.start();
    pump_until(&mut session, Session::has_catalog);
    assert_eq!(session.settings().solver(), "dlv");

    session.tabs_mut().set_text(TabId::new(1), "a.").unwrap();
    session.run();
    pump_until(&mut session, |session| session.pending_runs() == 0);
    assert_eq!(session.output().model, "{a}");
    assert!(session.output().open);

    drop(session);
    let frames = solver.join().expect("solver thread");
    let events: Vec<&str> = frames.iter().map(|frame| frame.event.as_str()).collect();
    assert_eq!(events, [channel::GET_LANGUAGES, channel::RUN]);
    let payload: Value =
        serde_json::from_str(frames[1].data.as_ref().and_then(Value::as_str).unwrap()).unwrap();
    assert_eq!(payload["program"], json!(["a."]));
}

#[test]
fn cli_run_prints_model() {
    let (url, solver) = spawn_solver("{a, p, q}");
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("project.json");
    fs::write(&path, PROJECT).unwrap();
    let out = temp.path().join("out");
    let state = temp.path().join("state");
    let config = temp.path().join("config.toml");
    fs::write(
        &config,
        format!("[project]\nstorage_dir = {:?}\n", state.to_str().unwrap()),
    )
    .unwrap();

    Command::cargo_bin("loide")
        .expect("binary exists")
        .env_remove("LOIDE_API_URL")
        .args(["run", path.to_str().unwrap(), "--api-url", &url])
        .args(["--config", config.to_str().unwrap()])
        .args(["--save-output", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("{a, p, q}"));

    let frames = solver.join().expect("solver thread");
    assert_eq!(frames.len(), 2);
    assert_eq!(
        fs::read_to_string(out.join("LoIDE_output.txt")).unwrap(),
        "{a, p, q}\n"
    );

    let stored = fs::read_to_string(state.join("storage.json")).unwrap();
    assert!(stored.contains("loideProject"));
}

/// Answer the catalog request and hang up, then serve runs on the next connection.
fn spawn_flaky_solver(model: &'static str) -> (String, JoinHandle<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind solver");
    let url = format!("ws://{}", listener.local_addr().expect("local addr"));
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept client");
        let mut socket = tungstenite::accept(stream).expect("websocket handshake");
        if let Ok(Message::Text(_)) = socket.read() {
            let reply = Frame::new(channel::LANGUAGES, Some(Value::String(CATALOG.into())));
            let reply = serde_json::to_string(&reply).expect("encode reply");
            socket.send(Message::text(reply)).expect("send catalog");
        }
        let _ = socket.close(None);
        while socket.read().is_ok() {}

        let (stream, _) = listener.accept().expect("accept reconnect");
        let mut socket = tungstenite::accept(stream).expect("websocket handshake");
        let mut runs = 0;
        loop {
            let text = match socket.read() {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            let frame: Frame = serde_json::from_str(text.as_str()).expect("client frame");
            if frame.event != channel::RUN {
                continue;
            }
            runs += 1;
            let reply = Frame::new(channel::OUTPUT, Some(json!({"model": model, "error": ""})));
            let reply = serde_json::to_string(&reply).expect("encode reply");
            if socket.send(Message::text(reply)).is_err() {
                break;
            }
        }
        runs
    });
    (url, handle)
}

#[test]
fn run_after_server_hangup_reconnects() {
    let (url, solver) = spawn_flaky_solver("{b}");
    let transport = WebSocketTransport::new(&url).unwrap();
    let mut session = Session::new(
        &Config::default(),
        Box::new(transport),
        Box::new(MemoryBufferFactory),
    );

    session.start();
    pump_until(&mut session, Session::has_catalog);

    // Let the socket thread observe the close before anything is pumped.
    thread::sleep(Duration::from_millis(600));
    session.tabs_mut().set_text(TabId::new(1), "b.").unwrap();
    session.run();
    pump_until(&mut session, |session| session.pending_runs() == 0);
    assert_eq!(session.output().model, "{b}");
    assert!(session.take_notifications().is_empty());

    drop(session);
    assert_eq!(solver.join().expect("solver thread"), 1);
}
