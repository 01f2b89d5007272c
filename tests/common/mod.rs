#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dobot_teleop::transport::TransportSettings;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the stub controller does with one received line.
pub enum Response {
    Line(String),
    Silent,
    Hangup,
}

type Responder = Arc<dyn Fn(&str) -> Response + Send + Sync>;

/// Dashboard port stand-in on `127.0.0.1`, one reply line per command line.
pub struct StubController {
    pub address: String,
    received: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl StubController {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Response + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let received = Arc::new(Mutex::new(Vec::new()));
        let responder: Responder = Arc::new(responder);

        let log = received.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, responder.clone(), log.clone()));
            }
        });

        Self {
            address,
            received,
            task,
        }
    }

    /// Answers every command with `0,{},<command>;`.
    pub async fn accepting() -> Self {
        Self::start(|line| Response::Line(format!("0,{{}},{};", line))).await
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let received = self.received();
            if received.len() >= count || tokio::time::Instant::now() >= deadline {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Drop for StubController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream, responder: Responder, log: Arc<Mutex<Vec<String>>>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        log.lock().unwrap().push(line.clone());
        match responder(&line) {
            Response::Line(reply) => {
                if writer.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                    return;
                }
            }
            Response::Silent => {}
            Response::Hangup => return,
        }
    }
}

/// Address nothing listens on.
pub async fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

pub fn fast_settings() -> TransportSettings {
    TransportSettings {
        dial_timeout: Duration::from_millis(500),
        settle_delay: Duration::ZERO,
        reply_timeout: Duration::from_millis(200),
    }
}

pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
