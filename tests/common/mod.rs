#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use yeelight_lan::{Config, Device};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// In-process light speaking the line protocol on 127.0.0.1
pub struct FakeLight {
    pub port: u16,
    requests: mpsc::UnboundedReceiver<Value>,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    accepted: Arc<AtomicUsize>,
}

impl FakeLight {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, requests) = mpsc::unbounded_channel();
        let writer = Arc::new(Mutex::new(None));
        let accepted = Arc::new(AtomicUsize::new(0));

        let current_writer = writer.clone();
        let accept_count = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_count.fetch_add(1, Ordering::SeqCst);
                let (read, write) = stream.into_split();
                *current_writer.lock().await = Some(write);

                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(read).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let request: Value = serde_json::from_str(line.trim()).unwrap();
                        let _ = tx.send(request);
                    }
                });
            }
        });

        Self {
            port,
            requests,
            writer,
            accepted,
        }
    }

    pub fn announcement(&self, id: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nid: {}\r\nname: fake\r\nlocation: yeelight://127.0.0.1:{}\r\nmodel: color\r\nfw_ver: 18\r\nsupport: get_prop set_power toggle set_rgb set_hsv set_bright\r\npower: on\r\nbright: 80\r\n",
            id, self.port
        )
    }

    pub fn device(&self, id: &str, config: Config) -> Device {
        Device::from_announcement(self.announcement(id).as_bytes(), config).unwrap()
    }

    /// Number of TCP connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Poll until at least `n` connections have been accepted
    pub async fn wait_accepted(&self, n: usize) {
        timeout(Duration::from_secs(2), async {
            while self.accepted() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection was not accepted");
    }

    pub async fn next_request(&mut self) -> Value {
        timeout(Duration::from_secs(2), self.requests.recv())
            .await
            .expect("no request within 2s")
            .expect("request channel closed")
    }

    pub async fn send_raw(&self, data: &str) {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().expect("no client connected");
        writer.write_all(data.as_bytes()).await.unwrap();
    }

    pub async fn reply(&self, request: &Value, result: Value) {
        let line = json!({ "id": request["id"], "result": result }).to_string();
        self.send_raw(&format!("{}\r\n", line)).await;
    }

    /// Close the server side of the current connection
    pub async fn hang_up(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }
}

pub fn fast_config() -> Config {
    Config::default()
        .with_request_timeout(Duration::from_secs(2))
        .with_connect_timeout(Duration::from_secs(2))
        .with_health_timeout(Duration::from_millis(200))
        .with_verbose(true)
}

/// Poll until the device reports no live stream
pub async fn wait_disconnected(device: &Device) {
    timeout(Duration::from_secs(2), async {
        while device.is_connected().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("device did not observe the hang-up");
}
