//! Simulated devices speaking the real wire format on loopback.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use kasa_local::{codec, crypto};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    task::JoinHandle,
};

/// Routes library logs to the test output; `RUST_LOG=kasa_local=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn plug_sysinfo(device_id: &str) -> Value {
    json!({
        "alias": "Kitchen Plug",
        "model": "HS110(US)",
        "deviceId": device_id,
        "type": "IOT.SMARTPLUGSWITCH",
        "mac": "50:C7:BF:00:00:01",
        "sw_ver": "1.5.6",
        "hw_ver": "2.0",
        "feature": "TIM:ENE",
        "relay_state": 0,
        "led_off": 0,
        "err_code": 0
    })
}

pub fn strip_sysinfo(device_id: &str) -> Value {
    json!({
        "alias": "Power Strip",
        "model": "HS300(US)",
        "deviceId": device_id,
        "type": "IOT.SMARTPLUGSWITCH",
        "mac": "50:C7:BF:00:00:02",
        "children": [
            {"id": "00", "alias": "Lamp", "state": 1},
            {"id": "01", "alias": "Fan", "state": 0}
        ],
        "err_code": 0
    })
}

/// A TCP device answering every connection with `respond(request)`.
pub struct TcpDevice {
    pub port: u16,
    pub requests: Arc<parking_lot::Mutex<Vec<Value>>>,
    task: JoinHandle<()>,
}

impl Drop for TcpDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TcpDevice {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, respond)
    }

    /// Like `start`, on `[::1]`. `None` when the host has no IPv6 loopback.
    pub async fn start_v6<F>(respond: F) -> Option<Self>
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("[::1]:0").await.ok()?;
        Some(Self::serve(listener, respond))
    }

    fn serve<F>(listener: TcpListener, respond: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let respond = Arc::new(respond);

        let seen = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let respond = Arc::clone(&respond);
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let _ = serve_tcp(stream, respond.as_ref(), &seen).await;
                });
            }
        });

        Self { port, requests, task }
    }
}

async fn serve_tcp<F>(
    mut stream: TcpStream,
    respond: &F,
    seen: &parking_lot::Mutex<Vec<Value>>,
) -> std::io::Result<()>
where
    F: Fn(&Value) -> Value,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let mut payload = vec![0u8; u32::from_be_bytes(header) as usize];
    stream.read_exact(&mut payload).await?;

    let request = codec::decode(&payload).unwrap_or(Value::Null);
    seen.lock().push(request.clone());

    let reply = respond(&request).to_string();
    let framed = crypto::encrypt_with_header(reply.as_bytes());
    // Split the reply to exercise reassembly
    let (first, rest) = framed.split_at(framed.len() / 2);
    stream.write_all(first).await?;
    stream.flush().await?;
    tokio::task::yield_now().await;
    stream.write_all(rest).await?;

    // Wait for the client to half-close
    let mut sink = [0u8; 64];
    while stream.read(&mut sink).await? > 0 {}
    Ok(())
}

/// A UDP device answering discovery probes with its sysinfo.
pub struct UdpDevice {
    pub addr: SocketAddr,
    pub silent: Arc<AtomicBool>,
    pub probes: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl Drop for UdpDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl UdpDevice {
    /// Replies with `{"system":{"get_sysinfo": sysinfo}}`.
    pub async fn start(sysinfo: Value) -> Self {
        let reply = json!({"system": {"get_sysinfo": sysinfo}}).to_string();
        Self::start_raw(codec::encode(&reply)).await
    }

    /// Replies with the given bytes verbatim.
    pub async fn start_raw(reply: Vec<u8>) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let silent = Arc::new(AtomicBool::new(false));
        let probes = Arc::new(AtomicUsize::new(0));

        let (is_silent, count) = (Arc::clone(&silent), Arc::clone(&probes));
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            loop {
                let Ok((n, from)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                count.fetch_add(1, Ordering::SeqCst);
                let is_probe = codec::decode(&buf[..n])
                    .map(|request| request == json!({"system": {"get_sysinfo": {}}}))
                    .unwrap_or(false);
                if is_probe && !is_silent.load(Ordering::SeqCst) {
                    let _ = socket.send_to(&reply, from).await;
                }
            }
        });

        Self {
            addr,
            silent,
            probes,
            task,
        }
    }

    pub fn go_silent(&self) {
        self.silent.store(true, Ordering::SeqCst);
    }
}
