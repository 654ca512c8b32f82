//! In-process fake PINE server for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Size of the fake emulator's address space.
pub const MEMORY_SIZE: usize = 0x10000;

pub const VERSION: &str = "PCSX2 v1.7.5000";
pub const TITLE: &str = "Test Game";
pub const ID: &str = "SLUS-00000";
pub const UUID: &str = "deadbeef";
pub const GAME_VERSION: &str = "1.00";

/// Highest save-state slot the fake accepts.
pub const MAX_SLOT: u8 = 9;

#[derive(Clone)]
pub struct FakePine {
    pub memory: Arc<Mutex<Vec<u8>>>,
    pub status: u32,
}

impl FakePine {
    pub fn new() -> Self {
        Self {
            memory: Arc::new(Mutex::new(vec![0u8; MEMORY_SIZE])),
            status: 1,
        }
    }

    /// Bind to an ephemeral loopback port and serve connections forever.
    pub async fn spawn(self) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(self.clone().serve(stream));
            }
        });
        port
    }

    async fn serve(self, mut stream: TcpStream) {
        loop {
            let mut prefix = [0u8; 4];
            if stream.read_exact(&mut prefix).await.is_err() {
                return;
            }
            let total = u32::from_le_bytes(prefix) as usize;
            let mut body = vec![0u8; total.saturating_sub(4)];
            if stream.read_exact(&mut body).await.is_err() {
                return;
            }

            let (code, argument) = self.handle(&body);
            let mut answer = ((5 + argument.len()) as u32).to_le_bytes().to_vec();
            answer.push(code);
            answer.extend_from_slice(&argument);
            if stream.write_all(&answer).await.is_err() {
                return;
            }
        }
    }

    fn handle(&self, body: &[u8]) -> (u8, Vec<u8>) {
        match body.first() {
            Some(&op) if op <= 7 => self.memory_ops(body),
            Some(8) => (0, sized_string(VERSION)),
            Some(9) | Some(10) => match body.get(1) {
                Some(&slot) if slot <= MAX_SLOT => (0, Vec::new()),
                _ => (1, Vec::new()),
            },
            Some(11) => (0, sized_string(TITLE)),
            Some(12) => (0, sized_string(ID)),
            Some(13) => (0, sized_string(UUID)),
            Some(14) => (0, sized_string(GAME_VERSION)),
            Some(15) => (0, self.status.to_le_bytes().to_vec()),
            _ => (1, Vec::new()),
        }
    }

    /// Execute a (possibly batched) sequence of reads and writes.
    fn memory_ops(&self, body: &[u8]) -> (u8, Vec<u8>) {
        let mut memory = self.memory.lock().unwrap();
        let mut out = Vec::new();
        let mut i = 0;

        while i < body.len() {
            let op = body[i];
            let width = 1usize << (op & 3);
            let Some(addr) = body.get(i + 1..i + 5) else {
                return (1, Vec::new());
            };
            let addr = u32::from_le_bytes(addr.try_into().unwrap()) as usize;
            i += 5;

            if addr + width > MEMORY_SIZE {
                return (1, Vec::new());
            }

            if op < 4 {
                out.extend_from_slice(&memory[addr..addr + width]);
            } else {
                let Some(data) = body.get(i..i + width) else {
                    return (1, Vec::new());
                };
                memory[addr..addr + width].copy_from_slice(data);
                i += width;
            }
        }

        (0, out)
    }
}

fn sized_string(text: &str) -> Vec<u8> {
    let mut out = ((text.len() + 1) as u32).to_le_bytes().to_vec();
    out.extend_from_slice(text.as_bytes());
    out.push(0);
    out
}

/// Spawn a fake server on its own runtime thread, for blocking-client tests.
pub fn spawn_on_thread(fake: FakePine) -> u16 {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let port = fake.spawn().await;
            tx.send(port).unwrap();
            std::future::pending::<()>().await;
        });
    });
    rx.recv().unwrap()
}
