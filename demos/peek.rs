//! Peek - read a few values from a running emulator.
//!
//! This demo shows how to:
//! - Connect with the builder pattern
//! - Query emulator and game information
//! - Read a value and a string from guest memory
//!
//! # Running
//!
//! Start an emulator with PINE enabled (default slot 28011), then:
//!
//! ```text
//! RUST_LOG=pine_client=debug cargo run --example peek -- 0x00100000
//! ```

use pine_client::{PineClient, DEFAULT_STRING_LENGTH};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let address = match std::env::args().nth(1) {
        Some(arg) => parse_address(&arg)?,
        None => 0x0010_0000,
    };

    let client = PineClient::builder().connect().await?;

    println!("emulator: {}", client.version().await?);
    println!("status:   {:?}", client.status().await?);
    match client.title().await {
        Ok(title) => println!("game:     {} ({})", title, client.id().await?),
        Err(e) => println!("game:     none ({e})"),
    }

    let value: u32 = client.read(address).await?;
    println!("[{address:#010x}] u32 = {value:#010x}");

    let text = client.read_string(address, DEFAULT_STRING_LENGTH).await?;
    println!("[{address:#010x}] str = {text:?}");

    client.shutdown().await;
    Ok(())
}

fn parse_address(arg: &str) -> Result<u64, std::num::ParseIntError> {
    match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => arg.parse(),
    }
}
