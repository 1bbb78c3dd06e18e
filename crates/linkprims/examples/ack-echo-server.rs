//! Acknowledged echo server: accepts one client and sends every frame back.
//!
//! Run with:
//!   cargo run --example ack-echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:4210 --data 'led on' --wait

use linkprims::channel::{AckListener, ChannelError};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = AckListener::bind("127.0.0.1:4210")?;
    eprintln!("Listening on {}", listener.local_addr());

    let mut stream = listener.accept()?;
    eprintln!("Client connected");

    loop {
        match stream.recv() {
            Ok(frame) => {
                eprintln!("Received {} bytes", frame.len());
                stream.send(&frame)?;
            }
            Err(ChannelError::Timeout(_)) => continue,
            Err(e) => {
                eprintln!("Client gone: {e}");
                break;
            }
        }
    }

    eprintln!("sent={} received={}", stream.send_count(), stream.receive_count());
    Ok(())
}
