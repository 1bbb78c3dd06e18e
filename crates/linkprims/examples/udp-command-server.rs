//! Sequenced datagram command server.
//!
//! Each accepted datagram is parsed as one command per line. Replies are
//! collected in a `MemoryChannel` and sent back as a single datagram, so the
//! client sees exactly one answer per request.
//!
//! Run with:
//!   cargo run --example udp-command-server
//!
//! In another terminal:
//!   cargo run --features cli -- udp-send 127.0.0.1:4211 --data 'ping' --wait

use linkprims::channel::{ByteChannel, DatagramConfig, MemoryChannel, SequencedDatagramChannel};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut channel =
        SequencedDatagramChannel::bind_server("127.0.0.1:4211", DatagramConfig::default())?;
    channel.begin()?;
    eprintln!("Serving on {}", channel.local_addr()?);

    loop {
        let Some(request) = channel.recv_timeout(std::time::Duration::from_secs(1))? else {
            continue;
        };

        let mut commands = MemoryChannel::with_input(&request);
        let mut replies = MemoryChannel::new();
        let mut buf = [0u8; 256];
        let mut input = Vec::new();
        loop {
            let n = commands.read(&mut buf)?;
            if n == 0 {
                break;
            }
            input.extend_from_slice(&buf[..n]);
        }

        for line in input.split(|&b| b == b'\n').filter(|l| !l.is_empty()) {
            let reply = match line {
                b"ping" => b"pong\n".as_slice(),
                b"status" => b"ok\n".as_slice(),
                _ => b"unknown command\n".as_slice(),
            };
            replies.write(reply)?;
        }
        replies.flush()?;

        let answer = replies.take_output();
        if !answer.is_empty() {
            channel.send(&answer)?;
        }
        eprintln!(
            "sequence={} dropped={}",
            channel.sequence(),
            channel.counters().dropped
        );
    }
}
