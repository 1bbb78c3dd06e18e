use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use linkprims_channel::{ByteChannel, DatagramConfig, SequencedDatagramChannel};
use tracing::info;

use crate::cmd::listen::install_ctrlc_handler;
use crate::cmd::UdpServeArgs;
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_counters, print_message, OutputFormat, Received};

/// How often the loop re-checks the ctrl-c flag.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: UdpServeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut channel =
        SequencedDatagramChannel::bind_server(args.addr.as_str(), DatagramConfig::default())
            .map_err(|err| channel_error("bind failed", err))?;
    channel
        .begin()
        .map_err(|err| channel_error("begin failed", err))?;
    info!(addr = %args.addr, "serving sequenced datagrams");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let payload = match channel.recv_timeout(POLL_INTERVAL) {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(err) => return Err(channel_error("receive failed", err)),
        };

        let peer = channel
            .peer()
            .map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
        print_message(
            &Received {
                transport: "udp",
                peer: peer.clone(),
                sequence: Some(channel.sequence()),
                payload: &payload,
            },
            format,
        );
        printed = printed.saturating_add(1);

        if args.echo {
            channel
                .send(&payload)
                .map_err(|err| channel_error("reply failed", err))?;
        }

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    if args.stats {
        let peer = channel
            .peer()
            .map_or_else(|| "-".to_string(), |addr| addr.to_string());
        print_counters("udp", &peer, channel.counters(), format);
    }
    channel.stop();
    Ok(SUCCESS)
}
