use std::net::SocketAddr;

use linkprims_channel::{ByteChannel, DatagramConfig, SequencedDatagramChannel};

use crate::cmd::{parse_duration, resolve_addr, resolve_payload, UdpSendArgs};
use crate::exit::{channel_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_counters, print_message, OutputFormat, Received};

pub fn run(args: UdpSendArgs, format: OutputFormat) -> CliResult<i32> {
    let remote = resolve_addr(&args.addr)?;
    let config = DatagramConfig {
        sync_timeout: parse_duration(&args.sync_timeout)?,
        ..DatagramConfig::default()
    };
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args.payload)?;
    let bind = args.bind.clone().unwrap_or_else(|| default_bind(remote));

    let mut channel = SequencedDatagramChannel::bind_client(bind.as_str(), remote, config)
        .map_err(|err| channel_error("bind failed", err))?;
    channel
        .begin()
        .map_err(|err| channel_error("sync failed", err))?;
    channel
        .send(&payload)
        .map_err(|err| channel_error("send failed", err))?;

    if args.wait {
        let reply = channel
            .recv_timeout(wait_timeout)
            .map_err(|err| channel_error("receive failed", err))?
            .ok_or_else(|| CliError::new(TIMEOUT, format!("no reply within {wait_timeout:?}")))?;
        print_message(
            &Received {
                transport: "udp",
                peer: remote.to_string(),
                sequence: Some(channel.sequence()),
                payload: &reply,
            },
            format,
        );
    }

    if args.stats {
        print_counters("udp", &remote.to_string(), channel.counters(), format);
    }
    channel.stop();
    Ok(SUCCESS)
}

fn default_bind(remote: SocketAddr) -> String {
    if remote.is_ipv4() {
        "0.0.0.0:0".to_string()
    } else {
        "[::]:0".to_string()
    }
}
