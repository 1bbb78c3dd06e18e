use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use linkprims_channel::{AckListener, ByteChannel, ChannelError};
use tracing::{debug, info};

use crate::cmd::send::peer_label;
use crate::cmd::ListenArgs;
use crate::exit::{channel_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_counters, print_message, OutputFormat, Received};

/// How often the loops re-check the ctrl-c flag.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        AckListener::bind(args.addr.as_str()).map_err(|err| channel_error("bind failed", err))?;
    info!(addr = %listener.local_addr(), "waiting for connections");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let mut stream = match listener.accept_timeout(POLL_INTERVAL) {
            Ok(Some(stream)) => stream,
            Ok(None) => continue,
            Err(err) => return Err(channel_error("accept failed", err)),
        };
        let peer = peer_label(&stream).unwrap_or_else(|| "unknown".to_string());
        debug!(%peer, "connection accepted");

        while running.load(Ordering::SeqCst) {
            let frame = match stream.recv_within(POLL_INTERVAL) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(ChannelError::Closed) => break,
                Err(err) => return Err(channel_error("receive failed", err)),
            };

            print_message(
                &Received {
                    transport: "tcp",
                    peer: peer.clone(),
                    sequence: None,
                    payload: &frame,
                },
                format,
            );
            printed = printed.saturating_add(1);

            if args.echo {
                stream
                    .send(&frame)
                    .map_err(|err| channel_error("echo failed", err))?;
            }

            if let Some(count) = args.count {
                if printed >= count {
                    if args.stats {
                        print_counters("tcp", &peer, stream.counters(), format);
                    }
                    return Ok(SUCCESS);
                }
            }
        }

        debug!(%peer, "connection ended");
        if args.stats {
            print_counters("tcp", &peer, stream.counters(), format);
        }
    }

    Ok(SUCCESS)
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
