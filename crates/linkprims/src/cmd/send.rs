use std::time::Duration;

use linkprims_channel::{AckConfig, AckHandshakeStream, ByteChannel, ChannelError};
use linkprims_transport::{StreamSocket, StreamTransport, TransportConfig};

use crate::cmd::{parse_duration, resolve_payload, SendArgs};
use crate::exit::{channel_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_counters, print_message, OutputFormat, Received};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = AckConfig {
        ack_timeout: parse_duration(&args.ack_timeout)?,
        ..AckConfig::default()
    };
    let transport = TransportConfig {
        connect_timeout: parse_duration(&args.connect_timeout)?,
        ..TransportConfig::default()
    };
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args.payload)?;

    let mut stream = AckHandshakeStream::connect(args.addr.as_str(), config, &transport)
        .map_err(|err| channel_error("connect failed", err))?;
    let peer = peer_label(&stream).unwrap_or_else(|| args.addr.clone());

    send_lines(&mut stream, &payload).map_err(|err| channel_error("send failed", err))?;

    if args.wait {
        let frame = wait_for_response(&mut stream, wait_timeout)?;
        print_message(
            &Received {
                transport: "tcp",
                peer: peer.clone(),
                sequence: None,
                payload: &frame,
            },
            format,
        );
    }

    if args.stats {
        print_counters("tcp", &peer, stream.counters(), format);
    }
    stream.close();
    Ok(SUCCESS)
}

/// Send `payload` as frames, one per line. A last line without a trailing
/// newline is terminated here.
fn send_lines<S: StreamTransport>(
    stream: &mut AckHandshakeStream<S>,
    payload: &[u8],
) -> linkprims_channel::Result<()> {
    stream.write(payload)?;
    if !payload.ends_with(b"\n") {
        stream.write(b"\n")?;
    }
    Ok(())
}

fn wait_for_response<S: StreamTransport>(
    stream: &mut AckHandshakeStream<S>,
    timeout: Duration,
) -> CliResult<Vec<u8>> {
    match stream.recv_within(timeout) {
        Ok(Some(frame)) => Ok(frame.to_vec()),
        Ok(None) => Err(CliError::new(
            TIMEOUT,
            format!("no response within {timeout:?}"),
        )),
        Err(ChannelError::Closed) => Err(CliError::new(
            FAILURE,
            "peer closed the connection before responding",
        )),
        Err(err) => Err(channel_error("receive failed", err)),
    }
}

pub(crate) fn peer_label(stream: &AckHandshakeStream<StreamSocket>) -> Option<String> {
    stream
        .get_ref()
        .and_then(StreamSocket::peer_addr)
        .map(|addr| addr.to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn send_lines_terminates_last_line() {
        let (left, mut right) = StreamSocket::pair().expect("socket pair should open");
        right.write_all(b"#ACK#\n#ACK#\n").expect("acks should be queued");
        let mut stream = AckHandshakeStream::new(left).expect("stream should wrap");

        send_lines(&mut stream, b"one\ntwo").expect("both frames should be acked");

        let mut wire = [0u8; 8];
        right.read_exact(&mut wire).expect("frames should arrive");
        assert_eq!(&wire, b"one\ntwo\n");
        assert_eq!(stream.send_count(), 2);
    }

    #[test]
    fn wait_for_response_times_out_with_exit_124() {
        let (left, _right) = StreamSocket::pair().expect("socket pair should open");
        let mut stream = AckHandshakeStream::new(left).expect("stream should wrap");

        let err = wait_for_response(&mut stream, Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn wait_for_response_reports_peer_close() {
        let (left, right) = StreamSocket::pair().expect("socket pair should open");
        let mut stream = AckHandshakeStream::new(left).expect("stream should wrap");
        drop(right);

        let err = wait_for_response(&mut stream, Duration::from_secs(2)).unwrap_err();
        assert_eq!(err.code, FAILURE);
    }
}
