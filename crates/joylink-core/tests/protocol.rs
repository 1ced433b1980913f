use joylink_core::protocol::{
    decode, encode, ConnectionState, InboundFrame, LineFramer, OutboundCommand, ProtocolError,
};
use pretty_assertions::assert_eq;

/// Run a byte stream through framer, codec and state the way the read loop does
fn apply_stream(state: &ConnectionState, chunks: &[&[u8]]) {
    let mut framer = LineFramer::new();
    for chunk in chunks {
        for line in framer.feed_bytes(chunk) {
            state.update_from_frame(&decode(&line));
        }
    }
}

#[test]
fn test_protocol_error_display() {
    let cases = [
        ProtocolError::UnsupportedTransport,
        ProtocolError::ConnectionAborted,
        ProtocolError::OpenFailure("busy".into()),
        ProtocolError::ReadFailure("eof".into()),
        ProtocolError::WriteFailure("pipe".into()),
        ProtocolError::NotConnected,
    ];
    for err in cases {
        assert!(!err.to_string().is_empty());
        assert!(!format!("{:?}", err).is_empty());
    }
}

#[test]
fn test_link_failure_classification() {
    assert!(ProtocolError::ReadFailure("x".into()).is_link_failure());
    assert!(ProtocolError::WriteFailure("x".into()).is_link_failure());
    assert!(!ProtocolError::OpenFailure("x".into()).is_link_failure());
    assert!(!ProtocolError::ConnectionAborted.is_link_failure());
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: ProtocolError = io.into();
    assert!(matches!(err, ProtocolError::IoError(_)));
}

#[test]
fn test_decode_example_line() {
    assert_eq!(
        decode("J,100,200,B,1"),
        InboundFrame::JoystickReport {
            x: 100,
            y: 200,
            mode: 1
        }
    );
}

#[test]
fn test_encode_wire_bytes() {
    assert_eq!(
        encode(&OutboundCommand::SetBrightness { level: 255 }),
        "L,255\n".as_bytes()
    );
    assert_eq!(encode(&OutboundCommand::Blink), "BLINK\n".as_bytes());
}

#[test]
fn test_chunking_does_not_change_final_state() {
    let stream: &[u8] = b"J,1,1,B,0\nnoise\nJ,900,12,B,1\r\nJ,44,55,B,0\n";

    let whole = ConnectionState::new();
    apply_stream(&whole, &[stream]);

    let bytewise = ConnectionState::new();
    let chunks: Vec<&[u8]> = stream.chunks(1).collect();
    apply_stream(&bytewise, &chunks);

    let uneven = ConnectionState::new();
    apply_stream(&uneven, &[&stream[..13], &stream[13..14], &stream[14..]]);

    assert_eq!(whole.snapshot(), bytewise.snapshot());
    assert_eq!(whole.snapshot(), uneven.snapshot());
    assert_eq!(whole.stats().frames_applied, 3);
    assert_eq!(bytewise.stats().lines_dropped, 1);
}

#[test]
fn test_unterminated_report_is_not_applied() {
    let state = ConnectionState::new();
    apply_stream(&state, &[b"J,1,2,B,1"]);
    assert_eq!(state.stats().frames_applied, 0);
    assert_eq!(state.snapshot().joystick_x, 512);
}
