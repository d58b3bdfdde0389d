//! Decode command implementation.

use serde::Serialize;
use std::path::Path;
use strand_protocol::{FrameDecoder, Packet, DEFAULT_MAX_FRAME_SIZE};

/// One decoded frame, or the error emitted in its place.
#[derive(Debug, Serialize)]
pub struct FrameInfo {
    /// Byte offset of the frame in the stream.
    pub offset: usize,
    /// Bytes consumed by the frame.
    pub length: usize,
    /// Packet type name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_type: Option<String>,
    /// Request id carried by the packet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    /// Short description of the packet contents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Decode error, if the frame could not be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of decoding a whole stream.
#[derive(Debug, Serialize)]
pub struct StreamReport {
    /// Decoded frames in stream order.
    pub frames: Vec<FrameInfo>,
    /// Bytes left over after the last complete frame.
    pub trailing_bytes: usize,
    /// True if decoding stopped on a framing error.
    pub stopped: bool,
}

/// Runs the decode command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let report = decode_stream(&bytes);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

/// Decodes `bytes` frame by frame.
pub fn decode_stream(bytes: &[u8]) -> StreamReport {
    let mut decoder = FrameDecoder::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE);
    decoder.feed(bytes);

    let mut frames = Vec::new();
    let mut offset = 0;
    while let Some(item) = decoder.decode_next() {
        let consumed = bytes.len() - decoder.buffered();
        let mut info = FrameInfo {
            offset,
            length: consumed - offset,
            packet_type: None,
            request_id: None,
            summary: None,
            error: None,
        };
        match item {
            Ok(packet) => {
                info.packet_type = Some(format!("{:?}", packet.packet_type()));
                info.request_id = Some(packet.request_id());
                info.summary = summarize(&packet);
            }
            Err(err) => info.error = Some(err.to_string()),
        }
        frames.push(info);
        offset = consumed;
    }

    StreamReport {
        frames,
        trailing_bytes: decoder.buffered(),
        stopped: decoder.is_poisoned(),
    }
}

fn summarize(packet: &Packet) -> Option<String> {
    let summary = match packet {
        Packet::Query(q) => format!("ds={} query={:?}", q.ds, q.query),
        Packet::Mutate(m) => format!(
            "tx={} ds={} c={} event={:?} records={}",
            m.tx_id,
            m.ds,
            m.collection,
            m.event,
            m.records.len()
        ),
        Packet::Commit(t) | Packet::Rollback(t) => format!("tx={}", t.tx_id),
        Packet::Truncate(t) => format!("ds={} c={}", t.ds, t.collection),
        Packet::DropDatastore(d) => format!("ds={}", d.ds),
        Packet::RegisterHook(h) => format!("hook={}", h.hook),
        Packet::UnregisterHook(h) => format!("hook_id={}", h.hook_id),
        Packet::Response(_) => return None,
        Packet::Error(e) => format!("code={} message={:?}", e.code, e.message),
    };
    Some(summary)
}

fn print_text_output(report: &StreamReport) {
    println!("Frames ({} total)", report.frames.len());
    println!("================");
    println!();

    for frame in &report.frames {
        print!("[{:08}] {:>6}B", frame.offset, frame.length);
        if let Some(ref packet_type) = frame.packet_type {
            print!(" {:14}", packet_type);
        }
        if let Some(id) = frame.request_id {
            print!(" id={}", id);
        }
        if let Some(ref summary) = frame.summary {
            print!(" {}", summary);
        }
        if let Some(ref error) = frame.error {
            print!(" ERROR {}", error);
        }
        println!();
    }

    if report.stopped {
        println!();
        println!("Stream unreadable past this point");
    }
    if report.trailing_bytes > 0 {
        println!("{} trailing bytes", report.trailing_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_protocol::{encode_frame, TxRequest};

    #[test]
    fn reports_offsets_and_errors() {
        let commit = encode_frame(&Packet::Commit(TxRequest::new(7, "tx-1"))).unwrap();
        let mut junk = commit.clone();
        junk[3] = 99;
        let bytes = [commit.clone(), junk, vec![b'S']].concat();

        let report = decode_stream(&bytes);
        assert_eq!(report.frames.len(), 2);
        assert_eq!(report.frames[0].request_id, Some(7));
        assert_eq!(report.frames[0].summary.as_deref(), Some("tx=tx-1"));
        assert_eq!(report.frames[1].offset, commit.len());
        assert!(report.frames[1].error.is_some());
        assert_eq!(report.trailing_bytes, 1);
        assert!(!report.stopped);
    }

    #[test]
    fn stops_on_bad_magic() {
        let report = decode_stream(b"XXXXXXXXXXXX");
        assert_eq!(report.frames.len(), 1);
        assert!(report.stopped);
    }
}
