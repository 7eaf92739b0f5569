//! Session handshake: Open, flow-control window, failover log fetch.
//!
//! These exchanges are strict request/response pairs and run before the
//! runtime loop takes over the read half.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Result, UprError};
use crate::event::FailoverLog;
use crate::protocol::{Frame, Opcode, Status};
use crate::transport::FrameReader;
use crate::writer::{write_all, TransmitHandle};

/// Opaque of the Open request.
pub const OPAQUE_OPEN: u32 = 0xBEAF_0001;

/// Opaque of failover log requests.
pub const OPAQUE_FAILOVER: u32 = 0xDEAD_BEEF;

/// Open flag marking this connection as a consumer.
pub const CONSUMER_FLAG: u32 = 1;

/// Control key for the flow-control window.
pub const BUFFER_SIZE_KEY: &str = "connection_buffer_size";

/// Open request frame.
pub fn open_frame(name: &str, sequence: u32) -> Frame {
    let mut extras = [0u8; 8];
    extras[0..4].copy_from_slice(&sequence.to_be_bytes());
    extras[4..8].copy_from_slice(&CONSUMER_FLAG.to_be_bytes());

    Frame::request(Opcode::Open)
        .with_opaque(OPAQUE_OPEN)
        .with_key(name.to_string())
        .with_extras(extras.to_vec())
}

/// Validate the producer's reply to Open.
pub fn check_open_response(response: &Frame) -> Result<()> {
    if response.opcode() != Some(Opcode::Open) {
        return Err(UprError::HandshakeOpcode(response.opcode));
    }
    if response.opaque != OPAQUE_OPEN {
        return Err(UprError::OpaqueMismatch {
            expected: OPAQUE_OPEN,
            got: response.opaque,
        });
    }
    if !response.status().is_success() {
        return Err(UprError::HandshakeStatus(response.status()));
    }
    Ok(())
}

/// Open a UPR session as a consumer.
///
/// Writes straight to the connection: no worker exists yet, and none is
/// started if this fails.
pub async fn open<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut W,
    name: &str,
    sequence: u32,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_all(writer, &open_frame(name, sequence).encode()).await?;

    let response = reader.next_frame().await?;
    check_open_response(&response)?;

    tracing::debug!("UPR open success for {}", name);
    Ok(())
}

/// Control frame setting the flow-control window, or `None` for 0.
pub fn flow_control_frame(buffer_size: u32) -> Option<Frame> {
    if buffer_size == 0 {
        return None;
    }
    Some(
        Frame::request(Opcode::Control)
            .with_key(BUFFER_SIZE_KEY)
            .with_body(buffer_size.to_string()),
    )
}

/// Queue the flow-control window on the transmit path.
pub async fn negotiate_window(transmit: &TransmitHandle, buffer_size: u32) -> Result<()> {
    if let Some(frame) = flow_control_frame(buffer_size) {
        transmit.send(frame).await?;
        tracing::debug!("Requested flow-control window of {} bytes", buffer_size);
    }
    Ok(())
}

/// Failover log request for one partition.
pub fn failover_log_frame(partition: u16) -> Frame {
    Frame::request(Opcode::FailoverLog)
        .with_vbucket(partition)
        .with_opaque(OPAQUE_FAILOVER)
}

/// Validate and parse a failover log response.
pub fn parse_failover_response(response: &Frame) -> Result<FailoverLog> {
    let status = response.status();
    if response.opcode() != Some(Opcode::FailoverLog) || status != Status::SUCCESS {
        return Err(UprError::UnexpectedResponse {
            expected: Opcode::FailoverLog,
            opcode: response.opcode,
            status,
        });
    }
    if response.opaque != OPAQUE_FAILOVER {
        return Err(UprError::OpaqueMismatch {
            expected: OPAQUE_FAILOVER,
            got: response.opaque,
        });
    }
    FailoverLog::decode(&response.body)
}

/// Fetch the failover log of each partition, one request at a time.
pub async fn get_failover_logs<R>(
    reader: &mut FrameReader<R>,
    transmit: &TransmitHandle,
    partitions: &[u16],
) -> Result<HashMap<u16, FailoverLog>>
where
    R: AsyncRead + Unpin,
{
    let mut logs = HashMap::with_capacity(partitions.len());
    for &partition in partitions {
        transmit.send(failover_log_frame(partition)).await?;
        let response = reader.next_frame().await?;
        let log = parse_failover_response(&response).map_err(|e| {
            tracing::error!("Unable to get failover log for partition {}: {}", partition, e);
            e
        })?;
        logs.insert(partition, log);
    }
    Ok(logs)
}
