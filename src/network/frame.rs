//! Count-prefixed record frames
//!
//! ```text
//! u32 LE count | count x SIZE bytes
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::record::{
    Session, Summary, TitleName, SESSION_CAPACITY, SESSION_SIZE, SUMMARY_CAPACITY, SUMMARY_SIZE,
    TITLE_NAMES_CAPACITY, TITLE_NAME_SIZE,
};

use super::{NetError, Role};

/// A fixed-size record that can travel in a frame.
pub trait WireRecord: Sized {
    /// Encoded size of one record.
    const SIZE: usize;
    /// Largest count a peer may advertise.
    const CAPACITY: usize;
    const KIND: &'static str;

    fn encode_into(&self, buf: &mut Vec<u8>);
    /// `data` holds exactly `SIZE` bytes.
    fn decode(data: &[u8]) -> Self;
}

impl WireRecord for Session {
    const SIZE: usize = SESSION_SIZE;
    const CAPACITY: usize = SESSION_CAPACITY;
    const KIND: &'static str = "session";

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_bytes());
    }

    fn decode(data: &[u8]) -> Self {
        Session::from_bytes(data)
    }
}

impl WireRecord for Summary {
    const SIZE: usize = SUMMARY_SIZE;
    const CAPACITY: usize = SUMMARY_CAPACITY;
    const KIND: &'static str = "summary";

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_bytes());
    }

    fn decode(data: &[u8]) -> Self {
        Summary::from_bytes(data)
    }
}

impl WireRecord for TitleName {
    const SIZE: usize = TITLE_NAME_SIZE;
    const CAPACITY: usize = TITLE_NAMES_CAPACITY;
    const KIND: &'static str = "title name";

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_bytes());
    }

    fn decode(data: &[u8]) -> Self {
        TitleName::from_bytes(data)
    }
}

pub async fn send_frame<W, R>(writer: &mut W, records: &[R]) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
    R: WireRecord,
{
    if records.len() > R::CAPACITY {
        return Err(NetError::Protocol(format!(
            "refusing to send {} {} records (capacity {})",
            records.len(),
            R::KIND,
            R::CAPACITY
        )));
    }
    let mut buf = Vec::with_capacity(4 + records.len() * R::SIZE);
    buf.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for record in records {
        record.encode_into(&mut buf);
    }
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. An advertised count above the dataset capacity aborts
/// before any record is read.
pub async fn recv_frame<Rd, R>(reader: &mut Rd) -> Result<Vec<R>, NetError>
where
    Rd: AsyncRead + Unpin,
    R: WireRecord,
{
    let mut count = [0u8; 4];
    reader.read_exact(&mut count).await?;
    let count = u32::from_le_bytes(count) as usize;
    if count > R::CAPACITY {
        return Err(NetError::Protocol(format!(
            "peer advertised {} {} records (capacity {})",
            count,
            R::KIND,
            R::CAPACITY
        )));
    }

    let mut body = vec![0u8; count * R::SIZE];
    reader.read_exact(&mut body).await?;
    Ok(body.chunks_exact(R::SIZE).map(R::decode).collect())
}

/// Swap one dataset with the peer. The host sends before reading, the
/// client reads before sending.
pub async fn exchange<S, R>(stream: &mut S, role: Role, local: &[R]) -> Result<Vec<R>, NetError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: WireRecord,
{
    let remote = match role {
        Role::Host => {
            send_frame(stream, local).await?;
            recv_frame(stream).await?
        }
        Role::Client => {
            let remote = recv_frame(stream).await?;
            send_frame(stream, local).await?;
            remote
        }
    };
    log::debug!(
        "{} exchange as {}: sent {}, received {}",
        R::KIND,
        role,
        local.len(),
        remote.len()
    );
    Ok(remote)
}
