//! Tracker query: ask where to upload, or where a file lives.
//!
//! Request payload (fetch only):
//!
//! ```text
//! [16 bytes: group name, zero padded]
//! [n bytes: remote filename]
//! ```
//!
//! Response payload (39 or 40 bytes):
//!
//! ```text
//! [16 bytes: group name]
//! [15 bytes: storage IP]
//! [8 bytes BE: storage port]
//! [1 byte: store path index]   (optional)
//! ```

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::frame::{get_fixed_str, put_fixed, read_response_header};
use crate::task::Task;
use crate::types::{
    cmd, FdfsError, FileId, Header, Result, StorageLocation, GROUP_NAME_MAX_LEN, HEADER_LEN,
    IP_ADDRESS_LEN, TRACKER_RESPONSE_LEN,
};

/// Query a tracker for a storage node
#[derive(Debug, Clone)]
pub struct TrackerTask {
    header: Header,
    file_id: Option<FileId>,
}

impl TrackerTask {
    /// Pick any storage node for an upload
    pub fn query_store() -> Self {
        Self {
            header: Header::new(cmd::TRACKER_QUERY_STORE_WITHOUT_GROUP_ONE, 0),
            file_id: None,
        }
    }

    /// Find the storage node holding `file_id`
    pub fn query_fetch(file_id: &FileId) -> Self {
        let payload_len = (GROUP_NAME_MAX_LEN + file_id.remote_filename.len()) as u64;
        Self {
            header: Header::new(cmd::TRACKER_QUERY_FETCH_ONE, payload_len),
            file_id: Some(file_id.clone()),
        }
    }
}

impl Task for TrackerTask {
    type Output = StorageLocation;

    async fn send_request<W>(&mut self, conn: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.header.payload_len as usize);
        self.header.encode(&mut buf);
        if let Some(file_id) = &self.file_id {
            put_fixed(&mut buf, file_id.group_name.as_bytes(), GROUP_NAME_MAX_LEN);
            buf.put_slice(file_id.remote_filename.as_bytes());
        }
        conn.write_all(&buf).await?;
        conn.flush().await?;
        Ok(())
    }

    async fn recv_response<R>(&mut self, conn: &mut R) -> Result<StorageLocation>
    where
        R: AsyncRead + Unpin + Send,
    {
        let header = read_response_header(conn).await?;
        let len = header.payload_len;
        if len != TRACKER_RESPONSE_LEN && len != TRACKER_RESPONSE_LEN + 1 {
            return Err(FdfsError::Protocol(format!(
                "tracker response length {len} invalid"
            )));
        }

        let mut body = vec![0u8; len as usize];
        conn.read_exact(&mut body).await?;

        let ip_start = GROUP_NAME_MAX_LEN;
        let port_start = ip_start + IP_ADDRESS_LEN;
        let group_name = get_fixed_str(&body[..ip_start])?;
        let ip = get_fixed_str(&body[ip_start..port_start])?;
        let port = BigEndian::read_u64(&body[port_start..port_start + 8]);
        let port = u16::try_from(port)
            .map_err(|_| FdfsError::Protocol(format!("storage port {port} out of range")))?;
        let store_path_index = body.get(TRACKER_RESPONSE_LEN as usize).copied().unwrap_or(0);

        Ok(StorageLocation {
            group_name,
            addr: format!("{ip}:{port}"),
            store_path_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(group: &str, ip: &str, port: u64, index: Option<u8>) -> Vec<u8> {
        let mut body = BytesMut::new();
        put_fixed(&mut body, group.as_bytes(), GROUP_NAME_MAX_LEN);
        put_fixed(&mut body, ip.as_bytes(), IP_ADDRESS_LEN);
        body.put_u64(port);
        if let Some(index) = index {
            body.put_u8(index);
        }
        let mut frame = Header::new(cmd::RESP, body.len() as u64).to_bytes().to_vec();
        frame.extend_from_slice(&body);
        frame
    }

    #[tokio::test]
    async fn query_store_has_no_payload() {
        let mut task = TrackerTask::query_store();
        let mut buf = Vec::new();
        task.send_request(&mut buf).await.unwrap();
        assert_eq!(buf, [0, 0, 0, 0, 0, 0, 0, 0, 101, 0]);
    }

    #[tokio::test]
    async fn query_fetch_sends_group_and_filename() {
        let file_id: FileId = "group1/M00/00/00/x.jpg".parse().unwrap();
        let mut task = TrackerTask::query_fetch(&file_id);
        let mut buf = Vec::new();
        task.send_request(&mut buf).await.unwrap();

        let header = Header::from_bytes(buf[..HEADER_LEN].try_into().unwrap());
        assert_eq!(header.cmd, cmd::TRACKER_QUERY_FETCH_ONE);
        assert_eq!(header.payload_len, 16 + 15);
        assert_eq!(&buf[HEADER_LEN..HEADER_LEN + 16], b"group1\0\0\0\0\0\0\0\0\0\0");
        assert_eq!(&buf[HEADER_LEN + 16..], b"M00/00/00/x.jpg");
    }

    #[tokio::test]
    async fn parses_response_with_path_index() {
        let frame = response("group1", "192.168.1.10", 23000, Some(3));
        let mut cursor = &frame[..];
        let location = TrackerTask::query_store()
            .recv_response(&mut cursor)
            .await
            .unwrap();
        assert_eq!(
            location,
            StorageLocation {
                group_name: "group1".into(),
                addr: "192.168.1.10:23000".into(),
                store_path_index: 3,
            }
        );
    }

    #[tokio::test]
    async fn path_index_defaults_to_zero() {
        let frame = response("group2", "10.0.0.7", 23001, None);
        let mut cursor = &frame[..];
        let location = TrackerTask::query_store()
            .recv_response(&mut cursor)
            .await
            .unwrap();
        assert_eq!(location.addr, "10.0.0.7:23001");
        assert_eq!(location.store_path_index, 0);
    }

    #[tokio::test]
    async fn rejects_unexpected_length() {
        for len in [38usize, 41] {
            let mut frame = Header::new(cmd::RESP, len as u64).to_bytes().to_vec();
            frame.extend_from_slice(&vec![0u8; len]);
            let mut cursor = &frame[..];
            let err = TrackerTask::query_store()
                .recv_response(&mut cursor)
                .await
                .unwrap_err();
            assert!(matches!(err, FdfsError::Protocol(_)), "len {len}");
        }
    }

    #[tokio::test]
    async fn surfaces_tracker_status() {
        let frame = Header {
            payload_len: 0,
            cmd: cmd::RESP,
            status: 2,
        }
        .to_bytes();
        let mut cursor = &frame[..];
        let err = TrackerTask::query_store()
            .recv_response(&mut cursor)
            .await
            .unwrap_err();
        assert!(matches!(err, FdfsError::Status(2)));
    }

    #[tokio::test]
    async fn truncated_body_is_io_error() {
        let frame = response("group1", "127.0.0.1", 23000, None);
        let mut cursor = &frame[..frame.len() - 5];
        let err = TrackerTask::query_store()
            .recv_response(&mut cursor)
            .await
            .unwrap_err();
        assert!(matches!(err, FdfsError::Io(_)));
    }
}
