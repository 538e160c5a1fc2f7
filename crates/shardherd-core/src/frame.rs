//! Length-prefixed bincode framing.
//!
//! Wire format: `u32 length (big-endian) + bincode(payload)`. Requests are
//! `(RequestHeader, NodeRequest)` tuples, responses are `NodeResponse`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use shardherd_proto::defaults::DEFAULT_MAX_FRAME_SIZE;
use shardherd_proto::request::{NodeRequest, NodeResponse, RequestHeader};
use shardherd_proto::{HerdError, HerdResult};

/// Encode `value` and write it as one frame.
pub async fn write_frame<W, T>(stream: &mut W, value: &T) -> HerdResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let data = bincode::serialize(value).map_err(|e| HerdError::Protocol(e.to_string()))?;
    if data.len() > DEFAULT_MAX_FRAME_SIZE {
        return Err(HerdError::Protocol(format!(
            "frame of {} bytes exceeds limit",
            data.len()
        )));
    }
    stream
        .write_u32(data.len() as u32)
        .await
        .map_err(|e| HerdError::Network(e.to_string()))?;
    stream
        .write_all(&data)
        .await
        .map_err(|e| HerdError::Network(e.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|e| HerdError::Network(e.to_string()))
}

/// Read one frame and decode it.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly before a
/// new frame started.
pub async fn read_frame<R, T>(stream: &mut R) -> HerdResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match stream.read_u32().await {
        Ok(n) => n as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(HerdError::Network(e.to_string())),
    };

    if len == 0 || len > DEFAULT_MAX_FRAME_SIZE {
        return Err(HerdError::Protocol(format!("invalid frame length {}", len)));
    }

    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| HerdError::Network(e.to_string()))?;

    bincode::deserialize(&buf)
        .map(Some)
        .map_err(|e| HerdError::Protocol(e.to_string()))
}

/// Send one request on `stream` and wait for its response.
pub async fn call<S>(
    stream: &mut S,
    header: &RequestHeader,
    req: &NodeRequest,
) -> HerdResult<NodeResponse>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_frame(stream, &(header, req)).await?;
    let resp: NodeResponse = read_frame(stream)
        .await?
        .ok_or_else(|| HerdError::Network("connection closed before response".to_string()))?;
    if resp.id != header.id {
        return Err(HerdError::Protocol(format!(
            "response id {} does not match request id {}",
            resp.id, header.id
        )));
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardherd_proto::request::{MemberRequest, ResponseResult};

    #[tokio::test]
    async fn test_request_frame_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let header = RequestHeader { proto_ver: 1, id: 42 };
        let req = NodeRequest::Member(MemberRequest::UpdateMongoConnectionString {
            rs_name: "rs1".to_string(),
        });

        let server_task = tokio::spawn(async move {
            let (h, r): (RequestHeader, NodeRequest) =
                read_frame(&mut server).await.unwrap().unwrap();
            assert_eq!(h.id, 42);
            assert!(matches!(r, NodeRequest::Member(_)));
            let resp = NodeResponse::new(h.proto_ver, h.id, ResponseResult::Success);
            write_frame(&mut server, &resp).await.unwrap();
        });

        let resp = call(&mut client, &header, &req).await.unwrap();
        assert!(resp.is_success());
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_clean_close_reads_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let frame: Option<NodeResponse> = read_frame(&mut server).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_zero_length_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32(0).await.unwrap();
        let result: HerdResult<Option<NodeResponse>> = read_frame(&mut server).await;
        assert!(matches!(result, Err(HerdError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_mismatched_response_id() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let header = RequestHeader { proto_ver: 1, id: 1 };

        tokio::spawn(async move {
            let _: Option<(RequestHeader, NodeRequest)> = read_frame(&mut server).await.unwrap();
            let resp = NodeResponse::new(1, 2, ResponseResult::Success);
            write_frame(&mut server, &resp).await.unwrap();
        });

        let result = call(&mut client, &header, &NodeRequest::NodeStatus).await;
        assert!(matches!(result, Err(HerdError::Protocol(_))));
    }
}
