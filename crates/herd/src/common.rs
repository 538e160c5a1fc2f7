//! Shared utilities for the herd CLI tool.
//!
//! Connection helpers, request framing and formatting used across all
//! subcommands.

use shardherd_core::{frame, net};
use shardherd_proto::constants::HERD_PROTO_VER;
use shardherd_proto::request::{
    NodeRequest, NodeResponse, Propagation, RequestHeader, ResponseResult,
};
use shardherd_proto::HerdResult;
use tokio::net::TcpStream;
use tracing::debug;

/// Connect to a shardherd daemon.
pub async fn connect_to_node(addr: &str, port: u16) -> HerdResult<TcpStream> {
    net::connect_to(addr, port).await
}

/// Send a request and read back its response.
pub async fn send_request(stream: &mut TcpStream, req: NodeRequest) -> HerdResult<NodeResponse> {
    let header = RequestHeader {
        proto_ver: HERD_PROTO_VER,
        id: 1,
    };
    debug!("sending {:?}", req);
    frame::call(stream, &header, &req).await
}

/// Send a request, turning an `Error` response into `Err`.
pub async fn send_request_ok(stream: &mut TcpStream, req: NodeRequest) -> HerdResult<ResponseResult> {
    let resp = send_request(stream, req).await?;
    match resp.result {
        ResponseResult::Error(e) => Err(e),
        other => Ok(other),
    }
}

/// Connect, send one request and return its result, exiting on failure.
pub async fn request(addr: &str, port: u16, req: NodeRequest) -> ResponseResult {
    let mut stream = match connect_to_node(addr, port).await {
        Ok(s) => s,
        Err(e) => exit_error(&format!("Failed to connect to {}:{}: {}", addr, port, e)),
    };
    match send_request_ok(&mut stream, req).await {
        Ok(result) => result,
        Err(e) => exit_error(&e.to_string()),
    }
}

/// Split a comma separated address list, dropping empty items.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// One-line summary of a broadcast outcome.
pub fn describe_propagation(p: &Propagation) -> String {
    match p {
        Propagation::NotRequired => "not required".to_string(),
        Propagation::Complete { peers } => format!("delivered to {} peer(s)", peers.len()),
        Propagation::Partial { delivered, failed } => format!(
            "delivered to {} peer(s), failed for {}",
            delivered.len(),
            failed
                .iter()
                .map(|f| format!("{} ({})", f.peer, f.error))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Propagation::Failed { failed, reason } => match reason {
            Some(e) => format!("failed: {}", e),
            None => format!(
                "failed for every peer: {}",
                failed
                    .iter()
                    .map(|f| format!("{} ({})", f.peer, f.error))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        },
    }
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{}", msg);
}

/// Print an error message and exit.
pub fn exit_error(msg: &str) -> ! {
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}

/// Exit on a response variant the command does not expect.
pub fn unexpected(result: ResponseResult) -> ! {
    exit_error(&format!("unexpected response: {:?}", result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardherd_proto::request::PeerFailure;
    use shardherd_proto::HerdError;
    use std::net::SocketAddr;

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list("10.0.0.1, 10.0.0.2,,10.0.0.3 "),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_describe_propagation() {
        let peer: SocketAddr = "10.0.0.3:7400".parse().unwrap();
        assert_eq!(
            describe_propagation(&Propagation::Complete { peers: vec![peer] }),
            "delivered to 1 peer(s)"
        );
        assert_eq!(
            describe_propagation(&Propagation::Partial {
                delivered: vec![],
                failed: vec![PeerFailure {
                    peer,
                    error: HerdError::Timeout
                }],
            }),
            "delivered to 0 peer(s), failed for 10.0.0.3:7400 (operation timed out)"
        );
        assert_eq!(
            describe_propagation(&Propagation::Failed {
                failed: vec![],
                reason: Some(HerdError::Network("closed".to_string())),
            }),
            "failed: network error: closed"
        );
    }
}
