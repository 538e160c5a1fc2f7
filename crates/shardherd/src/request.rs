//! Request pipeline: receive, dispatch, process, respond.
//!
//!   accept_loop → spawn(handle_client) → read_frame → dispatch → write_frame
//!
//! Every request on a connection gets exactly one response, in order.

use shardherd_core::frame;
use shardherd_proto::constants::HERD_PROTO_VER;
use shardherd_proto::request::{NodeRequest, NodeResponse, RequestHeader};
use shardherd_proto::{HerdError, HerdResult};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::daemon::SharedNode;
use crate::ops;

/// A decoded request travelling through the pipeline.
pub struct Request {
    pub req: NodeRequest,
    pub header: RequestHeader,
}

/// Bind the node's listen address and serve until shutdown.
pub async fn accept_loop(node: SharedNode) -> HerdResult<()> {
    let listener = shardherd_core::net::create_listen_socket(node.listen_addr).await?;
    info!("listening on {}", node.listen_addr);
    serve(node, listener).await
}

/// Accept connections on `listener` and spawn a handler for each.
pub async fn serve(node: SharedNode, listener: TcpListener) -> HerdResult<()> {
    let shutdown_notify = node.shutdown_notify.clone();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {}", peer);
                        stream.set_nodelay(true).ok();
                        let node = node.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(node, stream).await {
                                debug!("client {} disconnected: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("accept error: {}", e);
                    }
                }
            }
            _ = shutdown_notify.notified() => {
                info!("accept loop shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// Handle one connection: read requests, process, send responses.
async fn handle_client(node: SharedNode, mut stream: TcpStream) -> HerdResult<()> {
    loop {
        let (header, req): (RequestHeader, NodeRequest) = match frame::read_frame(&mut stream).await
        {
            Ok(Some(msg)) => msg,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!("bad request frame: {}", e);
                return Err(e);
            }
        };

        let response = if header.proto_ver != HERD_PROTO_VER {
            NodeResponse::error(
                HERD_PROTO_VER,
                header.id,
                HerdError::Protocol(format!("unsupported protocol version {}", header.proto_ver)),
            )
        } else {
            dispatch(node.clone(), Request { req, header }).await
        };

        frame::write_frame(&mut stream, &response).await?;
    }
}

/// Run a request and wrap its result in a response.
pub(crate) async fn dispatch(node: SharedNode, request: Request) -> NodeResponse {
    let id = request.header.id;
    match ops::process(node, request).await {
        Ok(result) => NodeResponse::new(HERD_PROTO_VER, id, result),
        Err(e) => {
            debug!("request {} failed: {}", id, e);
            NodeResponse::error(HERD_PROTO_VER, id, e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::Arc;

    use shardherd_core::tcp_transport::TcpTransport;
    use shardherd_core::transport::PeerTransport;
    use shardherd_proto::request::{MemberRequest, ResponseResult};
    use shardherd_proto::{ClusterNodeRole, TransitionStep};

    use crate::cluster::local::LocalBroadcast;
    use crate::config::EnvFile;
    use crate::controller::TopologyController;
    use crate::daemon::{ConnectionState, NodeContext, SystemState};
    use crate::dbclient::local::LocalDatabase;
    use crate::ops::member::ClusterMemberHandler;
    use crate::supervisor::local::LocalSupervisor;

    async fn start_node(name: &str) -> (SharedNode, SocketAddr, PathBuf) {
        let dir = std::env::temp_dir().join(format!("shardherd_rpc_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let controller = Arc::new(TopologyController::new(
            Arc::new(LocalSupervisor::new()),
            Arc::new(EnvFile::new(dir.join(".env"))),
            Arc::new(LocalDatabase::new("127.0.0.1")),
            Arc::new(LocalBroadcast::new()),
            Arc::new(ConnectionState::new()),
            dir.join("mongo"),
        ));
        controller.init().await.unwrap();
        let member = ClusterMemberHandler::new(controller.clone(), Arc::new(SystemState::new()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let node = Arc::new(NodeContext::new(controller, member, addr));
        let serving = node.clone();
        tokio::spawn(async move {
            serve(serving, listener).await.unwrap();
        });
        (node, addr, dir)
    }

    #[tokio::test]
    async fn test_promotion_over_rpc() {
        let (node, addr, dir) = start_node("promote").await;
        let transport = TcpTransport::new(2);

        let resp = transport
            .call(
                addr,
                NodeRequest::PromoteReplicaMember {
                    name: "rs1".to_string(),
                    first_shard: false,
                },
            )
            .await
            .unwrap();
        match resp.result {
            ResponseResult::Promotion(outcome) => {
                assert_eq!(outcome.role, ClusterNodeRole::ReplicaMember);
                assert_eq!(outcome.program.name, "mongors-rs1");
                assert!(outcome.propagation.is_complete());
            }
            other => panic!("unexpected result {:?}", other),
        }

        let resp = transport.call(addr, NodeRequest::NodeStatus).await.unwrap();
        match resp.result {
            ResponseResult::Status(status) => {
                assert_eq!(status.roles, vec![ClusterNodeRole::ReplicaMember]);
                assert_eq!(status.replica_set_name.as_deref(), Some("rs1"));
            }
            other => panic!("unexpected result {:?}", other),
        }

        let resp = transport
            .call(addr, NodeRequest::PromoteShardServer {
                name: String::new(),
                first_shard: false,
            })
            .await
            .unwrap();
        assert!(!resp.is_success());
        match resp.result {
            ResponseResult::TransitionFailed(e) => assert_eq!(e.step, TransitionStep::Validate),
            other => panic!("unexpected result {:?}", other),
        }

        node.shutdown_notify.notify_waiters();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_member_and_database_errors_over_rpc() {
        let (node, addr, dir) = start_node("member").await;
        let transport = TcpTransport::new(1);

        let resp = transport
            .call(
                addr,
                NodeRequest::Member(MemberRequest::UpdateMongoConnectionString {
                    rs_name: "rs3".to_string(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(
            resp.result,
            ResponseResult::ConnectionString(
                "mongodb://127.0.0.1:27000/nbcore?replicaSet=rs3".to_string()
            )
        );

        let resp = transport
            .call(
                addr,
                NodeRequest::IsMaster {
                    is_config_set: false,
                    set_name: "missing".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            resp.result,
            ResponseResult::Error(HerdError::Database(_))
        ));

        node.shutdown_notify.notify_waiters();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_rejects_unknown_protocol_version() {
        let (node, addr, dir) = start_node("version").await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let header = RequestHeader { proto_ver: 99, id: 5 };

        let resp = frame::call(&mut stream, &header, &NodeRequest::ListPrograms)
            .await
            .unwrap();
        assert_eq!(resp.id, 5);
        assert!(matches!(
            resp.result,
            ResponseResult::Error(HerdError::Protocol(_))
        ));

        node.shutdown_notify.notify_waiters();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
