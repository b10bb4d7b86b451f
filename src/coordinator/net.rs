// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{io::{self, Error, ErrorKind}, sync::Arc, time::Duration};

use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt}, net::{TcpListener, TcpStream}, sync::Mutex};

use crate::stage::{run_on_node, Ack, NodeContext, StageSpec};

/// Coordinator to node.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum NodeRequest {
    RunStage(StageSpec),
    Shutdown,
}

// Frame format: Size(u32, big endian) | CBOR(message).
// A size of 0 closes the connection.

pub async fn write_frame<W, T>(w: &mut W, msg: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let buf = serde_cbor::to_vec(msg)
        .map_err(|e| Error::new(ErrorKind::InvalidData, e))?;
    let sz = u32::try_from(buf.len())
        .map_err(|_| Error::new(ErrorKind::InvalidData, "Message larger than 4GiB"))?;
    w.write_u32(sz).await?;
    w.write_all(&buf).await?;
    w.flush().await
}

/// `None` on a zero-size frame.
pub async fn read_frame<R, T>(r: &mut R, read_buf: &mut Vec<u8>) -> io::Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let sz = r.read_u32().await? as usize;
    if sz == 0 {
        return Ok(None);
    }
    if sz > read_buf.len() {
        read_buf.resize(sz, 0);
        debug!("Receive buffer grown to {}", read_buf.len());
    }
    let buf = &mut read_buf[..sz];
    r.read_exact(buf).await?;
    serde_cbor::from_slice(buf)
        .map(Some)
        .map_err(|e| Error::new(ErrorKind::InvalidData, e))
}

/// Serves stage requests for one node. Stages run on the blocking pool, one at a time per connection.
pub struct NodeServer {
    ctx: Arc<NodeContext>,
    recv_buffer_size: usize,
}

impl NodeServer {
    pub fn new(ctx: NodeContext, recv_buffer_size: u32) -> Self {
        Self {
            ctx: Arc::new(ctx),
            recv_buffer_size: recv_buffer_size as usize,
        }
    }

    pub async fn bind(&self) -> io::Result<TcpListener> {
        let listener = TcpListener::bind(&self.ctx.address).await?;
        info!("Node {} listening on {}", self.ctx.node_index, listener.local_addr()?);
        Ok(listener)
    }

    /// Serves connections until one of them sends `Shutdown`.
    pub async fn run(&self, listener: TcpListener) -> io::Result<()> {
        loop {
            let (mut stream, addr) = listener.accept().await?;
            info!("Coordinator connected from {}", addr);
            match self.handle_stream(&mut stream).await {
                Ok(true) => {
                    info!("Node {} shutting down", self.ctx.node_index);
                    return Ok(());
                },
                Ok(false) => warn!("Dropping connection from {}", addr),
                Err(e) => warn!("Connection from {} failed: {}", addr, e),
            }
        }
    }

    /// Returns true when asked to shut down.
    async fn handle_stream(&self, stream: &mut TcpStream) -> io::Result<bool> {
        let mut read_buf = vec![0u8; self.recv_buffer_size];
        loop {
            let req = match read_frame::<_, NodeRequest>(stream, &mut read_buf).await? {
                Some(r) => r,
                None => return Ok(false),
            };
            match req {
                NodeRequest::RunStage(spec) => {
                    let ctx = self.ctx.clone();
                    let ack = match tokio::task::spawn_blocking(move || run_on_node(spec.build().as_ref(), &ctx)).await {
                        Ok(ack) => ack,
                        Err(e) => Ack::error(self.ctx.node_index, &self.ctx.address, format!("Stage task failed: {}", e)),
                    };
                    write_frame(stream, &ack).await?;
                },
                NodeRequest::Shutdown => {
                    let ack = Ack::ok(self.ctx.node_index, &self.ctx.address, None);
                    write_frame(stream, &ack).await?;
                    return Ok(true);
                },
            }
        }
    }
}

/// Coordinator side of one node's connection. Connects lazily and reconnects after a failure.
pub struct RemoteNode {
    node_index: usize,
    addr: String,
    connect_max_retry: i32,
    stream: Mutex<Option<TcpStream>>,
    read_buf: Mutex<Vec<u8>>,
}

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

impl RemoteNode {
    pub fn new(node_index: usize, addr: &str, connect_max_retry: i32, recv_buffer_size: u32) -> Self {
        Self {
            node_index,
            addr: addr.to_string(),
            connect_max_retry,
            stream: Mutex::new(None),
            read_buf: Mutex::new(vec![0u8; recv_buffer_size as usize]),
        }
    }

    pub fn node_index(&self) -> usize {
        self.node_index
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> io::Result<TcpStream> {
        let mut i = self.connect_max_retry.max(1);
        loop {
            match TcpStream::connect(&self.addr).await {
                Ok(s) => {
                    s.set_nodelay(true)?;
                    return Ok(s);
                },
                Err(e) => {
                    i -= 1;
                    if i <= 0 {
                        return Err(Error::new(ErrorKind::NotConnected,
                            format!("Could not connect to {} within max retries: {}", self.addr, e)));
                    }
                    debug!("Connect to {} failed ({}), retrying", self.addr, e);
                    tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                }
            }
        }
    }

    async fn call(&self, req: &NodeRequest) -> io::Result<Ack> {
        let mut stream = self.stream.lock().await;
        if stream.is_none() {
            *stream = Some(self.connect().await?);
        }
        let res = match stream.as_mut() {
            Some(s) => {
                let mut read_buf = self.read_buf.lock().await;
                match write_frame(s, req).await {
                    Ok(()) => read_frame::<_, Ack>(s, &mut read_buf).await,
                    Err(e) => Err(e),
                }
            },
            None => Err(Error::new(ErrorKind::NotConnected, "No connection")),
        };
        match res {
            Ok(Some(ack)) => Ok(ack),
            Ok(None) => {
                *stream = None;
                Err(Error::new(ErrorKind::ConnectionAborted, "Node closed the connection"))
            },
            Err(e) => {
                warn!("Problem talking to node {} at {}: {} ... Resetting connection.", self.node_index, self.addr, e);
                *stream = None;
                Err(e)
            },
        }
    }

    /// Never fails: a broken connection becomes an error Ack for this node.
    pub async fn run_stage(&self, spec: &StageSpec) -> Ack {
        match self.call(&NodeRequest::RunStage(spec.clone())).await {
            Ok(ack) => ack,
            Err(e) => Ack::error(self.node_index, &self.addr, format!("Transport: {}", e)),
        }
    }

    pub async fn shutdown(&self) -> io::Result<()> {
        self.call(&NodeRequest::Shutdown).await.map(|_| ())
    }
}
