use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use serde_json::Deserializer;
use tracing::{debug, error, info};

use crate::command::{Request, Response};
use crate::thread_pool::ThreadPool;
use crate::{KvsEngine, Result};

/// A TCP front end for a key/value engine.
///
/// It accepts connections on a socket address and serves each connection on a thread of its
/// [`ThreadPool`]. A connection carries a stream of JSON encoded [`Request`]s, every one of
/// them is answered with a JSON encoded [`Response`].
///
/// # Example
/// ```rust,no_run
/// use crossbeam::channel;
/// use kvraft::raft::persister::MemoryPersister;
/// use kvraft::thread_pool::{SharedQueueThreadPool, ThreadPool};
/// use kvraft::{Config, KvService, KvsServer, LocalRaft};
/// # fn main() -> kvraft::Result<()> {
/// let (tx, rx) = channel::unbounded();
/// let raft = LocalRaft::new(MemoryPersister::new(), tx)?;
/// let service = KvService::new(raft, rx, 0, Config::default())?;
/// let server = KvsServer::new(service, SharedQueueThreadPool::new(4)?);
/// server.run("127.0.0.1:4000")?;
/// # Ok(())
/// # }
/// ```
pub struct KvsServer<E: KvsEngine, P: ThreadPool> {
    engine: E,
    pool: P,
}

impl<E: KvsEngine, P: ThreadPool> KvsServer<E, P> {
    /// creates a server over `engine` that serves connections on `pool`
    pub fn new(engine: E, pool: P) -> Self {
        KvsServer { engine, pool }
    }

    /// binds `addr` and serves clients until the listener fails
    ///
    /// # Errors
    /// returns an IO error if `addr` can not be bound
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr)?;
        self.serve(listener)
    }

    /// serves clients connecting to an already bound `listener`
    pub fn serve(self, listener: TcpListener) -> Result<()> {
        info!("accepting connections on {}", listener.local_addr()?);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let engine = self.engine.clone();
                    self.pool.spawn(move || {
                        if let Err(e) = serve(engine, stream) {
                            error!("error serving client: {}", e);
                        }
                    });
                }
                Err(e) => error!("connection failed: {}", e),
            }
        }
        Ok(())
    }
}

fn serve<E: KvsEngine>(engine: E, tcp: TcpStream) -> Result<()> {
    let peer_addr = tcp.peer_addr()?;
    let reader = BufReader::new(&tcp);
    let mut writer = BufWriter::new(&tcp);
    let requests = Deserializer::from_reader(reader).into_iter::<Request>();

    for req in requests {
        let req = req?;
        debug!("request from {}: {:?}", peer_addr, req);
        let resp = match req {
            Request::Get(args) => Response::Get(engine.get(args)),
            Request::PutAppend(args) => Response::PutAppend(engine.put_append(args)),
        };
        serde_json::to_writer(&mut writer, &resp)?;
        writer.flush()?;
        debug!("response to {}: {:?}", peer_addr, resp);
    }
    Ok(())
}
