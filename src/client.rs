use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};

use rand::Rng;
use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::Deserializer;

use crate::command::{
    GetArgs, GetReply, PutAppendArgs, PutAppendOp, PutAppendReply, Request, RequestId, Response,
};
use crate::{KvsError, Result};

/// `KvsClient` talks to a single [`KvsServer`](crate::KvsServer).
///
/// Every call is sent once, under a fresh random request id, and the server's reply is returned
/// as is. Callers that want to retry a `WrongLeader` reply against another replica should reuse
/// the id through [`send`](KvsClient::send) so the write is applied at most once.
pub struct KvsClient {
    reader: Deserializer<IoRead<BufReader<TcpStream>>>,
    writer: BufWriter<TcpStream>,
}

impl KvsClient {
    /// connects to the server at `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let tcp_reader = TcpStream::connect(addr)?;
        let tcp_writer = tcp_reader.try_clone()?;

        Ok(KvsClient {
            reader: Deserializer::from_reader(BufReader::new(tcp_reader)),
            writer: BufWriter::new(tcp_writer),
        })
    }

    /// a new random request id
    pub fn next_id() -> RequestId {
        rand::thread_rng().gen()
    }

    /// reads `key`
    pub fn get(&mut self, key: String) -> Result<GetReply> {
        match self.send(Request::Get(GetArgs { id: Self::next_id(), key }))? {
            Response::Get(reply) => Ok(reply),
            other => Err(unexpected(other)),
        }
    }

    /// replaces the value of `key`
    pub fn put(&mut self, key: String, value: String) -> Result<PutAppendReply> {
        self.put_append(key, value, PutAppendOp::Put)
    }

    /// appends `value` to `key`
    pub fn append(&mut self, key: String, value: String) -> Result<PutAppendReply> {
        self.put_append(key, value, PutAppendOp::Append)
    }

    fn put_append(&mut self, key: String, value: String, op: PutAppendOp) -> Result<PutAppendReply> {
        let args = PutAppendArgs { id: Self::next_id(), key, value, op };
        match self.send(Request::PutAppend(args))? {
            Response::PutAppend(reply) => Ok(reply),
            other => Err(unexpected(other)),
        }
    }

    /// sends a request as is and waits for its response
    pub fn send(&mut self, req: Request) -> Result<Response> {
        serde_json::to_writer(&mut self.writer, &req)?;
        self.writer.flush()?;
        Ok(Response::deserialize(&mut self.reader)?)
    }
}

fn unexpected(resp: Response) -> KvsError {
    KvsError::StringErr(format!("unexpected response: {:?}", resp))
}
