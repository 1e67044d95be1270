use std::net::TcpListener;
use std::thread;

use crossbeam::channel;
use kvraft::raft::persister::FilePersister;
use kvraft::thread_pool::{RayonThreadPool, SharedQueueThreadPool, ThreadPool};
use kvraft::{
    Config, GetArgs, KvService, KvsClient, KvsServer, LocalRaft, Request, Response, Status,
};
use tempfile::TempDir;

// starts a replica persisting into `dir`, served on an ephemeral port, and returns its address
fn spawn_server<P: ThreadPool + Send + 'static>(dir: &TempDir, pool: P) -> std::net::SocketAddr {
    let (tx, rx) = channel::unbounded();
    let raft = LocalRaft::new(FilePersister::open(dir.path()).unwrap(), tx).unwrap();
    let service = KvService::new(raft, rx, 0, Config::default()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || KvsServer::new(service, pool).serve(listener));
    addr
}

#[test]
fn client_round_trip_over_tcp() {
    let temp_dir = TempDir::new().unwrap();
    let addr = spawn_server(&temp_dir, SharedQueueThreadPool::new(4).unwrap());
    let mut client = KvsClient::connect(addr).unwrap();

    assert_eq!(client.get("k".to_owned()).unwrap().status, Status::NoKey);
    assert_eq!(client.put("k".to_owned(), "a".to_owned()).unwrap().status, Status::Ok);
    assert_eq!(client.append("k".to_owned(), "b".to_owned()).unwrap().status, Status::Ok);

    let reply = client.get("k".to_owned()).unwrap();
    assert_eq!(reply.status, Status::Ok);
    assert_eq!(reply.value, "ab");
}

#[test]
fn many_clients_on_a_rayon_pool() {
    let temp_dir = TempDir::new().unwrap();
    let addr = spawn_server(&temp_dir, RayonThreadPool::new(4).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            thread::spawn(move || {
                let mut client = KvsClient::connect(addr).unwrap();
                let key = format!("key{}", i);
                assert_eq!(client.put(key.clone(), i.to_string()).unwrap().status, Status::Ok);
                let reply = client.get(key).unwrap();
                assert_eq!(reply.value, i.to_string());
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn raw_requests_get_matching_responses() {
    let temp_dir = TempDir::new().unwrap();
    let addr = spawn_server(&temp_dir, SharedQueueThreadPool::new(2).unwrap());
    let mut client = KvsClient::connect(addr).unwrap();

    let req = Request::Get(GetArgs { id: KvsClient::next_id(), key: "nothing".to_owned() });
    if let Response::Get(reply) = client.send(req).unwrap() {
        assert_eq!(reply.status, Status::NoKey);
    } else {
        panic!("a get was not answered with a get reply");
    }
}
