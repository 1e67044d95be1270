use std::env;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use crossbeam::channel;
use crossbeam_utils::thread as scoped;
use kvraft::engine::snapshot;
use kvraft::raft::persister::{MemoryPersister, Persister};
use kvraft::{
    ApplyMsg, Config, GetArgs, GetReply, KvService, KvsError, LocalRaft, Op, PutAppendArgs,
    PutAppendOp, Status, Store,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::SeqCst)
}

fn start(persister: &MemoryPersister, config: Config) -> KvService<LocalRaft> {
    let (tx, rx) = channel::unbounded();
    let raft = LocalRaft::new(persister.clone(), tx).unwrap();
    KvService::new(raft, rx, 0, config).unwrap()
}

fn get(kv: &KvService<LocalRaft>, key: &str) -> GetReply {
    kv.get(GetArgs { id: next_id(), key: key.to_owned() })
}

fn put(kv: &KvService<LocalRaft>, key: &str, value: &str) -> Status {
    write(kv, next_id(), key, value, PutAppendOp::Put)
}

fn append(kv: &KvService<LocalRaft>, key: &str, value: &str) -> Status {
    write(kv, next_id(), key, value, PutAppendOp::Append)
}

fn write(kv: &KvService<LocalRaft>, id: u64, key: &str, value: &str, op: PutAppendOp) -> Status {
    kv.put_append(PutAppendArgs { id, key: key.to_owned(), value: value.to_owned(), op }).status
}

fn check(kv: &KvService<LocalRaft>, key: &str, value: &str) {
    let reply = get(kv, key);
    assert_eq!(reply.status, Status::Ok, "get({:?})", key);
    assert_eq!(reply.value, value, "get({:?})", key);
}

// waits until the applier has gone past `index`
fn wait_applied(kv: &KvService<LocalRaft>, index: u64) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while kv.last_applied() < index {
        assert!(Instant::now() < deadline, "position {} was never applied", index);
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn basic_put_append_get() {
    let kv = start(&MemoryPersister::new(), Config::default());

    assert_eq!(put(&kv, "k", "x"), Status::Ok);
    assert_eq!(put(&kv, "k", "y"), Status::Ok);
    check(&kv, "k", "y");

    assert_eq!(append(&kv, "a", "a"), Status::Ok);
    assert_eq!(append(&kv, "a", "b"), Status::Ok);
    check(&kv, "a", "ab");
    kv.kill();
}

#[test]
fn get_of_missing_key() {
    let kv = start(&MemoryPersister::new(), Config::default());
    let reply = get(&kv, "unknown");
    assert_eq!(reply.status, Status::NoKey);
    assert_eq!(reply.value, "");
    kv.kill();
}

#[test]
fn retried_write_is_applied_once() {
    let kv = start(&MemoryPersister::new(), Config::default());
    let id = next_id();
    assert_eq!(write(&kv, id, "k", "x", PutAppendOp::Append), Status::Ok);
    assert_eq!(write(&kv, id, "k", "x", PutAppendOp::Append), Status::Ok);
    check(&kv, "k", "x");
    kv.kill();
}

#[test]
fn follower_answers_wrong_leader() {
    let kv = start(&MemoryPersister::new(), Config::default());
    kv.raft().set_leader(false);
    assert!(!kv.is_leader());
    assert_eq!(put(&kv, "k", "v"), Status::WrongLeader);
    assert_eq!(get(&kv, "k").status, Status::WrongLeader);

    kv.raft().set_leader(true);
    check_missing_then_put(&kv);
    kv.kill();
}

fn check_missing_then_put(kv: &KvService<LocalRaft>) {
    assert_eq!(get(kv, "k").status, Status::NoKey);
    assert_eq!(put(kv, "k", "v"), Status::Ok);
    check(kv, "k", "v");
}

#[test]
fn newer_term_fails_fast_once() {
    let kv = start(&MemoryPersister::new(), Config::default());
    assert_eq!(put(&kv, "k", "1"), Status::Ok);

    let term = kv.raft().bump_term();
    assert_eq!(kv.term(), term);
    assert_eq!(put(&kv, "k", "2"), Status::WrongLeader);
    assert_eq!(put(&kv, "k", "3"), Status::Ok);

    // the rejected proposal still made it into the log and was applied before "3"
    check(&kv, "k", "3");
    kv.kill();
}

#[test]
fn other_request_committed_at_same_position() {
    let kv = start(&MemoryPersister::new(), Config::default());
    assert_eq!(put(&kv, "k", "before"), Status::Ok);

    kv.raft().stall(true);
    let position = kv.raft().last_index() + 1;
    let handler = {
        let kv = kv.clone();
        thread::spawn(move || put(&kv, "k", "mine"))
    };
    while kv.raft().last_index() < position {
        thread::sleep(Duration::from_millis(5));
    }

    assert!(kv.raft().overwrite(position, Op::put(next_id(), "k", "theirs")));
    assert_eq!(handler.join().unwrap(), Status::WrongLeader);

    kv.raft().stall(false);
    check(&kv, "k", "theirs");
    kv.kill();
}

#[test]
fn stalled_log_times_out() {
    let timeout = Duration::from_millis(300);
    let tick = Duration::from_millis(100);
    let kv = start(
        &MemoryPersister::new(),
        Config::default().commit_timeout(timeout).tick_interval(tick),
    );
    kv.raft().stall(true);

    let begin = Instant::now();
    assert_eq!(put(&kv, "k", "v"), Status::WrongLeader);
    let elapsed = begin.elapsed();
    assert!(elapsed >= timeout, "gave up after {:?}", elapsed);
    assert!(elapsed < timeout + tick + Duration::from_millis(200), "took {:?}", elapsed);

    let begin = Instant::now();
    assert_eq!(get(&kv, "k").status, Status::WrongLeader);
    assert!(begin.elapsed() < timeout + tick + Duration::from_millis(200));
    kv.kill();
}

// check that all appends of a client are present in `value`, once and in order
fn check_client_appends(client: usize, value: &str, count: usize) {
    let mut last = None;
    for j in 0..count {
        let wanted = format!("x {} {} y", client, j);
        let off = value
            .find(&wanted)
            .unwrap_or_else(|| panic!("missing element {:?} in {:?}", wanted, value));
        assert_eq!(value.rfind(&wanted), Some(off), "duplicate element {:?}", wanted);
        if let Some(last) = last {
            assert!(off > last, "wrong order for element {:?}", wanted);
        }
        last = Some(off);
    }
}

#[test]
fn concurrent_appends_keep_commit_order() {
    const CLIENTS: usize = 5;
    const APPENDS: usize = 20;
    let kv = start(&MemoryPersister::new(), Config::default());

    scoped::scope(|s| {
        for client in 0..CLIENTS {
            let kv = kv.clone();
            s.spawn(move |_| {
                for j in 0..APPENDS {
                    let value = format!("x {} {} y", client, j);
                    assert_eq!(append(&kv, "shared", &value), Status::Ok);
                }
            });
        }
    })
    .unwrap();

    let reply = get(&kv, "shared");
    assert_eq!(reply.status, Status::Ok);
    for client in 0..CLIENTS {
        check_client_appends(client, &reply.value, APPENDS);
    }
    kv.kill();
}

#[test]
fn snapshots_bound_the_log_and_survive_restart() {
    const MAX_RAFT_STATE: usize = 1000;
    let persister = MemoryPersister::new();
    let config = Config::with_max_raft_state(MAX_RAFT_STATE as i64).unwrap();
    let kv = start(&persister, config);

    for i in 0..100 {
        assert_eq!(put(&kv, &format!("key{}", i), &format!("value{}", i)), Status::Ok);
        assert!(persister.raft_state_size() < 2 * MAX_RAFT_STATE);
    }
    assert_eq!(append(&kv, "key0", "+"), Status::Ok);
    assert!(kv.raft().snapshot_index() > 0);
    assert!(!persister.snapshot().is_empty());
    kv.kill();

    let kv = start(&persister, config);
    check(&kv, "key0", "value0+");
    for i in 1..100 {
        check(&kv, &format!("key{}", i), &format!("value{}", i));
    }
    assert_eq!(append(&kv, "key0", "+"), Status::Ok);
    check(&kv, "key0", "value0++");
    kv.kill();
}

#[test]
fn restart_replays_the_log_without_snapshots() {
    let persister = MemoryPersister::new();
    let kv = start(&persister, Config::default());
    assert_eq!(put(&kv, "k", "a"), Status::Ok);
    assert_eq!(append(&kv, "k", "b"), Status::Ok);
    kv.kill();
    assert!(persister.snapshot().is_empty());

    let kv = start(&persister, Config::default());
    check(&kv, "k", "ab");
    kv.kill();
}

#[test]
fn installs_snapshot_from_commit_stream() {
    let kv = start(&MemoryPersister::new(), Config::default());
    assert_eq!(put(&kv, "local", "gone"), Status::Ok);

    let mut leader = Store::new();
    leader.apply(1, &Op::put(next_id(), "k", "from-leader"));
    leader.apply(50, &Op::append(next_id(), "k", "!"));
    kv.raft().offer_snapshot(1, 50, snapshot::encode(&leader, 50).unwrap());
    wait_applied(&kv, 50);

    check(&kv, "k", "from-leader!");
    assert_eq!(get(&kv, "local").status, Status::NoKey);

    // an older snapshot is refused and changes nothing
    kv.raft().offer_snapshot(1, 10, snapshot::encode(&Store::new(), 10).unwrap());
    thread::sleep(Duration::from_millis(100));
    check(&kv, "k", "from-leader!");
    kv.kill();
}

#[test]
fn corrupted_persisted_snapshot_fails_start_up() {
    let persister = MemoryPersister::new();
    persister.save_state_and_snapshot(vec![], b"garbage".to_vec()).unwrap();

    let (tx, rx) = channel::unbounded();
    let raft = LocalRaft::new(persister, tx).unwrap();
    match KvService::new(raft, rx, 0, Config::default()) {
        Err(KvsError::Codec(_)) => (),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("a corrupted snapshot was accepted"),
    }
}

// set in the child process that is expected to abort
const ABORT_CHILD: &str = "KVRAFT_ABORT_CHILD";

#[test]
fn corrupted_snapshot_on_commit_stream_aborts() {
    if env::var_os(ABORT_CHILD).is_some() {
        let kv = start(&MemoryPersister::new(), Config::default());
        assert_eq!(put(&kv, "k", "v"), Status::Ok);
        kv.raft().offer_snapshot(1, 50, b"garbage".to_vec());
        // still being alive here makes the child exit successfully
        thread::sleep(Duration::from_secs(3));
        return;
    }

    Command::new(env::current_exe().unwrap())
        .args(&["--exact", "corrupted_snapshot_on_commit_stream_aborts", "--test-threads=1"])
        .env(ABORT_CHILD, "1")
        .assert()
        .failure();
}

#[test]
fn dropping_every_handle_stops_the_applier() {
    let (tx, rx) = channel::unbounded();
    let raft = LocalRaft::new(MemoryPersister::new(), tx.clone()).unwrap();
    let config = Config::default().tick_interval(Duration::from_millis(20));
    let kv = KvService::new(raft, rx, 0, config).unwrap();
    assert_eq!(put(&kv, "k", "v"), Status::Ok);
    drop(kv.clone());
    drop(kv);

    // the receiving end goes away with the applier thread
    let deadline = Instant::now() + Duration::from_secs(2);
    while tx.send(ApplyMsg::Command { op: Op::get(next_id(), "k"), index: 2 }).is_ok() {
        assert!(Instant::now() < deadline, "applier still running");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn bounded_commit_stream_is_refused() {
    let (tx, _rx) = channel::bounded(16);
    match LocalRaft::new(MemoryPersister::new(), tx) {
        Err(KvsError::StringErr(_)) => (),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("a bounded commit stream was accepted"),
    }
}

#[test]
fn killed_service_rejects_requests() {
    let kv = start(&MemoryPersister::new(), Config::default());
    assert_eq!(put(&kv, "k", "v"), Status::Ok);
    kv.kill();
    assert!(kv.is_killed());
    assert_eq!(put(&kv, "k", "w"), Status::WrongLeader);
    assert_eq!(get(&kv, "k").status, Status::WrongLeader);
}
